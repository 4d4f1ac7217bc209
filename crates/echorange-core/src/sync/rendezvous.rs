//! Two-party rendezvous barrier
//!
//! Built from two zero-capacity channels: the leader hands a token to the
//! follower, then the follower hands one back. Neither side returns before
//! the other has arrived. Every step shares one deadline.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousError {
    #[error("partner did not arrive in time")]
    Timeout,

    #[error("partner left the rendezvous")]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Leader,
    Follower,
}

/// One side of a rendezvous; single use
pub struct Party {
    role: Role,
    tx: Sender<()>,
    rx: Receiver<()>,
    timeout: Duration,
}

/// Create the two sides of a rendezvous
pub fn pair(timeout: Duration) -> (Party, Party) {
    let (lead_tx, follow_rx) = bounded(0);
    let (follow_tx, lead_rx) = bounded(0);
    (
        Party {
            role: Role::Leader,
            tx: lead_tx,
            rx: lead_rx,
            timeout,
        },
        Party {
            role: Role::Follower,
            tx: follow_tx,
            rx: follow_rx,
            timeout,
        },
    )
}

impl Party {
    /// Block until the partner arrives or the timeout expires
    pub fn wait(self) -> Result<(), RendezvousError> {
        let deadline = Instant::now() + self.timeout;
        match self.role {
            Role::Leader => {
                send(&self.tx, deadline)?;
                recv(&self.rx, deadline)
            }
            Role::Follower => {
                recv(&self.rx, deadline)?;
                send(&self.tx, deadline)
            }
        }
    }
}

fn send(tx: &Sender<()>, deadline: Instant) -> Result<(), RendezvousError> {
    tx.send_deadline((), deadline).map_err(|e| match e {
        SendTimeoutError::Timeout(_) => RendezvousError::Timeout,
        SendTimeoutError::Disconnected(_) => RendezvousError::Disconnected,
    })
}

fn recv(rx: &Receiver<()>, deadline: Instant) -> Result<(), RendezvousError> {
    rx.recv_deadline(deadline).map_err(|e| match e {
        RecvTimeoutError::Timeout => RendezvousError::Timeout,
        RecvTimeoutError::Disconnected => RendezvousError::Disconnected,
    })
}
