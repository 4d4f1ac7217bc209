//! Synchronized pulse emission and recording
//!
//! [`Measurer::single_measurement`] runs the emitter on a scoped thread and
//! records on the calling thread. Both meet at a [`rendezvous`] before acting,
//! so the recording window always covers the pulse. For remote devices the
//! same contract holds: the HTTP clients carry a scheduled start time and the
//! services sleep until it.

pub mod rendezvous;

use crate::device::{DeviceError, DeviceFactory, Emitter, Receiver};
use crate::sample::SampleBuffer;
use rendezvous::RendezvousError;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort one measurement cycle
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Rendezvous failed for {party}: {source}")]
    Rendezvous {
        party: &'static str,
        #[source]
        source: RendezvousError,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Latency calibration failed: {0}")]
    Calibration(String),

    #[error("Emitter thread panicked")]
    EmitterPanicked,

    #[error("Failed to spawn emitter thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Drives one emitter and one receiver in lockstep
pub struct Measurer {
    emitter: Box<dyn Emitter>,
    receiver: Box<dyn Receiver>,
    timeout: Duration,
}

impl Measurer {
    /// Build from a factory; `timeout` bounds each rendezvous
    pub fn new(factory: &dyn DeviceFactory, timeout: Duration) -> Result<Self, SyncError> {
        Ok(Self::from_parts(
            factory.create_emitter()?,
            factory.create_receiver()?,
            timeout,
        ))
    }

    pub fn from_parts(emitter: Box<dyn Emitter>, receiver: Box<dyn Receiver>, timeout: Duration) -> Self {
        Self {
            emitter,
            receiver,
            timeout,
        }
    }

    /// Verify both devices are usable
    pub fn check(&self) -> Result<(), SyncError> {
        self.emitter.check()?;
        self.receiver.check()?;
        tracing::info!("devices_checked");
        Ok(())
    }

    /// Emit one pulse and record the room around it
    pub fn single_measurement(&self) -> Result<SampleBuffer, SyncError> {
        let (emit_party, record_party) = rendezvous::pair(self.timeout);

        std::thread::scope(|scope| {
            let emitter = &self.emitter;
            let handle = std::thread::Builder::new()
                .name("emitter".to_string())
                .spawn_scoped(scope, move || -> Result<(), SyncError> {
                    emit_party.wait().map_err(|source| SyncError::Rendezvous {
                        party: "emitter",
                        source,
                    })?;
                    emitter.emit_beep()?;
                    Ok(())
                })
                .map_err(SyncError::Spawn)?;

            // The recorder's party is consumed here, releasing a waiting emitter on failure
            let recorded = record_party
                .wait()
                .map_err(|source| SyncError::Rendezvous {
                    party: "receiver",
                    source,
                })
                .and_then(|()| Ok(self.receiver.record_signal()?));

            let emitted = handle.join().map_err(|_| SyncError::EmitterPanicked)?;
            let sample = recorded?;
            emitted?;

            tracing::debug!(frames = sample.len(), "measurement_recorded");
            Ok(sample)
        })
    }
}
