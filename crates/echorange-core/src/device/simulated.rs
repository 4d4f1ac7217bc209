//! Deterministic loopback room
//!
//! The simulated emitter hands each pulse to the receiver over a zero-capacity
//! "air" channel. The simulated receiver waits up to one recording window for
//! that handoff and renders the recording: the pulse after a fixed lead-in,
//! one delayed copy per reflecting surface, and seeded white noise. A pulse
//! nobody listens for within one window is lost, never queued for a later
//! recording.
//!
//! A *detached* room has no emitter on the same process (e.g. a standalone
//! receiver service); its receiver always hears a pulse and its emitter
//! announces nothing.

use super::{beep, DeviceError, DeviceFactory, Emitter, Receiver};
use crate::config::SonarConfig;
use crate::processor::SignalProcessor;
use crate::sample::SampleBuffer;
use crossbeam_channel::{bounded, Receiver as ChannelReceiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default noise amplitude (fraction of full scale)
pub const DEFAULT_NOISE_LEVEL: f64 = 0.001;

/// Default delay between recording start and direct pulse arrival
pub const DEFAULT_LEAD_IN_SECONDS: f64 = 0.05;

/// A reflecting surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reflection {
    /// One-way distance in meters
    pub distance: f64,
    /// Amplitude relative to the direct pulse
    pub gain: f64,
}

/// White noise source using a linear congruential generator (glibc parameters)
#[derive(Debug, Clone)]
struct NoiseSource {
    state: u32,
}

impl NoiseSource {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next value in -1.0..1.0
    fn next(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(1103515245).wrapping_add(12345);
        let bits = (self.state >> 16) & 0x7FFF;
        (bits as f64 / 16384.0) - 1.0
    }
}

struct Air {
    tx: Sender<()>,
    rx: ChannelReceiver<()>,
}

/// Shared acoustic model for one simulated emitter/receiver pair
pub struct SimulatedRoom {
    config: SonarConfig,
    reflections: Vec<Reflection>,
    noise_level: f64,
    lead_in_seconds: f64,
    detached: bool,
    seed: Mutex<u32>,
    air: Air,
}

impl SimulatedRoom {
    pub fn new(config: SonarConfig) -> Self {
        let (tx, rx) = bounded(0);
        Self {
            config,
            reflections: Vec::new(),
            noise_level: DEFAULT_NOISE_LEVEL,
            lead_in_seconds: DEFAULT_LEAD_IN_SECONDS,
            detached: false,
            seed: Mutex::new(0xDEADBEEF),
            air: Air { tx, rx },
        }
    }

    /// Room whose receiver renders a pulse without waiting for an emitter
    pub fn detached(config: SonarConfig) -> Self {
        Self {
            detached: true,
            ..Self::new(config)
        }
    }

    pub fn with_reflection(mut self, distance: f64, gain: f64) -> Self {
        self.reflections.push(Reflection { distance, gain });
        self
    }

    pub fn with_noise_level(mut self, noise_level: f64) -> Self {
        self.noise_level = noise_level;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Mutex::new(seed);
        self
    }

    pub fn config(&self) -> &SonarConfig {
        &self.config
    }

    pub fn reflections(&self) -> &[Reflection] {
        &self.reflections
    }

    /// Sample index at which the direct pulse peaks
    pub fn direct_arrival(&self) -> usize {
        let pulse_center = beep(&self.config).len() / 2;
        (self.lead_in_seconds * self.config.sample_rate as f64).round() as usize + pulse_center
    }

    /// Render one recording window
    pub fn render(&self, with_pulse: bool) -> SampleBuffer {
        let rate = self.config.sample_rate as f64;
        let mut values = vec![0.0; self.config.record_frames()];

        let mut noise = {
            let mut seed = self.seed.lock().unwrap_or_else(|e| e.into_inner());
            let source = NoiseSource::new(*seed);
            *seed = seed.wrapping_add(1);
            source
        };
        for v in values.iter_mut() {
            *v = noise.next() * self.noise_level;
        }

        if with_pulse {
            let pulse = beep(&self.config);
            let start = (self.lead_in_seconds * rate).round() as usize;
            let arrivals = std::iter::once((0.0, 1.0)).chain(
                self.reflections
                    .iter()
                    .map(|r| (2.0 * r.distance / self.config.sound_speed, r.gain)),
            );
            for (delay, gain) in arrivals {
                let at = start + (delay * rate).round() as usize;
                for (v, p) in values.iter_mut().skip(at).zip(pulse.to_values()) {
                    *v += p * gain;
                }
            }
        }

        for v in values.iter_mut() {
            *v = v.clamp(-1.0, 1.0);
        }
        SampleBuffer::from_values(&values).unwrap_or_default()
    }

    fn window(&self) -> Duration {
        Duration::try_from_secs_f64(self.config.record_seconds).unwrap_or(Duration::ZERO)
    }

    /// Hand the pulse to a listening receiver; false if nobody listened in time
    fn announce(&self) -> bool {
        !self.detached && self.air.tx.send_timeout((), self.window()).is_ok()
    }

    fn listen(&self) -> bool {
        self.detached || self.air.rx.recv_timeout(self.window()).is_ok()
    }
}

/// Emitter half of a [`SimulatedRoom`]
pub struct SimulatedEmitter {
    room: Arc<SimulatedRoom>,
}

impl SimulatedEmitter {
    pub fn new(room: Arc<SimulatedRoom>) -> Self {
        Self { room }
    }
}

impl Emitter for SimulatedEmitter {
    fn check(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn emit_beep(&self) -> Result<(), DeviceError> {
        let heard = self.room.announce();
        tracing::trace!(heard, "simulated_beep");
        Ok(())
    }
}

/// Receiver half of a [`SimulatedRoom`]
pub struct SimulatedReceiver {
    room: Arc<SimulatedRoom>,
}

impl SimulatedReceiver {
    pub fn new(room: Arc<SimulatedRoom>) -> Self {
        Self { room }
    }
}

impl Receiver for SimulatedReceiver {
    fn check(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn record_signal(&self) -> Result<SampleBuffer, DeviceError> {
        let heard = self.room.listen();
        tracing::trace!(heard, "simulated_recording");
        Ok(self.room.render(heard))
    }
}

/// Factory producing the two halves of one shared room
pub struct SimulatedFactory {
    room: Arc<SimulatedRoom>,
}

impl SimulatedFactory {
    pub fn new(room: SimulatedRoom) -> Self {
        Self {
            room: Arc::new(room),
        }
    }

    pub fn room(&self) -> &SimulatedRoom {
        &self.room
    }
}

impl DeviceFactory for SimulatedFactory {
    fn create_emitter(&self) -> Result<Box<dyn Emitter>, DeviceError> {
        Ok(Box::new(SimulatedEmitter::new(Arc::clone(&self.room))))
    }

    fn create_receiver(&self) -> Result<Box<dyn Receiver>, DeviceError> {
        Ok(Box::new(SimulatedReceiver::new(Arc::clone(&self.room))))
    }

    fn create_processor(&self) -> SignalProcessor {
        SignalProcessor::new(self.room.config.clone())
    }
}
