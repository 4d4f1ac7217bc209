//! Echorange Core - Sample buffers, wavelet analysis, echo processing and synchronization
//!
//! This library turns a single acoustic pulse recording into ranged, confidence-scored
//! reflections. It also keeps the pulse emission and the recording aligned, either
//! in-process through a rendezvous or across the network through a latency-calibrated
//! schedule.

pub mod analysis;
pub mod config;
pub mod device;
pub mod processor;
pub mod remote;
pub mod result;
pub mod sample;
pub mod sync;
pub mod timestamp;

pub use analysis::{series::EchoSeries, stripe::Stripe};
pub use config::SonarConfig;
pub use device::{DeviceError, DeviceFactory, Emitter, Receiver};
pub use processor::{ErrorKind, ProcessingError, SignalProcessor};
pub use result::{Peak, RangingResult};
pub use sample::SampleBuffer;
pub use sync::{Measurer, SyncError};
pub use timestamp::Timestamp;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate for recording and analysis
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Frames per PCM packet
pub const CHUNK: usize = 1024;
