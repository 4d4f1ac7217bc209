//! Emitter and receiver strategies
//!
//! A measurement needs one [`Emitter`] (plays the pulse) and one [`Receiver`]
//! (records the room). Implementations:
//! - [`simulated`]: deterministic loopback room, no hardware
//! - [`crate::remote`]: HTTP clients driving the emitter and receiver services
//! - [`sound_card`] (feature `audio-device`): default cpal output and input

pub mod simulated;

#[cfg(feature = "audio-device")]
pub mod sound_card;

use crate::analysis::stripe::Stripe;
use crate::config::SonarConfig;
use crate::processor::SignalProcessor;
use crate::sample::{SampleBuffer, SampleError};
use thiserror::Error;

/// Errors raised by emitter and receiver devices
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No {0} audio device available")]
    NotFound(&'static str),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Invalid recording: {0}")]
    Sample(#[from] SampleError),
}

impl DeviceError {
    /// Short error class name reported by the health endpoint
    pub fn name(&self) -> &'static str {
        match self {
            DeviceError::NotFound(_) => "DeviceNotFound",
            DeviceError::Stream(_) => "StreamError",
            DeviceError::Http { .. } => "HttpError",
            DeviceError::Status { .. } => "StatusError",
            DeviceError::Sample(_) => "InvalidSampleError",
        }
    }
}

/// Plays the ranging pulse
pub trait Emitter: Send + Sync {
    /// Verify the output path is usable
    fn check(&self) -> Result<(), DeviceError>;

    /// Play one pulse, returning once it has been played
    fn emit_beep(&self) -> Result<(), DeviceError>;
}

/// Records the room after a pulse
pub trait Receiver: Send + Sync {
    /// Verify the input path is usable
    fn check(&self) -> Result<(), DeviceError>;

    /// Record one measurement window
    fn record_signal(&self) -> Result<SampleBuffer, DeviceError>;
}

/// Builds a matching emitter, receiver and processor
pub trait DeviceFactory {
    fn create_emitter(&self) -> Result<Box<dyn Emitter>, DeviceError>;

    fn create_receiver(&self) -> Result<Box<dyn Receiver>, DeviceError>;

    fn create_processor(&self) -> SignalProcessor;
}

/// The emitted pulse: the imaginary part of the analysis wavelet at the carrier
///
/// Spans `beep_seconds` and peaks at `beep_volume`.
pub fn beep(config: &SonarConfig) -> SampleBuffer {
    let n = ((config.beep_seconds * config.sample_rate as f64).round() as usize).max(1);
    let values: Vec<f64> = Stripe::kernel(
        n,
        config.carrier_frequency,
        config.sample_rate,
        config.wavelet_shape,
    )
    .iter()
    .map(|c| (c.im * config.beep_volume).clamp(-1.0, 1.0))
    .collect();
    SampleBuffer::from_values(&values).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beep_shape() {
        let config = SonarConfig::default();
        let pulse = beep(&config);
        let values = pulse.to_values();

        assert!((661..=662).contains(&values.len()));
        let peak = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak > 0.7 && peak <= 0.8, "peak {}", peak);
        // Envelope has decayed at both ends
        assert!(values[0].abs() < 1e-3);
        assert!(values[values.len() - 1].abs() < 1e-3);
    }

    #[test]
    fn test_beep_is_in_band() {
        let config = SonarConfig::default();
        let pulse = beep(&config);
        let processor = SignalProcessor::new(config);
        assert!(processor.validate(&pulse).is_ok());
    }

    #[test]
    fn test_error_names() {
        assert_eq!(DeviceError::NotFound("output").name(), "DeviceNotFound");
        assert_eq!(
            DeviceError::Sample(SampleError::PartialFrame(3)).name(),
            "InvalidSampleError"
        );
    }
}
