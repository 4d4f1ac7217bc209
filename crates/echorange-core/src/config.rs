//! Measurement and analysis tuning
//!
//! Every component receives a [`SonarConfig`] explicitly. The defaults are
//! tuned for a single narrow-band pulse around 3.3 kHz recorded at 44.1 kHz.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be a positive number",
        })
    }
}

/// Tuning of the pulse, the recording and the processing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonarConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Frames per audio packet
    pub chunk_frames: usize,
    /// Expected pulse frequency in Hz
    pub carrier_frequency: f64,
    /// Relative half-width of the accepted frequency band
    pub frequency_tolerance: f64,
    /// Number of frequencies analyzed across the band
    pub stripe_frequencies: usize,
    /// Gaussian shape constant of the wavelet (bigger = shorter envelope)
    pub wavelet_shape: f64,
    /// Expected width of one pulse arrival in seconds
    pub pulse_width_seconds: f64,
    /// Minimum SNR for a recording to be processed
    pub snr_threshold: f64,
    /// Speed of sound in m/s
    pub sound_speed: f64,
    /// Maximum number of reflections reported
    pub max_peaks: usize,
    /// Minimum peak-to-peak amplitude of a recording
    pub flatness_epsilon: f64,
    /// Gaussian blur sigma (in FFT bins) applied before picking the dominant frequency
    pub spectrum_blur_bins: f64,
    /// Emitted pulse duration in seconds
    pub beep_seconds: f64,
    /// Emitted pulse amplitude (0.0 to 1.0)
    pub beep_volume: f64,
    /// Recording duration in seconds
    pub record_seconds: f64,
    /// Rendezvous timeout between emitter and recorder in milliseconds
    pub barrier_timeout_ms: u64,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            chunk_frames: crate::CHUNK,
            carrier_frequency: 3310.0,
            frequency_tolerance: 0.2,
            stripe_frequencies: 40,
            wavelet_shape: 0.0004,
            pulse_width_seconds: 0.0055,
            snr_threshold: 10.0,
            sound_speed: 343.0,
            max_peaks: 5,
            flatness_epsilon: 1e-3,
            spectrum_blur_bins: 6.0,
            beep_seconds: 0.015,
            beep_volume: 0.8,
            record_seconds: 0.3,
            barrier_timeout_ms: 5000,
        }
    }
}

impl SonarConfig {
    /// Lower and upper edge of the accepted carrier band in Hz
    pub fn frequency_band(&self) -> (f64, f64) {
        (
            self.carrier_frequency * (1.0 - self.frequency_tolerance),
            self.carrier_frequency * (1.0 + self.frequency_tolerance),
        )
    }

    /// Pulse width expressed in samples (at least one)
    pub fn pulse_width_samples(&self) -> usize {
        ((self.pulse_width_seconds * self.sample_rate as f64) as usize).max(1)
    }

    /// Minimum spacing of reflection peaks: one pulse width plus a sample, rounded up
    pub fn peak_distance_samples(&self) -> usize {
        (self.pulse_width_seconds * self.sample_rate as f64 + 1.0).ceil() as usize
    }

    /// Number of frames recorded per measurement
    pub fn record_frames(&self) -> usize {
        (self.record_seconds * self.sample_rate as f64).round() as usize
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_rate",
                reason: "must be non-zero",
            });
        }
        if self.chunk_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "chunk_frames",
                reason: "must be non-zero",
            });
        }
        if self.stripe_frequencies == 0 {
            return Err(ConfigError::Invalid {
                field: "stripe_frequencies",
                reason: "must be non-zero",
            });
        }
        if !(0.0..1.0).contains(&self.frequency_tolerance) {
            return Err(ConfigError::Invalid {
                field: "frequency_tolerance",
                reason: "must be in 0.0..1.0",
            });
        }
        positive("carrier_frequency", self.carrier_frequency)?;
        positive("wavelet_shape", self.wavelet_shape)?;
        positive("pulse_width_seconds", self.pulse_width_seconds)?;
        positive("sound_speed", self.sound_speed)?;
        positive("beep_seconds", self.beep_seconds)?;
        positive("record_seconds", self.record_seconds)?;
        Ok(())
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
}
