//! Recording to ranged reflections
//!
//! The pipeline is stateless and runs in stages:
//! 1. Validate: non-empty, audible, dominant frequency within the carrier band
//! 2. Analyze: wavelet map, main pulse offset, energy trace statistics
//! 3. Gate on the signal-to-noise ratio
//! 4. Keep the most prominent candidates after the main pulse
//! 5. Convert delays to distances and prominences to intensities
//!
//! Every failure is folded into a [`RangingResult`] together with whatever
//! diagnostics were computed before it.

use crate::analysis::series::SeriesMetadata;
use crate::analysis::spectrum::dominant_frequency;
use crate::analysis::stripe::Stripe;
use crate::analysis::AnalysisError;
use crate::config::SonarConfig;
use crate::result::{Peak, RangingResult};
use crate::sample::SampleBuffer;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Category of a processing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmptyData,
    NoSound,
    WrongFrequency,
    NoisyData,
    NoPeaksDetected,
    Analysis,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::EmptyData => "EmptyDataError",
            ErrorKind::NoSound => "NoSoundError",
            ErrorKind::WrongFrequency => "WrongFrequencyError",
            ErrorKind::NoisyData => "NoisyDataError",
            ErrorKind::NoPeaksDetected => "NoPeaksDetectedError",
            ErrorKind::Analysis => "AnalysisError",
        };
        f.write_str(name)
    }
}

/// Reasons a recording yields no reflections
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("Recording contains no samples")]
    EmptyData,

    #[error("Amplitude range {peak_to_peak:.5} is below {epsilon}")]
    NoSound { peak_to_peak: f64, epsilon: f64 },

    #[error("Measured frequency {measured:.1} Hz is outside {low:.1}..{high:.1} Hz around the expected {expected:.1} Hz")]
    WrongFrequency {
        measured: f64,
        expected: f64,
        low: f64,
        high: f64,
    },

    #[error("Signal-to-noise ratio {snr:.2} does not exceed {threshold}")]
    NoisyData { snr: f64, threshold: f64 },

    #[error("No reflection found after the main pulse")]
    NoPeaksDetected,

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::EmptyData => ErrorKind::EmptyData,
            ProcessingError::NoSound { .. } => ErrorKind::NoSound,
            ProcessingError::WrongFrequency { .. } => ErrorKind::WrongFrequency,
            ProcessingError::NoisyData { .. } => ErrorKind::NoisyData,
            ProcessingError::NoPeaksDetected => ErrorKind::NoPeaksDetected,
            ProcessingError::Analysis(_) => ErrorKind::Analysis,
        }
    }
}

/// Output of the analysis stage
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Frequency of the main pulse cell in Hz
    pub stripe_frequency: f64,
    /// Time index of the main pulse
    pub offset: usize,
    /// Noise floor, pulse maximum and SNR of the energy trace
    pub series: SeriesMetadata,
    /// Reflection candidates as (time index, prominence)
    pub candidates: Vec<(usize, f64)>,
}

/// Stateless recording processor
#[derive(Debug, Clone, Default)]
pub struct SignalProcessor {
    config: SonarConfig,
}

impl SignalProcessor {
    pub fn new(config: SonarConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SonarConfig {
        &self.config
    }

    /// Run the full pipeline; failures come back as an error result
    pub fn process(&self, sample: &SampleBuffer) -> RangingResult {
        let mut metadata = BTreeMap::new();

        let analysis = self.validate(sample).and_then(|f_max| {
            metadata.insert("f_max".to_string(), f_max);
            self.analyze(sample)
        });

        match analysis {
            Ok(analysis) => self.evaluate(&analysis, metadata),
            Err(err) => Self::failed(err, metadata),
        }
    }

    /// Check the recording is usable; returns its dominant frequency in Hz
    pub fn validate(&self, sample: &SampleBuffer) -> Result<f64, ProcessingError> {
        if sample.is_empty() {
            return Err(ProcessingError::EmptyData);
        }

        let peak_to_peak = sample.peak_to_peak();
        if peak_to_peak < self.config.flatness_epsilon {
            return Err(ProcessingError::NoSound {
                peak_to_peak,
                epsilon: self.config.flatness_epsilon,
            });
        }

        let f_max = dominant_frequency(
            sample.to_values(),
            self.config.sample_rate,
            self.config.spectrum_blur_bins,
        );
        let (low, high) = self.config.frequency_band();
        if !(low..=high).contains(&f_max) {
            return Err(ProcessingError::WrongFrequency {
                measured: f_max,
                expected: self.config.carrier_frequency,
                low,
                high,
            });
        }

        tracing::debug!(f_max, peak_to_peak, "sample_validated");
        Ok(f_max)
    }

    /// Wavelet analysis of a validated recording
    pub fn analyze(&self, sample: &SampleBuffer) -> Result<Analysis, ProcessingError> {
        let shape = self.config.wavelet_shape;
        if !(shape.is_finite() && shape > 0.0) {
            return Err(AnalysisError::DegenerateWavelet(shape).into());
        }

        let stripe = Stripe::from_sample(sample, &self.config);
        let (stripe_frequency, offset) = stripe.offset()?;
        let series = stripe.squeeze();

        Ok(Analysis {
            stripe_frequency,
            offset,
            series: series.metadata(),
            candidates: series.peaks(&self.config),
        })
    }

    /// Gate, select and range the candidates of an analysis
    ///
    /// `metadata` holds the diagnostics gathered so far and is extended with
    /// `f_max_stripe`; failures also record `noise` and `snr`.
    pub fn evaluate(&self, analysis: &Analysis, mut metadata: BTreeMap<String, f64>) -> RangingResult {
        metadata.insert("f_max_stripe".to_string(), analysis.stripe_frequency);
        let SeriesMetadata { noise, snr, .. } = analysis.series;

        match self.select(analysis) {
            Ok(selected) => {
                let peaks: Vec<Peak> = selected
                    .into_iter()
                    .map(|(time, prominence)| {
                        Peak::new(self.distance(time, analysis.offset), prominence / noise)
                    })
                    .collect();
                tracing::debug!(
                    offset = analysis.offset,
                    peaks = peaks.len(),
                    noise,
                    snr,
                    "sample_processed"
                );
                RangingResult::new(peaks, noise, snr, metadata)
            }
            Err(err) => {
                metadata.insert("noise".to_string(), noise);
                metadata.insert("snr".to_string(), snr);
                Self::failed(err, metadata)
            }
        }
    }

    fn select(&self, analysis: &Analysis) -> Result<Vec<(usize, f64)>, ProcessingError> {
        let snr = analysis.series.snr;
        if snr <= self.config.snr_threshold {
            return Err(ProcessingError::NoisyData {
                snr,
                threshold: self.config.snr_threshold,
            });
        }

        let mut candidates: Vec<(usize, f64)> = analysis
            .candidates
            .iter()
            .copied()
            .filter(|&(time, _)| time > analysis.offset)
            .collect();
        if candidates.len() > self.config.max_peaks {
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
            candidates.truncate(self.config.max_peaks);
        }
        if candidates.is_empty() {
            return Err(ProcessingError::NoPeaksDetected);
        }
        Ok(candidates)
    }

    /// Distance in meters to a surface whose echo arrives at `time`
    pub fn distance(&self, time: usize, offset: usize) -> f64 {
        let delay = (time as f64 - offset as f64) / self.config.sample_rate as f64;
        delay * self.config.sound_speed / 2.0
    }

    fn failed(err: ProcessingError, metadata: BTreeMap<String, f64>) -> RangingResult {
        tracing::warn!(kind = %err.kind(), error = %err, "processing_failed");
        RangingResult::from_error(err, metadata)
    }
}
