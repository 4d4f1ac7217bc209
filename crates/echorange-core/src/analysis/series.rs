//! Energy trace of a recording over time
//!
//! Produced by [`super::stripe::Stripe::squeeze`]. The median of the trace is
//! the noise floor; the maximum is the main pulse energy.

use super::peaks::{find_peaks, PeakFilter};
use crate::config::SonarConfig;

/// Noise floor, main pulse energy and their ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesMetadata {
    pub noise: f64,
    pub pulse_max: f64,
    pub snr: f64,
}

/// Time-indexed energy trace
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EchoSeries {
    values: Vec<f64>,
}

impl EchoSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Median of the trace, never below `f64::EPSILON`
    ///
    /// Even-length traces average the two middle values.
    pub fn noise(&self) -> f64 {
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let median = match n {
            0 => 0.0,
            _ if n % 2 == 1 => sorted[n / 2],
            _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
        };
        median.max(f64::EPSILON)
    }

    /// Largest value of the trace (0.0 when empty)
    pub fn pulse_max(&self) -> f64 {
        self.values.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn metadata(&self) -> SeriesMetadata {
        let noise = self.noise();
        let pulse_max = self.pulse_max();
        SeriesMetadata {
            noise,
            pulse_max,
            snr: pulse_max / noise,
        }
    }

    /// Reflection candidates as (time index, prominence)
    ///
    /// Heights between 4 x noise and a quarter of the main pulse, at least one
    /// pulse width apart, with prominence of at least 2 x noise.
    pub fn peaks(&self, config: &SonarConfig) -> Vec<(usize, f64)> {
        let SeriesMetadata {
            noise, pulse_max, ..
        } = self.metadata();
        let filter = PeakFilter {
            height: Some((4.0 * noise, pulse_max / 4.0)),
            distance: Some(config.peak_distance_samples()),
            prominence: Some(2.0 * noise),
        };
        let peaks: Vec<(usize, f64)> = find_peaks(&self.values, &filter)
            .into_iter()
            .map(|p| (p.index, p.prominence))
            .collect();

        tracing::debug!(noise, pulse_max, candidates = peaks.len(), "series_peaks");
        peaks
    }
}
