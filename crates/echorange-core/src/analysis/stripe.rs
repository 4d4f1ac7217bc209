//! Wavelet energy map around the carrier band
//!
//! The map is a continuous wavelet transform of one recording with a complex
//! Gabor-like kernel, evaluated at geometrically spaced frequencies across the
//! tolerance band. Convolutions are computed in the frequency domain with a
//! single shared FFT of the signal.
//!
//! ## Usage
//!
//! ```
//! use echorange_core::{SampleBuffer, SonarConfig, Stripe};
//!
//! let config = SonarConfig::default();
//! let pulse: Vec<f64> = Stripe::kernel(2001, config.carrier_frequency, config.sample_rate, config.wavelet_shape)
//!     .iter()
//!     .map(|c| c.re * 0.5)
//!     .collect();
//! let sample = SampleBuffer::from_values(&pulse).unwrap();
//!
//! let stripe = Stripe::from_sample(&sample, &config);
//! let (_frequency, time) = stripe.offset().unwrap();
//! assert!((time as i64 - 1000).abs() <= 2);
//! ```

use super::series::EchoSeries;
use super::AnalysisError;
use crate::config::SonarConfig;
use crate::sample::SampleBuffer;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// Kernel envelope level at which the wavelet is truncated
const ENVELOPE_FLOOR: f64 = 1e-4;

/// Time-frequency energy map of one recording
#[derive(Debug, Clone)]
pub struct Stripe {
    /// Analyzed frequencies in Hz, ascending
    frequencies: Vec<f64>,
    /// Energy indexed `[frequency][time]`
    matrix: Vec<Vec<f64>>,
    /// Time half-window of the main pulse search, in samples
    pulse_width: usize,
}

/// `n` geometrically spaced values from `start` to `stop` inclusive
pub fn geomspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let ratio = (stop / start).ln() / (n - 1) as f64;
            (0..n).map(|i| start * (ratio * i as f64).exp()).collect()
        }
    }
}

impl Stripe {
    /// The analysis wavelet
    ///
    /// `exp(-k a^2 + i a)` with `a = 2 pi f x / rate` and `x = i - n / 2`, so for
    /// odd `n` the center sample is exactly `1 + 0i`.
    ///
    /// # Arguments
    /// * `n` - Number of kernel points
    /// * `frequency` - Carrier frequency in Hz
    /// * `sample_rate` - Sample rate in Hz
    /// * `shape` - Gaussian shape constant `k`
    pub fn kernel(n: usize, frequency: f64, sample_rate: u32, shape: f64) -> Vec<Complex<f64>> {
        let half = (n / 2) as f64;
        (0..n)
            .map(|i| {
                let a = 2.0 * PI * frequency * (i as f64 - half) / sample_rate as f64;
                Complex::from_polar((-shape * a * a).exp(), a)
            })
            .collect()
    }

    /// Odd kernel length covering the envelope down to its floor, capped at `max_len`
    ///
    /// A shape that never decays (zero, negative or NaN) spans the whole cap.
    pub fn kernel_len(frequency: f64, sample_rate: u32, shape: f64, max_len: usize) -> usize {
        let reach = (-ENVELOPE_FLOOR.ln() / shape).sqrt();
        let half = (reach * sample_rate as f64 / (2.0 * PI * frequency)).ceil();
        let cap = if max_len % 2 == 0 {
            max_len.saturating_sub(1)
        } else {
            max_len
        };
        if !half.is_finite() || half >= cap as f64 {
            return cap.max(1);
        }
        (2 * (half.max(0.0) as usize) + 1).min(cap).max(1)
    }

    /// Analyze one recording across the configured carrier band
    pub fn from_sample(sample: &SampleBuffer, config: &SonarConfig) -> Self {
        let (low, high) = config.frequency_band();
        let frequencies = geomspace(low, high, config.stripe_frequencies);
        let values = sample.to_values();
        let n = values.len();

        if n == 0 || frequencies.is_empty() {
            return Self::from_matrix(
                frequencies.clone(),
                vec![Vec::new(); frequencies.len()],
                config.pulse_width_samples(),
            );
        }

        let kernel_lens: Vec<usize> = frequencies
            .iter()
            .map(|&f| Self::kernel_len(f, config.sample_rate, config.wavelet_shape, n))
            .collect();
        let longest = kernel_lens.iter().copied().max().unwrap_or(1);
        let fft_size = (n + longest - 1).next_power_of_two();

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);

        let mut signal_fft: Vec<Complex<f64>> = values
            .iter()
            .map(|&v| Complex::new(v, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(fft_size)
            .collect();
        fft.process(&mut signal_fft);

        let norm = 1.0 / fft_size as f64;
        let matrix = frequencies
            .iter()
            .zip(&kernel_lens)
            .map(|(&f, &len)| {
                let mut buffer: Vec<Complex<f64>> =
                    Self::kernel(len, f, config.sample_rate, config.wavelet_shape)
                        .into_iter()
                        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
                        .take(fft_size)
                        .collect();
                fft.process(&mut buffer);
                for (b, s) in buffer.iter_mut().zip(&signal_fft) {
                    *b *= *s;
                }
                ifft.process(&mut buffer);

                // 'same' mode: output aligned with the input, centered on the kernel
                let start = (len - 1) / 2;
                buffer[start..start + n]
                    .iter()
                    .map(|c| c.norm() * norm)
                    .collect()
            })
            .collect();

        tracing::debug!(
            frequencies = frequencies.len(),
            samples = n,
            fft_size,
            "stripe_computed"
        );

        Self::from_matrix(frequencies, matrix, config.pulse_width_samples())
    }

    /// Wrap an already computed energy map
    pub fn from_matrix(frequencies: Vec<f64>, matrix: Vec<Vec<f64>>, pulse_width: usize) -> Self {
        Self {
            frequencies,
            matrix,
            pulse_width,
        }
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn matrix(&self) -> &[Vec<f64>] {
        &self.matrix
    }

    /// Number of time indices
    pub fn duration(&self) -> usize {
        self.matrix.first().map_or(0, Vec::len)
    }

    /// Locate the main pulse as (frequency in Hz, time index)
    ///
    /// The main pulse is the global maximum of the map, and it must also be a
    /// local maximum within a quarter of the band and one pulse width in time.
    /// Ties resolve to the lowest frequency index, then the lowest time index.
    pub fn offset(&self) -> Result<(f64, usize), AnalysisError> {
        let duration = self.duration();
        if self.matrix.is_empty() || duration == 0 {
            return Err(AnalysisError::EmptyMatrix);
        }

        let mut best: Option<(usize, usize, f64)> = None;
        for (fi, row) in self.matrix.iter().enumerate() {
            for (ti, &energy) in row.iter().enumerate() {
                if best.map_or(energy.is_finite(), |(_, _, top)| energy > top) {
                    best = Some((fi, ti, energy));
                }
            }
        }
        let (fi, ti, energy) = best.ok_or(AnalysisError::NoMainPulse)?;

        if !self.is_local_max(fi, ti, energy) {
            return Err(AnalysisError::NoMainPulse);
        }

        let frequency = self.frequencies.get(fi).copied().ok_or(AnalysisError::NoMainPulse)?;
        tracing::debug!(frequency, offset = ti, energy, "main_pulse_found");
        Ok((frequency, ti))
    }

    fn is_local_max(&self, fi: usize, ti: usize, energy: f64) -> bool {
        let freq_reach = (self.matrix.len() / 4).max(1);
        let time_reach = self.pulse_width.max(1);

        let rows = fi.saturating_sub(freq_reach)..(fi + freq_reach + 1).min(self.matrix.len());
        self.matrix[rows].iter().all(|row| {
            let cols = ti.saturating_sub(time_reach)..(ti + time_reach + 1).min(row.len());
            row.get(cols)
                .is_some_and(|window| window.iter().all(|&e| !e.is_nan() && e <= energy))
        })
    }

    /// Collapse the map over frequencies into a time trace
    pub fn squeeze(&self) -> EchoSeries {
        let mut trace = vec![0.0; self.duration()];
        for row in &self.matrix {
            for (acc, &e) in trace.iter_mut().zip(row) {
                *acc += e;
            }
        }
        EchoSeries::new(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pulse_at(len: usize, at: usize, amplitude: f64, config: &SonarConfig) -> Vec<f64> {
        let klen = 2001;
        let kernel = Stripe::kernel(klen, config.carrier_frequency, config.sample_rate, config.wavelet_shape);
        let mut values = vec![0.0; len];
        for (i, c) in kernel.iter().enumerate() {
            let idx = at as i64 + i as i64 - (klen / 2) as i64;
            if idx >= 0 && (idx as usize) < len {
                values[idx as usize] += amplitude * c.re;
            }
        }
        values
    }

    #[test]
    fn test_geomspace() {
        let g = geomspace(1.0, 100.0, 3);
        assert_relative_eq!(g[0], 1.0);
        assert_relative_eq!(g[1], 10.0, epsilon = 1e-9);
        assert_relative_eq!(g[2], 100.0, epsilon = 1e-9);
        assert!(geomspace(1.0, 2.0, 0).is_empty());
        assert_eq!(geomspace(5.0, 7.0, 1), vec![5.0]);
    }

    #[test]
    fn test_kernel_center_is_one() {
        let kernel = Stripe::kernel(101, 3310.0, 44100, 0.0004);
        assert_eq!(kernel.len(), 101);
        assert_relative_eq!(kernel[50].re, 1.0);
        assert_relative_eq!(kernel[50].im, 0.0);
    }

    #[test]
    fn test_kernel_envelope_decays() {
        let kernel = Stripe::kernel(2001, 3310.0, 44100, 0.0004);
        assert!(kernel[0].norm() < 1e-4);
        assert!(kernel[2000].norm() < 1e-4);
        assert!(kernel[1000].norm() > kernel[1100].norm());
    }

    #[test]
    fn test_kernel_len() {
        let len = Stripe::kernel_len(3310.0, 44100, 0.0004, 100_000);
        assert_eq!(len % 2, 1);
        assert!(len > 500 && len < 800, "kernel length {}", len);
        // Capped at the sample length, kept odd
        assert_eq!(Stripe::kernel_len(3310.0, 44100, 0.0004, 100), 99);
        assert_eq!(Stripe::kernel_len(3310.0, 44100, 0.0004, 101), 101);
        assert_eq!(Stripe::kernel_len(3310.0, 44100, 0.0004, 1), 1);
    }

    #[test]
    fn test_kernel_len_without_decay_spans_cap() {
        assert_eq!(Stripe::kernel_len(3310.0, 44100, 0.0, 13230), 13229);
        assert_eq!(Stripe::kernel_len(3310.0, 44100, -1.0, 101), 101);
        assert_eq!(Stripe::kernel_len(0.0, 44100, 0.0004, 101), 101);
        assert_eq!(Stripe::kernel_len(3310.0, 44100, f64::NAN, 0), 1);
    }

    #[test]
    fn test_frequencies_span_band() {
        let config = SonarConfig::default();
        let sample = SampleBuffer::from_values(&vec![0.0; 64]).unwrap();
        let stripe = Stripe::from_sample(&sample, &config);
        let freqs = stripe.frequencies();
        assert_eq!(freqs.len(), 40);
        assert_relative_eq!(freqs[0], 2648.0, epsilon = 1e-6);
        assert_relative_eq!(freqs[39], 3972.0, epsilon = 1e-6);
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(stripe.duration(), 64);
    }

    #[test]
    fn test_offset_finds_pulse() {
        let config = SonarConfig::default();
        let values = pulse_at(6000, 2500, 0.5, &config);
        let sample = SampleBuffer::from_values(&values).unwrap();

        let stripe = Stripe::from_sample(&sample, &config);
        let (frequency, time) = stripe.offset().unwrap();

        assert!((time as i64 - 2500).abs() <= 2, "offset {}", time);
        let (low, high) = config.frequency_band();
        assert!(frequency > low && frequency < high);
        assert!((frequency - config.carrier_frequency).abs() < 300.0, "frequency {}", frequency);
    }

    #[test]
    fn test_offset_prefers_stronger_pulse() {
        let config = SonarConfig::default();
        let mut values = pulse_at(8000, 1500, 0.2, &config);
        for (v, p) in values.iter_mut().zip(pulse_at(8000, 5000, 0.6, &config)) {
            *v += p;
        }
        let sample = SampleBuffer::from_values(&values).unwrap();
        let (_, time) = Stripe::from_sample(&sample, &config).offset().unwrap();
        assert!((time as i64 - 5000).abs() <= 2);
    }

    #[test]
    fn test_offset_empty_matrix() {
        let config = SonarConfig::default();
        let stripe = Stripe::from_sample(&SampleBuffer::default(), &config);
        assert_eq!(stripe.offset(), Err(AnalysisError::EmptyMatrix));

        let stripe = Stripe::from_matrix(Vec::new(), Vec::new(), 3);
        assert_eq!(stripe.offset(), Err(AnalysisError::EmptyMatrix));
    }

    #[test]
    fn test_offset_nan_matrix() {
        let stripe = Stripe::from_matrix(vec![1.0, 2.0], vec![vec![f64::NAN; 4]; 2], 1);
        assert_eq!(stripe.offset(), Err(AnalysisError::NoMainPulse));
    }

    #[test]
    fn test_offset_rejects_nan_neighbor() {
        let matrix = vec![vec![0.0, 5.0, f64::NAN, 0.0]];
        let stripe = Stripe::from_matrix(vec![100.0], matrix, 1);
        assert_eq!(stripe.offset(), Err(AnalysisError::NoMainPulse));
    }

    #[test]
    fn test_offset_tie_break() {
        let matrix = vec![
            vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 3.0, 0.0, 0.0, 3.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 3.0, 0.0],
        ];
        let stripe = Stripe::from_matrix(vec![10.0, 20.0, 30.0], matrix, 1);
        assert_eq!(stripe.offset(), Ok((20.0, 1)));
    }

    #[test]
    fn test_squeeze_sums_frequencies() {
        let matrix = vec![vec![1.0, 2.0, 3.0], vec![0.5, 0.5, 0.5]];
        let stripe = Stripe::from_matrix(vec![1.0, 2.0], matrix, 1);
        let series = stripe.squeeze();
        assert_eq!(series.values(), &[1.5, 2.5, 3.5]);
    }
}
