//! Dominant frequency of a recording
//!
//! Magnitude spectrum of the positive half of an FFT, smoothed with a
//! Gaussian kernel so that a single noisy bin cannot win.

use rustfft::{num_complex::Complex, FftPlanner};

/// Gaussian kernel radius in standard deviations
const TRUNCATE: f64 = 4.0;

/// Magnitudes of the non-negative frequency bins (`n / 2 + 1` values)
pub fn magnitude_spectrum(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let mut buffer: Vec<Complex<f64>> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
    FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut buffer);
    buffer.truncate(n / 2 + 1);
    buffer.into_iter().map(|c| c.norm()).collect()
}

/// Gaussian smoothing with mirrored edges (the edge sample is repeated)
pub fn gaussian_blur(values: &[f64], sigma: f64) -> Vec<f64> {
    if values.is_empty() || sigma <= 0.0 {
        return values.to_vec();
    }
    let radius = (TRUNCATE * sigma + 0.5) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    let n = values.len() as i64;
    let reflect = |mut i: i64| -> usize {
        // Period of the mirrored sequence is 2n
        i = i.rem_euclid(2 * n);
        if i >= n {
            i = 2 * n - 1 - i;
        }
        i as usize
    };

    (0..n)
        .map(|i| {
            weights
                .iter()
                .zip(-radius..=radius)
                .map(|(w, k)| w * values[reflect(i + k)])
                .sum::<f64>()
                / total
        })
        .collect()
}

/// Frequency in Hz of the strongest smoothed spectral bin
///
/// Returns 0.0 for an empty recording.
pub fn dominant_frequency(values: &[f64], sample_rate: u32, blur_bins: f64) -> f64 {
    let spectrum = gaussian_blur(&magnitude_spectrum(values), blur_bins);
    let peak_bin = spectrum
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &m)| match best {
            Some((_, top)) if m <= top => best,
            _ => Some((i, m)),
        })
        .map_or(0, |(i, _)| i);

    if values.is_empty() {
        0.0
    } else {
        peak_bin as f64 * sample_rate as f64 / values.len() as f64
    }
}
