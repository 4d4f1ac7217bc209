//! Time-frequency analysis of a recorded pulse
//!
//! - [`stripe`]: wavelet energy map over the carrier band
//! - [`series`]: energy trace collapsed over frequencies, noise floor and peaks
//! - [`peaks`]: local-maximum search with height, distance and prominence filters
//! - [`spectrum`]: dominant frequency of a whole recording

pub mod peaks;
pub mod series;
pub mod spectrum;
pub mod stripe;

use thiserror::Error;

/// Errors raised by the wavelet analysis
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Energy map is empty")]
    EmptyMatrix,

    #[error("No local maximum qualifies as the main pulse")]
    NoMainPulse,

    #[error("Wavelet shape {0} gives no decaying envelope")]
    DegenerateWavelet(f64),
}
