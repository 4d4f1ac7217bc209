//! Outcome of processing one recording

use crate::processor::ProcessingError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Intensity above which a reflection is considered reliable
pub const RELIABILITY_THRESHOLD: f64 = 2.5;

/// One detected reflection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Distance to the reflecting surface in meters
    pub distance: f64,
    /// Prominence relative to the noise floor
    pub intensity: f64,
}

impl Peak {
    pub fn new(distance: f64, intensity: f64) -> Self {
        Self {
            distance,
            intensity,
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.intensity > RELIABILITY_THRESHOLD
    }
}

/// Ranged reflections of one measurement cycle, or the reason there are none
#[derive(Debug, Clone, PartialEq)]
pub struct RangingResult {
    peaks: Vec<Peak>,
    noise: f64,
    snr: f64,
    metadata: BTreeMap<String, f64>,
    error: Option<ProcessingError>,
}

/// Serializable form of a [`RangingResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub peaks: Vec<PeakRecord>,
    pub noise: f64,
    pub snr: f64,
    pub error: Option<String>,
    pub metadata: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    pub distance: f64,
    pub intensity: f64,
    pub reliable: bool,
}

impl RangingResult {
    /// Successful result; peaks are sorted by ascending distance
    pub fn new(
        peaks: impl IntoIterator<Item = Peak>,
        noise: f64,
        snr: f64,
        metadata: BTreeMap<String, f64>,
    ) -> Self {
        let mut peaks: Vec<Peak> = peaks.into_iter().collect();
        peaks.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Self {
            peaks,
            noise,
            snr,
            metadata,
            error: None,
        }
    }

    /// Failed result carrying a single zero placeholder peak
    pub fn from_error(error: ProcessingError, metadata: BTreeMap<String, f64>) -> Self {
        Self {
            peaks: vec![Peak::new(0.0, 0.0)],
            noise: 0.0,
            snr: 0.0,
            metadata,
            error: Some(error),
        }
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn noise(&self) -> f64 {
        self.noise
    }

    pub fn snr(&self) -> f64 {
        self.snr
    }

    pub fn metadata(&self) -> &BTreeMap<String, f64> {
        &self.metadata
    }

    pub fn error(&self) -> Option<&ProcessingError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn to_record(&self) -> ResultRecord {
        ResultRecord {
            peaks: self
                .peaks
                .iter()
                .map(|p| PeakRecord {
                    distance: p.distance,
                    intensity: p.intensity,
                    reliable: p.is_reliable(),
                })
                .collect(),
            noise: self.noise,
            snr: self.snr,
            error: self
                .error
                .as_ref()
                .map(|e| format!("{}: {}", e.kind(), e)),
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Display for RangingResult {
    /// Multi-line operator report
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=========================")?;
        writeln!(f, "Distance:")?;
        for peak in &self.peaks {
            let line = format!("{:.2} m\tintensity: {:.2}", peak.distance, peak.intensity);
            if peak.is_reliable() {
                writeln!(f, "\t{}", line)?;
            } else {
                writeln!(f, "\t[{}] - unreliable", line)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "background noise: {:.2}", self.noise)?;
        write!(f, "signal-to-noise ratio: {:.1}", self.snr)?;
        if let Some(error) = &self.error {
            write!(f, "\n\n[ERROR] {}: {}", error.kind(), error)?;
        }
        if !self.metadata.is_empty() {
            let entries: Vec<String> = self
                .metadata
                .iter()
                .map(|(k, v)| format!("{}: {:.2}", k, v))
                .collect();
            write!(f, "\n\n{}", entries.join(", "))?;
        }
        Ok(())
    }
}
