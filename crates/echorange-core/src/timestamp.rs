//! Wall-clock timestamps exchanged with the emitter and receiver services
//!
//! Format: local date-time `%Y-%m-%dT%H:%M:%S`, a literal `.`, and exactly
//! nine fractional digits (nanoseconds), e.g. `2023-10-10T10:10:10.500000000`.
//! Both sides of a distributed measurement are assumed to share a wall clock.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const FRACTION_DIGITS: usize = 9;
const NANOS_PER_SEC: f64 = 1e9;

/// Errors raised while parsing a timestamp
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimestampError {
    #[error("Timestamp '{0}' has no fractional seconds")]
    MissingFraction(String),

    #[error("Timestamp '{0}' must have exactly {FRACTION_DIGITS} fractional digits")]
    InvalidFraction(String),

    #[error("Timestamp '{value}' is not a valid date-time: {reason}")]
    InvalidDateTime { value: String, reason: String },

    #[error("Timestamp '{0}' does not exist in the local time zone")]
    NonexistentLocalTime(String),
}

/// A local wall-clock instant with nanosecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(DateTime<Local>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Local::now())
    }

    /// Now shifted by `secs` (may be negative)
    pub fn offset_by_secs(secs: f64) -> Self {
        Self::now().after_secs(secs)
    }

    /// This instant shifted by `secs` (may be negative)
    pub fn after_secs(&self, secs: f64) -> Self {
        let nanos = (secs * NANOS_PER_SEC).round() as i64;
        Self(self.0 + chrono::Duration::nanoseconds(nanos))
    }

    /// Seconds elapsed since this instant (negative if it lies in the future)
    pub fn latency_since(&self) -> f64 {
        self.seconds_until(&Self::now())
    }

    /// Seconds from this instant to `other`
    pub fn seconds_until(&self, other: &Timestamp) -> f64 {
        let delta = other.0.signed_duration_since(self.0);
        delta
            .num_nanoseconds()
            .map_or(delta.num_milliseconds() as f64 / 1e3, |n| n as f64 / NANOS_PER_SEC)
    }

    /// Time left until this instant, zero if it has passed
    pub fn remaining(&self) -> Duration {
        (self.0 - Local::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Block the current thread until this instant; returns at once if it has passed
    pub fn wait_until_blocking(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }

    pub fn as_datetime(&self) -> &DateTime<Local> {
        &self.0
    }
}

impl From<DateTime<Local>> for Timestamp {
    fn from(dt: DateTime<Local>) -> Self {
        Self(dt)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Leap-second nanos (>= 1e9) fold back into the current second
        let nanos = self.0.nanosecond() % 1_000_000_000;
        write!(f, "{}.{:09}", self.0.format(DATE_TIME_FORMAT), nanos)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (main, fraction) = s
            .split_once('.')
            .ok_or_else(|| TimestampError::MissingFraction(s.to_string()))?;

        if fraction.len() != FRACTION_DIGITS || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimestampError::InvalidFraction(s.to_string()));
        }
        let nanos: u32 = fraction
            .parse()
            .map_err(|_| TimestampError::InvalidFraction(s.to_string()))?;

        let naive = NaiveDateTime::parse_from_str(main, DATE_TIME_FORMAT).map_err(|e| {
            TimestampError::InvalidDateTime {
                value: s.to_string(),
                reason: e.to_string(),
            }
        })?;
        let local = Local
            .from_local_datetime(&naive)
            .earliest()
            .and_then(|dt| dt.with_nanosecond(nanos))
            .ok_or_else(|| TimestampError::NonexistentLocalTime(s.to_string()))?;

        Ok(Self(local))
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "2023-10-10T10:10:10.500000000";

    #[test]
    fn test_parse_and_format() {
        let ts: Timestamp = SAMPLE.parse().unwrap();
        assert_eq!(ts.to_string(), SAMPLE);
        assert_eq!(ts.as_datetime().nanosecond(), 500_000_000);
    }

    #[test]
    fn test_format_shape() {
        let text = Timestamp::now().to_string();
        let (main, fraction) = text.split_once('.').unwrap();
        assert_eq!(main.len(), 19);
        assert_eq!(&main[10..11], "T");
        assert_eq!(fraction.len(), 9);
        assert!(fraction.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_reject_missing_fraction() {
        assert!(matches!(
            "2023-10-10T10:10:10".parse::<Timestamp>(),
            Err(TimestampError::MissingFraction(_))
        ));
    }

    #[test]
    fn test_reject_wrong_fraction_length() {
        for bad in [
            "2023-10-10T10:10:10.5",
            "2023-10-10T10:10:10.50000000",
            "2023-10-10T10:10:10.5000000000",
            "2023-10-10T10:10:10.50000000x",
            "2023-10-10T10:10:10.",
        ] {
            assert!(
                matches!(bad.parse::<Timestamp>(), Err(TimestampError::InvalidFraction(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_reject_bad_date() {
        assert!(matches!(
            "2023-13-10T10:10:10.000000000".parse::<Timestamp>(),
            Err(TimestampError::InvalidDateTime { .. })
        ));
        assert!(matches!(
            "yesterday.000000000".parse::<Timestamp>(),
            Err(TimestampError::InvalidDateTime { .. })
        ));
    }

    #[test]
    fn test_round_trip_now() {
        let ts = Timestamp::now();
        let parsed: Timestamp = ts.to_string().parse().unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_offset_and_latency() {
        let ahead = Timestamp::offset_by_secs(0.5);
        let latency = ahead.latency_since();
        assert!(latency < -0.4 && latency > -0.6, "latency {}", latency);

        let behind = Timestamp::offset_by_secs(-0.25);
        let latency = behind.latency_since();
        assert!(latency >= 0.25 && latency < 0.35, "latency {}", latency);
    }

    #[test]
    fn test_seconds_until() {
        let start: Timestamp = SAMPLE.parse().unwrap();
        let end = start.after_secs(1.25);
        assert!((start.seconds_until(&end) - 1.25).abs() < 1e-9);
        assert_eq!(end.to_string(), "2023-10-10T10:10:11.750000000");
    }

    #[test]
    fn test_remaining() {
        assert_eq!(Timestamp::offset_by_secs(-1.0).remaining(), Duration::ZERO);
        let remaining = Timestamp::offset_by_secs(1.0).remaining();
        assert!(remaining > Duration::from_millis(900));
        assert!(remaining <= Duration::from_secs(1));
    }

    #[test]
    fn test_wait_until_blocking() {
        let target = Timestamp::offset_by_secs(0.05);
        target.wait_until_blocking();
        assert!(target.latency_since() >= 0.0);

        // Past instants return immediately
        let start = std::time::Instant::now();
        Timestamp::offset_by_secs(-5.0).wait_until_blocking();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_serde_as_string() {
        let ts: Timestamp = SAMPLE.parse().unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, format!("\"{}\"", SAMPLE));

        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
        assert!(serde_json::from_str::<Timestamp>("\"2023-10-10T10:10:10\"").is_err());
    }
}
