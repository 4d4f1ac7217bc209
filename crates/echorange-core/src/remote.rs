//! HTTP emitter and receiver clients with latency calibration
//!
//! The emitter and receiver run as separate services (see the
//! `echorange-server` crate). Before measuring, [`HttpFactory`] probes both
//! services' `/latency` endpoint several times, round-robin, discards the
//! first round and derives a nominal delay. Each `/play` and `/record` call
//! then carries `schedule = now + delay`, and both services sleep until that
//! wall-clock instant before acting.
//!
//! ## Endpoints
//!
//! | Method | Path | Body | Response |
//! |---|---|---|---|
//! | GET | `/health` | | `{"status":"ok"}` or 503 `{"error_name","error_message"}` |
//! | POST | `/latency` | `{"trigger_timestamp"}` | `{"latency_s"}` |
//! | POST | `/play` | `{"schedule"}` | 204 |
//! | POST | `/record` | `{"schedule"}` | PCM bytes |
//! | POST | `/stop` | | 204 |

use crate::config::SonarConfig;
use crate::device::{DeviceError, DeviceFactory, Emitter, Receiver};
use crate::processor::SignalProcessor;
use crate::sample::SampleBuffer;
use crate::sync::SyncError;
use crate::timestamp::Timestamp;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const HEALTH_ENDPOINT: &str = "/health";
pub const LATENCY_ENDPOINT: &str = "/latency";
pub const PLAY_ENDPOINT: &str = "/play";
pub const RECORD_ENDPOINT: &str = "/record";
pub const STOP_ENDPOINT: &str = "/stop";

/// Safety factor applied to the worst observed latency
pub const LATENCY_FACTOR: f64 = 1.1;

/// Longest error body kept in a [`DeviceError::Status`]
const MAX_ERROR_BODY: usize = 200;

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Health check failure body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthErrorResponse {
    pub error_name: String,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRequest {
    pub trigger_timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyResponse {
    pub latency_s: f64,
}

/// Body of `/play` and `/record`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub schedule: Timestamp,
}

/// Where the services live and how to calibrate against them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub emitter_url: String,
    pub receiver_url: String,
    /// Probes per service
    pub calibration_rounds: usize,
    /// Added to the scaled worst latency
    pub latency_margin_s: f64,
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            emitter_url: "http://127.0.0.1:8001".to_string(),
            receiver_url: "http://127.0.0.1:8002".to_string(),
            calibration_rounds: 4,
            latency_margin_s: 0.030,
            request_timeout_ms: 10_000,
        }
    }
}

/// Scheduling delay from round-major latency probes
///
/// The first `endpoints` entries (the first round) are discarded, as are
/// failed probes. Returns `None` when nothing usable remains.
///
/// # Example
/// ```
/// use echorange_core::remote::nominal_delay;
///
/// let probes = [Some(0.5), Some(0.6), Some(0.1), Some(0.12)];
/// let delay = nominal_delay(&probes, 2, 0.03).unwrap();
/// assert!((delay - (1.1 * 0.12 + 0.03)).abs() < 1e-12);
/// ```
pub fn nominal_delay(latencies: &[Option<f64>], endpoints: usize, margin: f64) -> Option<f64> {
    latencies
        .iter()
        .skip(endpoints)
        .flatten()
        .copied()
        .reduce(f64::max)
        .map(|worst| LATENCY_FACTOR * worst + margin)
}

/// Connection to one service
#[derive(Debug, Clone)]
struct Endpoint {
    client: Client,
    base_url: String,
}

impl Endpoint {
    fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, path: &str, source: reqwest::Error) -> DeviceError {
        DeviceError::Http {
            endpoint: self.url(path),
            source,
        }
    }

    /// Pass successful responses through, turn the rest into [`DeviceError::Status`]
    fn validate(&self, path: &str, response: Response) -> Result<Response, DeviceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let message = match serde_json::from_str::<HealthErrorResponse>(&body) {
            Ok(err) => format!("{}: {}", err.error_name, err.error_message),
            Err(_) => body.chars().take(MAX_ERROR_BODY).collect(),
        };
        tracing::warn!(
            endpoint = %self.url(path),
            status = status.as_u16(),
            message = %message,
            "unexpected_response"
        );
        Err(DeviceError::Status {
            endpoint: self.url(path),
            status: status.as_u16(),
            message,
        })
    }

    fn check(&self) -> Result<(), DeviceError> {
        let response = self
            .client
            .get(self.url(HEALTH_ENDPOINT))
            .send()
            .map_err(|e| self.transport_error(HEALTH_ENDPOINT, e))?;
        self.validate(HEALTH_ENDPOINT, response)?;
        Ok(())
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Response, DeviceError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|e| self.transport_error(path, e))?;
        self.validate(path, response)
    }

    fn probe_latency(&self) -> Result<f64, DeviceError> {
        let request = LatencyRequest {
            trigger_timestamp: Timestamp::now(),
        };
        let response: LatencyResponse = self
            .post(LATENCY_ENDPOINT, &request)?
            .json()
            .map_err(|e| self.transport_error(LATENCY_ENDPOINT, e))?;
        Ok(response.latency_s)
    }

    fn stop(&self) -> Result<(), DeviceError> {
        let response = self
            .client
            .post(self.url(STOP_ENDPOINT))
            .send()
            .map_err(|e| self.transport_error(STOP_ENDPOINT, e))?;
        self.validate(STOP_ENDPOINT, response)?;
        Ok(())
    }
}

/// Emitter service client
pub struct HttpEmitter {
    endpoint: Endpoint,
    delay_s: f64,
}

impl Emitter for HttpEmitter {
    fn check(&self) -> Result<(), DeviceError> {
        self.endpoint.check()
    }

    fn emit_beep(&self) -> Result<(), DeviceError> {
        let request = ScheduleRequest {
            schedule: Timestamp::offset_by_secs(self.delay_s),
        };
        self.endpoint.post(PLAY_ENDPOINT, &request)?;
        tracing::debug!(schedule = %request.schedule, "remote_beep_played");
        Ok(())
    }
}

/// Receiver service client
pub struct HttpReceiver {
    endpoint: Endpoint,
    delay_s: f64,
}

impl Receiver for HttpReceiver {
    fn check(&self) -> Result<(), DeviceError> {
        self.endpoint.check()
    }

    fn record_signal(&self) -> Result<SampleBuffer, DeviceError> {
        let request = ScheduleRequest {
            schedule: Timestamp::offset_by_secs(self.delay_s),
        };
        let data = self
            .endpoint
            .post(RECORD_ENDPOINT, &request)?
            .bytes()
            .map_err(|e| self.endpoint.transport_error(RECORD_ENDPOINT, e))?;
        let sample = SampleBuffer::from_data(&data)?;
        tracing::debug!(schedule = %request.schedule, frames = sample.len(), "remote_signal_recorded");
        Ok(sample)
    }
}

/// Factory for latency-calibrated remote devices
pub struct HttpFactory {
    emitter: Endpoint,
    receiver: Endpoint,
    sonar: SonarConfig,
    delay_s: f64,
}

impl HttpFactory {
    /// Connect to both services and calibrate the scheduling delay
    pub fn new(config: &RemoteConfig, sonar: SonarConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| DeviceError::Http {
                endpoint: config.emitter_url.clone(),
                source: e,
            })?;

        let mut factory = Self {
            emitter: Endpoint::new(client.clone(), &config.emitter_url),
            receiver: Endpoint::new(client, &config.receiver_url),
            sonar,
            delay_s: 0.0,
        };
        factory.delay_s = factory.calibrate(config.calibration_rounds, config.latency_margin_s)?;
        Ok(factory)
    }

    /// Probe both services round-robin and derive the nominal delay
    pub fn calibrate(&self, rounds: usize, margin: f64) -> Result<f64, SyncError> {
        let endpoints = [&self.emitter, &self.receiver];
        let mut latencies = Vec::with_capacity(rounds * endpoints.len());

        for round in 0..rounds {
            for endpoint in endpoints {
                match endpoint.probe_latency() {
                    Ok(latency) => {
                        tracing::debug!(round, endpoint = %endpoint.base_url, latency, "latency_probed");
                        latencies.push(Some(latency));
                    }
                    Err(err) => {
                        let status = match &err {
                            DeviceError::Status { status, .. } => Some(*status),
                            _ => None,
                        };
                        tracing::warn!(
                            round,
                            endpoint = %endpoint.base_url,
                            kind = err.name(),
                            status,
                            error = %err,
                            "latency_probe_failed"
                        );
                        latencies.push(None);
                    }
                }
            }
        }

        let delay = nominal_delay(&latencies, endpoints.len(), margin).ok_or_else(|| {
            SyncError::Calibration(format!(
                "no latency probe succeeded after the first of {} rounds",
                rounds
            ))
        })?;
        tracing::info!(delay_s = delay, probes = latencies.len(), "latency_calibrated");
        Ok(delay)
    }

    /// Calibrated scheduling delay in seconds
    pub fn delay(&self) -> f64 {
        self.delay_s
    }

    /// Ask both services to shut down
    pub fn stop_services(&self) -> Result<(), DeviceError> {
        self.emitter.stop()?;
        self.receiver.stop()
    }
}

impl DeviceFactory for HttpFactory {
    fn create_emitter(&self) -> Result<Box<dyn Emitter>, DeviceError> {
        Ok(Box::new(HttpEmitter {
            endpoint: self.emitter.clone(),
            delay_s: self.delay_s,
        }))
    }

    fn create_receiver(&self) -> Result<Box<dyn Receiver>, DeviceError> {
        Ok(Box::new(HttpReceiver {
            endpoint: self.receiver.clone(),
            delay_s: self.delay_s,
        }))
    }

    fn create_processor(&self) -> SignalProcessor {
        SignalProcessor::new(self.sonar.clone())
    }
}
