//! HTTP handlers for the emitter and receiver services
//!
//! Device calls block, so they run on the blocking pool.

use crate::{AppState, ServiceDevice};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use echorange_core::remote::{
    HealthErrorResponse, HealthResponse, LatencyRequest, LatencyResponse, ScheduleRequest,
};
use echorange_core::timestamp::Timestamp;
use echorange_core::DeviceError;
use std::time::Duration;

/// Error status plus the `{error_name, error_message}` body
pub type ApiError = (StatusCode, Json<HealthErrorResponse>);

fn device_failure(status: StatusCode, err: &DeviceError) -> ApiError {
    tracing::warn!(kind = err.name(), error = %err, "device_call_failed");
    (
        status,
        Json(HealthErrorResponse {
            error_name: err.name().to_string(),
            error_message: err.to_string(),
        }),
    )
}

fn task_failure(err: tokio::task::JoinError) -> ApiError {
    tracing::error!("Device task failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(HealthErrorResponse {
            error_name: "TaskError".to_string(),
            error_message: err.to_string(),
        }),
    )
}

fn wrong_role(state: &AppState) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(HealthErrorResponse {
            error_name: "WrongRole".to_string(),
            error_message: format!("this is a {} service", state.role()),
        }),
    )
}

/// Time left until `schedule`, if it lies within the service's horizon
fn schedule_wait(state: &AppState, schedule: &Timestamp) -> Result<Duration, ApiError> {
    let wait = schedule.remaining();
    let limit = state.config.max_schedule_ahead();
    if wait > limit {
        tracing::warn!(schedule = %schedule, wait_s = wait.as_secs_f64(), "schedule_rejected");
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(HealthErrorResponse {
                error_name: "ScheduleTooFar".to_string(),
                error_message: format!(
                    "schedule {} is {:.3} s ahead, limit is {:.3} s",
                    schedule,
                    wait.as_secs_f64(),
                    limit.as_secs_f64()
                ),
            }),
        ));
    }
    Ok(wait)
}

async fn check_device(state: AppState, status: StatusCode) -> Result<(), ApiError> {
    tokio::task::spawn_blocking(move || state.check_device())
        .await
        .map_err(task_failure)?
        .map_err(|e| device_failure(status, &e))
}

/// GET /health
pub async fn get_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    check_device(state, StatusCode::SERVICE_UNAVAILABLE).await?;
    Ok(Json(HealthResponse::default()))
}

/// POST /latency
///
/// The device check runs first, so the reported latency includes it.
pub async fn post_latency(
    State(state): State<AppState>,
    Json(request): Json<LatencyRequest>,
) -> Result<Json<LatencyResponse>, ApiError> {
    check_device(state, StatusCode::SERVICE_UNAVAILABLE).await?;
    let latency_s = request.trigger_timestamp.latency_since();
    tracing::debug!(trigger = %request.trigger_timestamp, latency_s, "latency_reported");
    Ok(Json(LatencyResponse { latency_s }))
}

/// POST /play
pub async fn post_play(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<StatusCode, ApiError> {
    let ServiceDevice::Emitter(emitter) = state.device.clone() else {
        return Err(wrong_role(&state));
    };

    tokio::time::sleep(schedule_wait(&state, &request.schedule)?).await;
    tokio::task::spawn_blocking(move || emitter.emit_beep())
        .await
        .map_err(task_failure)?
        .map_err(|e| device_failure(StatusCode::INTERNAL_SERVER_ERROR, &e))?;

    tracing::debug!(schedule = %request.schedule, "beep_played");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /record
///
/// Responds with the recording as 16-bit little-endian PCM.
pub async fn post_record(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Response, ApiError> {
    let ServiceDevice::Receiver(receiver) = state.device.clone() else {
        return Err(wrong_role(&state));
    };

    tokio::time::sleep(schedule_wait(&state, &request.schedule)?).await;
    let sample = tokio::task::spawn_blocking(move || receiver.record_signal())
        .await
        .map_err(task_failure)?
        .map_err(|e| device_failure(StatusCode::INTERNAL_SERVER_ERROR, &e))?;

    tracing::debug!(schedule = %request.schedule, frames = sample.len(), "signal_recorded");
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        sample.to_data(),
    )
        .into_response())
}

/// POST /stop
pub async fn post_stop(State(state): State<AppState>) -> StatusCode {
    tracing::info!(role = %state.role(), "stop_requested");
    // A stored permit covers a stop that arrives before shutdown is awaited
    state.shutdown.notify_one();
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{serve, ServiceConfig, ServiceRole};
    use echorange_core::device::simulated::{SimulatedEmitter, SimulatedReceiver, SimulatedRoom};
    use echorange_core::{Emitter, SampleBuffer, SonarConfig};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    struct BrokenEmitter;

    impl Emitter for BrokenEmitter {
        fn check(&self) -> Result<(), DeviceError> {
            Err(DeviceError::NotFound("output"))
        }

        fn emit_beep(&self) -> Result<(), DeviceError> {
            Err(DeviceError::NotFound("output"))
        }
    }

    fn room() -> Arc<SimulatedRoom> {
        Arc::new(SimulatedRoom::detached(SonarConfig::default()))
    }

    /// Serve on an ephemeral port; returns the base URL
    async fn spawn(state: AppState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));
        format!("http://{}", addr)
    }

    fn emitter_state() -> AppState {
        AppState::emitter(
            ServiceConfig::for_role(ServiceRole::Emitter),
            Arc::new(SimulatedEmitter::new(room())),
        )
    }

    fn receiver_state() -> AppState {
        AppState::receiver(
            ServiceConfig::for_role(ServiceRole::Receiver),
            Arc::new(SimulatedReceiver::new(room())),
        )
    }

    #[test]
    fn test_health_error_serializes() {
        let (status, Json(body)) =
            device_failure(StatusCode::SERVICE_UNAVAILABLE, &DeviceError::NotFound("input"));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"error_name\":\"DeviceNotFound\""));
        assert!(json.contains("input"));
    }

    #[test]
    fn test_role_defaults() {
        assert_eq!(ServiceConfig::for_role(ServiceRole::Emitter).port, 8001);
        assert_eq!(ServiceConfig::for_role(ServiceRole::Receiver).port, 8002);
        assert_eq!(emitter_state().role(), ServiceRole::Emitter);
        assert_eq!(receiver_state().role(), ServiceRole::Receiver);
    }

    #[tokio::test]
    async fn test_health_ok() {
        let url = spawn(emitter_state()).await;
        let response = reqwest::get(format!("{}/health", url)).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: HealthResponse = response.json().await.unwrap();
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_health_unavailable() {
        let state = AppState::emitter(
            ServiceConfig::for_role(ServiceRole::Emitter),
            Arc::new(BrokenEmitter),
        );
        let url = spawn(state).await;
        let response = reqwest::get(format!("{}/health", url)).await.unwrap();
        assert_eq!(response.status(), 503);
        let body: HealthErrorResponse = response.json().await.unwrap();
        assert_eq!(body.error_name, "DeviceNotFound");
    }

    #[tokio::test]
    async fn test_latency_reports_elapsed_time() {
        let url = spawn(receiver_state()).await;
        let request = LatencyRequest {
            trigger_timestamp: Timestamp::offset_by_secs(-0.2),
        };
        let response = reqwest::Client::new()
            .post(format!("{}/latency", url))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: LatencyResponse = response.json().await.unwrap();
        assert!(body.latency_s >= 0.2 && body.latency_s < 1.0, "{}", body.latency_s);
    }

    #[tokio::test]
    async fn test_malformed_timestamp_rejected() {
        let url = spawn(emitter_state()).await;
        let response = reqwest::Client::new()
            .post(format!("{}/play", url))
            .header("content-type", "application/json")
            .body(r#"{"schedule": "2023-10-10T10:10:10.5"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 422);
        let text = response.text().await.unwrap();
        assert!(text.contains("9 fractional digits"), "{}", text);
    }

    #[tokio::test]
    async fn test_play_waits_for_schedule() {
        let url = spawn(emitter_state()).await;
        let schedule = Timestamp::offset_by_secs(0.2);
        let response = reqwest::Client::new()
            .post(format!("{}/play", url))
            .json(&ScheduleRequest { schedule })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 204);
        assert!(schedule.latency_since() >= 0.0);
    }

    #[tokio::test]
    async fn test_record_returns_pcm() {
        let url = spawn(receiver_state()).await;
        let response = reqwest::Client::new()
            .post(format!("{}/record", url))
            .json(&ScheduleRequest {
                schedule: Timestamp::now(),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()["content-type"],
            "application/octet-stream"
        );
        let bytes = response.bytes().await.unwrap();
        let sample = SampleBuffer::from_data(&bytes).unwrap();
        assert_eq!(sample.len(), SonarConfig::default().record_frames());
    }

    #[tokio::test]
    async fn test_distant_schedule_rejected() {
        let client = reqwest::Client::new();
        let schedule = Timestamp::offset_by_secs(3600.0);
        for (url, route) in [
            (spawn(emitter_state()).await, "play"),
            (spawn(receiver_state()).await, "record"),
        ] {
            let started = std::time::Instant::now();
            let response = client
                .post(format!("{}/{}", url, route))
                .json(&ScheduleRequest { schedule })
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 422);
            let body: HealthErrorResponse = response.json().await.unwrap();
            assert_eq!(body.error_name, "ScheduleTooFar");
            assert!(started.elapsed() < std::time::Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn test_schedule_horizon_is_configurable() {
        let mut config = ServiceConfig::for_role(ServiceRole::Emitter);
        config.max_schedule_ahead_ms = 100;
        let url = spawn(AppState::emitter(config, Arc::new(SimulatedEmitter::new(room())))).await;

        let response = reqwest::Client::new()
            .post(format!("{}/play", url))
            .json(&ScheduleRequest {
                schedule: Timestamp::offset_by_secs(0.5),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 422);
    }

    #[tokio::test]
    async fn test_role_routes_are_exclusive() {
        let url = spawn(emitter_state()).await;
        let response = reqwest::Client::new()
            .post(format!("{}/record", url))
            .json(&ScheduleRequest {
                schedule: Timestamp::now(),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_stop_shuts_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(serve(listener, emitter_state()));

        let response = reqwest::Client::new()
            .post(format!("{}/stop", url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 204);

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server did not stop");
        assert!(result.unwrap().is_ok());
    }
}
