//! Echorange Service - Axum emitter/receiver endpoints
//!
//! One process serves one role. An emitter service plays the pulse at a
//! scheduled instant, a receiver service records at a scheduled instant and
//! returns the PCM bytes. Both expose health, latency probing and shutdown.

pub mod api;

use axum::routing::{get, post};
use axum::Router;
use echorange_core::{DeviceError, Emitter, Receiver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;

/// Which device a service drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Emitter,
    Receiver,
}

impl ServiceRole {
    pub fn default_port(self) -> u16 {
        match self {
            ServiceRole::Emitter => 8001,
            ServiceRole::Receiver => 8002,
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceRole::Emitter => f.write_str("emitter"),
            ServiceRole::Receiver => f.write_str("receiver"),
        }
    }
}

/// Furthest a `/play` or `/record` schedule may lie in the future
///
/// A few seconds past the client's default request timeout.
pub const DEFAULT_MAX_SCHEDULE_AHEAD_MS: u64 = 15_000;

fn default_max_schedule_ahead_ms() -> u64 {
    DEFAULT_MAX_SCHEDULE_AHEAD_MS
}

/// Service configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub role: ServiceRole,
    /// Bind address
    pub bind_addr: String,
    /// Port to listen on
    pub port: u16,
    /// Schedules further ahead than this are rejected
    #[serde(default = "default_max_schedule_ahead_ms")]
    pub max_schedule_ahead_ms: u64,
}

impl ServiceConfig {
    /// Listen on all interfaces at the role's default port
    pub fn for_role(role: ServiceRole) -> Self {
        Self {
            role,
            bind_addr: "0.0.0.0".to_string(),
            port: role.default_port(),
            max_schedule_ahead_ms: DEFAULT_MAX_SCHEDULE_AHEAD_MS,
        }
    }

    pub fn max_schedule_ahead(&self) -> Duration {
        Duration::from_millis(self.max_schedule_ahead_ms)
    }
}

/// The device a service owns
#[derive(Clone)]
pub enum ServiceDevice {
    Emitter(Arc<dyn Emitter>),
    Receiver(Arc<dyn Receiver>),
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub device: ServiceDevice,
    /// Server configuration
    pub config: ServiceConfig,
    /// Signalled by `/stop`
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn emitter(config: ServiceConfig, emitter: Arc<dyn Emitter>) -> Self {
        Self {
            device: ServiceDevice::Emitter(emitter),
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn receiver(config: ServiceConfig, receiver: Arc<dyn Receiver>) -> Self {
        Self {
            device: ServiceDevice::Receiver(receiver),
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn role(&self) -> ServiceRole {
        match self.device {
            ServiceDevice::Emitter(_) => ServiceRole::Emitter,
            ServiceDevice::Receiver(_) => ServiceRole::Receiver,
        }
    }

    /// Run the owned device's check (blocking)
    pub fn check_device(&self) -> Result<(), DeviceError> {
        match &self.device {
            ServiceDevice::Emitter(emitter) => emitter.check(),
            ServiceDevice::Receiver(receiver) => receiver.check(),
        }
    }
}

/// Build the Axum router for the state's role
pub fn build_router(state: AppState) -> Router {
    let common = Router::new()
        .route("/health", get(api::get_health))
        .route("/latency", post(api::post_latency))
        .route("/stop", post(api::post_stop));

    let role_routes = match state.role() {
        ServiceRole::Emitter => Router::new().route("/play", post(api::post_play)),
        ServiceRole::Receiver => Router::new().route("/record", post(api::post_record)),
    };

    common
        .merge(role_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until `/stop`
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind_addr, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, role = %state.role(), "Echorange service listening");
    serve(listener, state).await
}

/// Serve on an already bound listener until `/stop`
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let shutdown = Arc::clone(&state.shutdown);
    let role = state.role();

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await?;

    tracing::info!(%role, "Echorange service stopped");
    Ok(())
}
