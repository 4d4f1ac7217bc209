//! Standalone emitter or receiver service
//!
//! Run one instance per role, e.g. `echo-service --role emitter` on the
//! machine with the speaker and `echo-service --role receiver` on the one
//! with the microphone. `--simulate` replaces the sound card with a
//! simulated room.

use clap::Parser;
use echorange_core::device::simulated::{SimulatedEmitter, SimulatedReceiver, SimulatedRoom};
use echorange_core::{Emitter, Receiver, SonarConfig};
use echorange_server::{AppState, ServiceConfig, ServiceRole};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "echo-service")]
#[command(author, version, about = "Echorange emitter/receiver service", long_about = None)]
struct Args {
    /// Device this service drives
    #[arg(long, value_enum)]
    role: ServiceRole,

    /// Port to listen on (default: 8001 emitter, 8002 receiver)
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Reject /play and /record schedules further ahead than this, in milliseconds
    #[arg(long, default_value_t = echorange_server::DEFAULT_MAX_SCHEDULE_AHEAD_MS)]
    max_schedule_ms: u64,

    /// Use a simulated room instead of the sound card
    #[arg(long)]
    simulate: bool,

    /// Sonar configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn sound_card_state(config: ServiceConfig, sonar: SonarConfig) -> anyhow::Result<AppState> {
    #[cfg(feature = "audio-device")]
    {
        use echorange_core::device::sound_card::{CpalEmitter, CpalReceiver};

        Ok(match config.role {
            ServiceRole::Emitter => AppState::emitter(config, Arc::new(CpalEmitter::new(sonar))),
            ServiceRole::Receiver => AppState::receiver(config, Arc::new(CpalReceiver::new(sonar))),
        })
    }

    #[cfg(not(feature = "audio-device"))]
    {
        let _ = (config, sonar);
        anyhow::bail!("built without the audio-device feature; use --simulate")
    }
}

fn simulated_state(config: ServiceConfig, sonar: SonarConfig) -> AppState {
    let room = Arc::new(SimulatedRoom::detached(sonar).with_reflection(2.0, 0.15));
    match config.role {
        ServiceRole::Emitter => {
            let emitter: Arc<dyn Emitter> = Arc::new(SimulatedEmitter::new(room));
            AppState::emitter(config, emitter)
        }
        ServiceRole::Receiver => {
            let receiver: Arc<dyn Receiver> = Arc::new(SimulatedReceiver::new(room));
            AppState::receiver(config, receiver)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("echorange=info".parse()?)
                .add_directive("echorange_core=info".parse()?)
                .add_directive("echorange_server=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let sonar = match &args.config {
        Some(path) => SonarConfig::load(path)?,
        None => SonarConfig::default(),
    };

    let config = ServiceConfig {
        role: args.role,
        bind_addr: args.bind,
        port: args.port.unwrap_or_else(|| args.role.default_port()),
        max_schedule_ahead_ms: args.max_schedule_ms,
    };

    let state = if args.simulate {
        simulated_state(config, sonar)
    } else {
        sound_card_state(config, sonar)?
    };

    tracing::info!(role = %args.role, simulate = args.simulate, "Service starting");

    if let Err(e) = echorange_server::start_server(state).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
