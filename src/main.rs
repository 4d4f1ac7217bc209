//! Echorange - measure distances to reflecting surfaces
//!
//! `echorange simulate` runs against a simulated room, `echorange remote`
//! against running emitter and receiver services, and `echorange local`
//! (with the `audio-device` feature) against the default sound card.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use echorange::device::simulated::{SimulatedFactory, SimulatedRoom};
use echorange::device::DeviceFactory;
use echorange::remote::HttpFactory;
use echorange::{AppConfig, Controller, JsonLinesSink, LogSink, ResultSink, TextSink};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

#[derive(Parser)]
#[command(name = "echorange")]
#[command(author, version, about = "Acoustic echo-ranging", long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Configuration file (default: <data_dir>/echorange/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Stop after this many measurements
    #[arg(short = 'n', long, global = true)]
    limit: Option<usize>,

    /// Result output format
    #[arg(long, value_enum, default_value_t = Output::Text, global = true)]
    output: Output,
}

#[derive(Subcommand)]
enum Mode {
    /// Measure a simulated room
    Simulate {
        /// Reflector distances in meters
        #[arg(long = "reflection", default_values_t = [2.0])]
        reflections: Vec<f64>,

        /// Relative strength of each reflection
        #[arg(long, default_value_t = 0.15)]
        gain: f64,
    },

    /// Measure through emitter and receiver services
    Remote {
        /// Emitter service URL
        #[arg(long)]
        emitter_url: Option<String>,

        /// Receiver service URL
        #[arg(long)]
        receiver_url: Option<String>,

        /// Shut both services down when done
        #[arg(long)]
        stop_services: bool,
    },

    /// Measure with the default sound card
    Local,

    /// Write the effective configuration to the config file
    SaveConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    Text,
    Json,
    Log,
}

fn sink(output: Output) -> Box<dyn ResultSink> {
    match output {
        Output::Text => Box::new(TextSink::new(std::io::stdout())),
        Output::Json => Box::new(JsonLinesSink::new(std::io::stdout())),
        Output::Log => Box::new(LogSink),
    }
}

fn local_factory(config: &AppConfig) -> Result<Box<dyn DeviceFactory>> {
    #[cfg(feature = "audio-device")]
    {
        Ok(Box::new(echorange::device::sound_card::CpalFactory::new(
            config.sonar.clone(),
        )))
    }

    #[cfg(not(feature = "audio-device"))]
    {
        let _ = config;
        anyhow::bail!("built without the audio-device feature; use `simulate` or `remote`")
    }
}

fn measure(factory: &dyn DeviceFactory, config: &AppConfig, cli: &Cli) -> Result<()> {
    let mut controller = Controller::new(factory, sink(cli.output), config)?;

    let stop = controller.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .ok();

    let summary = controller.run(cli.limit)?;
    tracing::info!(
        iterations = summary.iterations,
        failures = summary.failures,
        "Measurement finished"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("echorange=info".parse()?)
                .add_directive("echorange_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::path);
    let mut config = AppConfig::load_from(&config_path);

    match &cli.mode {
        Mode::Simulate { reflections, gain } => {
            let room = reflections
                .iter()
                .fold(SimulatedRoom::new(config.sonar.clone()), |room, &distance| {
                    room.with_reflection(distance, *gain)
                });
            measure(&SimulatedFactory::new(room), &config, &cli)
        }
        Mode::Remote {
            emitter_url,
            receiver_url,
            stop_services,
        } => {
            if let Some(url) = emitter_url {
                config.remote.emitter_url = url.clone();
            }
            if let Some(url) = receiver_url {
                config.remote.receiver_url = url.clone();
            }
            let factory = HttpFactory::new(&config.remote, config.sonar.clone())?;
            let outcome = measure(&factory, &config, &cli);
            if *stop_services {
                if let Err(e) = factory.stop_services() {
                    tracing::warn!(error = %e, "Failed to stop services");
                }
            }
            outcome
        }
        Mode::Local => {
            let factory = local_factory(&config)?;
            measure(factory.as_ref(), &config, &cli)
        }
        Mode::SaveConfig => {
            config.save(&config_path)?;
            println!("{}", config_path.display());
            Ok(())
        }
    }
}
