//! Echorange - acoustic echo-ranging
//!
//! This library adds the measurement control loop, result sinks and
//! persistent configuration on top of `echorange-core`. The emitter and
//! receiver services live in `echorange-server`.

pub mod config;
pub mod controller;
pub mod history;
pub mod sink;

pub use echorange_core::{analysis, device, processor, remote, result, sample, sync, timestamp};

pub use config::AppConfig;
pub use controller::{ControlError, Controller, RunSummary};
pub use history::History;
pub use sink::{JsonLinesSink, LogSink, ResultSink, SinkError, TextSink};

pub use echorange_core::{RangingResult, SampleBuffer, SignalProcessor, SonarConfig, VERSION};
