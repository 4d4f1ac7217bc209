//! Measurement control loop
//!
//! Each step measures, processes the recording, keeps it in the history and
//! publishes the result. Processing failures are results, not loop errors;
//! only synchronization and sink failures interrupt the loop.

use crate::config::AppConfig;
use crate::history::History;
use crate::sink::{ResultSink, SinkError};
use echorange_core::{DeviceFactory, Measurer, RangingResult, SignalProcessor, SyncError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Giving up after {count} failed measurements in a row: {last}")]
    TooManyFailures {
        count: u32,
        #[source]
        last: SyncError,
    },
}

/// What a finished loop did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Iterations attempted, failed ones included
    pub iterations: usize,
    pub failures: usize,
}

pub struct Controller<S: ResultSink> {
    measurer: Measurer,
    processor: SignalProcessor,
    history: History,
    sink: S,
    stop: Arc<AtomicBool>,
    max_consecutive_failures: u32,
}

impl<S: ResultSink> Controller<S> {
    pub fn new(factory: &dyn DeviceFactory, sink: S, config: &AppConfig) -> Result<Self, ControlError> {
        Ok(Self {
            measurer: Measurer::new(factory, config.sonar.barrier_timeout())?,
            processor: factory.create_processor(),
            history: History::new(config.history_capacity),
            sink,
            stop: Arc::new(AtomicBool::new(false)),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
        })
    }

    /// Setting the flag ends `run` at the next iteration boundary
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn check(&self) -> Result<(), ControlError> {
        Ok(self.measurer.check()?)
    }

    /// Measure once and publish the processed result
    pub fn step(&mut self) -> Result<RangingResult, ControlError> {
        let sample = self.measurer.single_measurement()?;
        let result = self.processor.process(&sample);
        self.history.store(sample);
        self.sink.publish(&result)?;
        Ok(result)
    }

    /// Check the devices once, then step until `limit` iterations or a stop request
    pub fn run(&mut self, limit: Option<usize>) -> Result<RunSummary, ControlError> {
        self.check()?;

        let mut summary = RunSummary::default();
        let mut consecutive = 0u32;

        while !self.stop.load(Ordering::SeqCst) && limit.is_none_or(|l| summary.iterations < l) {
            summary.iterations += 1;
            match self.step() {
                Ok(result) => {
                    consecutive = 0;
                    tracing::debug!(
                        iteration = summary.iterations,
                        ok = result.is_ok(),
                        peaks = result.peaks().len(),
                        "step_completed"
                    );
                }
                Err(ControlError::Sync(err)) => {
                    consecutive += 1;
                    summary.failures += 1;
                    tracing::warn!(
                        iteration = summary.iterations,
                        consecutive,
                        error = %err,
                        "measurement_failed"
                    );
                    if consecutive >= self.max_consecutive_failures {
                        return Err(ControlError::TooManyFailures {
                            count: consecutive,
                            last: err,
                        });
                    }
                }
                Err(other) => return Err(other),
            }
        }

        tracing::info!(
            iterations = summary.iterations,
            failures = summary.failures,
            "loop_finished"
        );
        Ok(summary)
    }
}
