//! Destinations for ranging results

use echorange_core::RangingResult;
use std::io::{self, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write result: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Receives every processed result
pub trait ResultSink {
    fn publish(&mut self, result: &RangingResult) -> Result<(), SinkError>;
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn publish(&mut self, result: &RangingResult) -> Result<(), SinkError> {
        (**self).publish(result)
    }
}

/// Emits each result as a structured tracing event
#[derive(Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn publish(&mut self, result: &RangingResult) -> Result<(), SinkError> {
        let distances: Vec<f64> = result.peaks().iter().map(|p| p.distance).collect();
        match result.error() {
            None => tracing::info!(
                ?distances,
                noise = result.noise(),
                snr = result.snr(),
                "ranging_result"
            ),
            Some(err) => tracing::warn!(
                kind = %err.kind(),
                error = %err,
                metadata = ?result.metadata(),
                "ranging_failed"
            ),
        }
        Ok(())
    }
}

/// Writes one JSON record per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for JsonLinesSink<W> {
    fn publish(&mut self, result: &RangingResult) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &result.to_record())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes the human-readable report
pub struct TextSink<W: Write> {
    writer: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for TextSink<W> {
    fn publish(&mut self, result: &RangingResult) -> Result<(), SinkError> {
        writeln!(self.writer, "{}", result)?;
        self.writer.flush()?;
        Ok(())
    }
}
