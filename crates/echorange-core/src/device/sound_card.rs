//! Default sound card emitter and receiver
//!
//! Each call opens its own cpal stream, runs it to completion and drops it, so
//! no stream outlives or is shared beyond one `emit_beep` / `record_signal`.
//! Samples cross the audio callback boundary through a lock-free ring buffer,
//! and completion is signalled on a crossbeam channel.

use super::{beep, DeviceError, DeviceFactory, Emitter, Receiver};
use crate::config::SonarConfig;
use crate::processor::SignalProcessor;
use crate::sample::{SampleBuffer, MAX_VOLUME};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::time::Duration;

/// Extra time granted to a stream beyond its nominal duration
const STREAM_GRACE: Duration = Duration::from_secs(1);

/// Fully silent output callbacks after the pulse before the stream may be dropped
const TAIL_CALLBACKS: u32 = 2;

/// Feeds the pulse into output callbacks
///
/// The callback that writes the last samples only queues them; the device
/// has played them once later callbacks start on an empty ring.
struct PlaybackFeed<C> {
    consumer: C,
    silent_callbacks: u32,
}

impl<C: Consumer<Item = f32>> PlaybackFeed<C> {
    fn new(consumer: C) -> Self {
        Self {
            consumer,
            silent_callbacks: 0,
        }
    }

    /// Fill one interleaved buffer; true once the pulse tail has been played
    fn fill(&mut self, data: &mut [f32], channels: usize) -> bool {
        if self.consumer.is_empty() {
            self.silent_callbacks += 1;
        }
        for frame in data.chunks_mut(channels.max(1)) {
            frame.fill(self.consumer.try_pop().unwrap_or(0.0));
        }
        self.silent_callbacks >= TAIL_CALLBACKS
    }
}

fn stream_error(err: impl std::fmt::Display) -> DeviceError {
    DeviceError::Stream(err.to_string())
}

fn output_device() -> Result<Device, DeviceError> {
    cpal::default_host()
        .default_output_device()
        .ok_or(DeviceError::NotFound("output"))
}

fn input_device() -> Result<Device, DeviceError> {
    cpal::default_host()
        .default_input_device()
        .ok_or(DeviceError::NotFound("input"))
}

/// Plays the pulse on the default output device
pub struct CpalEmitter {
    config: SonarConfig,
}

impl CpalEmitter {
    pub fn new(config: SonarConfig) -> Self {
        Self { config }
    }
}

impl Emitter for CpalEmitter {
    fn check(&self) -> Result<(), DeviceError> {
        let device = output_device()?;
        let supported = device.default_output_config().map_err(stream_error)?;
        tracing::debug!(
            device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
            rate = supported.sample_rate().0,
            channels = supported.channels(),
            "output_device_checked"
        );
        Ok(())
    }

    fn emit_beep(&self) -> Result<(), DeviceError> {
        let device = output_device()?;
        let channels = device
            .default_output_config()
            .map_err(stream_error)?
            .channels();
        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Quantized through the PCM contract, as a remote device would receive it
        let signal = beep(&self.config).to_signal();
        let ring = HeapRb::<f32>::new(signal.len().max(1));
        let (mut producer, consumer) = ring.split();
        for s in &signal {
            let _ = producer.try_push(*s as f32 / MAX_VOLUME as f32);
        }
        let mut feed = PlaybackFeed::new(consumer);

        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let num_channels = channels as usize;
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if feed.fill(data, num_channels) {
                        let _ = done_tx.try_send(());
                    }
                },
                move |err| {
                    tracing::error!("Output stream error: {}", err);
                },
                None,
            )
            .map_err(stream_error)?;
        stream.play().map_err(stream_error)?;

        let nominal = Duration::from_secs_f64(self.config.beep_seconds.max(0.0));
        done_rx
            .recv_timeout(nominal + STREAM_GRACE)
            .map_err(|_| DeviceError::Stream("playback did not complete".to_string()))?;

        tracing::debug!(frames = signal.len(), "beep_played");
        Ok(())
    }
}

/// Records from the default input device
pub struct CpalReceiver {
    config: SonarConfig,
}

impl CpalReceiver {
    pub fn new(config: SonarConfig) -> Self {
        Self { config }
    }
}

impl Receiver for CpalReceiver {
    fn check(&self) -> Result<(), DeviceError> {
        let device = input_device()?;
        let supported = device.default_input_config().map_err(stream_error)?;
        tracing::debug!(
            device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
            rate = supported.sample_rate().0,
            channels = supported.channels(),
            "input_device_checked"
        );
        Ok(())
    }

    fn record_signal(&self) -> Result<SampleBuffer, DeviceError> {
        let device = input_device()?;
        let channels = device
            .default_input_config()
            .map_err(stream_error)?
            .channels();
        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let frames = self.config.record_frames();
        let ring = HeapRb::<f32>::new(frames.max(1));
        let (mut producer, mut consumer) = ring.split();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let num_channels = channels as usize;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(num_channels) {
                        if let Some(&sample) = frame.first() {
                            let _ = producer.try_push(sample);
                        }
                    }
                    if producer.is_full() {
                        let _ = done_tx.try_send(());
                    }
                },
                move |err| {
                    tracing::error!("Input stream error: {}", err);
                },
                None,
            )
            .map_err(stream_error)?;
        stream.play().map_err(stream_error)?;

        let nominal = Duration::from_secs_f64(self.config.record_seconds.max(0.0));
        done_rx
            .recv_timeout(nominal + STREAM_GRACE)
            .map_err(|_| DeviceError::Stream("recording did not complete".to_string()))?;
        drop(stream);

        let values: Vec<f64> = consumer
            .pop_iter()
            .map(|s| (s as f64).clamp(-1.0, 1.0))
            .collect();
        tracing::debug!(frames = values.len(), "signal_recorded");
        Ok(SampleBuffer::from_values(&values)?)
    }
}

/// Sound card emitter and receiver sharing one configuration
pub struct CpalFactory {
    config: SonarConfig,
}

impl CpalFactory {
    pub fn new(config: SonarConfig) -> Self {
        Self { config }
    }
}

impl DeviceFactory for CpalFactory {
    fn create_emitter(&self) -> Result<Box<dyn Emitter>, DeviceError> {
        Ok(Box::new(CpalEmitter::new(self.config.clone())))
    }

    fn create_receiver(&self) -> Result<Box<dyn Receiver>, DeviceError> {
        Ok(Box::new(CpalReceiver::new(self.config.clone())))
    }

    fn create_processor(&self) -> SignalProcessor {
        SignalProcessor::new(self.config.clone())
    }
}
