//! # Audio Capture Module
//!
//! Audio sources deliver fixed-size frames to the analysis thread.
//!
//! ## Hand-off rules
//! - Frames travel over a single-slot channel filled with `try_send`, so a
//!   busy consumer makes the source drop frames instead of blocking
//! - Source failures are reported once on the error channel and end the
//!   session
//! - Sources never block, log or allocate without bound inside a device
//!   callback

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{SendTimeoutError, Sender, TrySendError};
use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TunerConfig;
use crate::error::{Result, TunerError};

/// One block of mono samples at the configured sample rate.
pub type AudioFrame = Vec<f32>;

/// A producer of audio frames.
///
/// `open` starts delivery and returns immediately; `close` stops it and must
/// not return while the source can still send frames.
pub trait AudioSource {
    fn open(
        &mut self,
        config: &TunerConfig,
        frames: Sender<AudioFrame>,
        errors: Sender<TunerError>,
    ) -> Result<()>;

    fn close(&mut self);
}

/// Splits a continuous sample stream into exact `block_size` frames.
#[derive(Debug)]
struct FrameAssembler {
    block_size: usize,
    buffer: Vec<f32>,
}

impl FrameAssembler {
    fn new(block_size: usize) -> Self {
        Self {
            block_size,
            buffer: Vec::with_capacity(block_size * 2),
        }
    }

    /// Appends samples and hands every completed frame to `emit`.
    fn push(&mut self, samples: impl IntoIterator<Item = f32>, mut emit: impl FnMut(AudioFrame)) {
        for sample in samples {
            self.buffer.push(sample);
            if self.buffer.len() == self.block_size {
                let frame = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.block_size));
                emit(frame);
            }
        }
    }
}

/// Captures the default input device through CPAL.
///
/// The stream is f32 at the configured sample rate; multi-channel input is
/// averaged down to mono.
#[derive(Default)]
pub struct CpalInput {
    stream: Option<cpal::Stream>,
}

impl CpalInput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSource for CpalInput {
    fn open(
        &mut self,
        config: &TunerConfig,
        frames: Sender<AudioFrame>,
        errors: Sender<TunerError>,
    ) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| TunerError::AudioSource("No input device available".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".into());
        info!(device = %device_name, "Using audio input device");

        let configs = device
            .supported_input_configs()
            .map_err(source_err)?
            .collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, config.sample_rate).ok_or_else(|| {
            TunerError::AudioSource(format!(
                "No f32 input format supporting {} Hz",
                config.sample_rate
            ))
        })?;

        let channels = supported_config.channels() as usize;
        let stream_config: cpal::StreamConfig = supported_config
            .with_sample_rate(cpal::SampleRate(config.sample_rate))
            .into();
        info!(
            sample_rate = config.sample_rate,
            channels,
            block_size = config.block_size,
            "Opening input stream"
        );

        let mut assembler = FrameAssembler::new(config.block_size);
        let err_fn = move |err: cpal::StreamError| {
            let _ = errors.try_send(TunerError::AudioSource(err.to_string()));
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = data
                        .chunks_exact(channels)
                        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32);
                    // A full slot means the analysis thread is still busy.
                    assembler.push(mono, |frame| {
                        let _ = frames.try_send(frame);
                    });
                },
                err_fn,
                None,
            )
            .map_err(source_err)?;

        stream.play().map_err(source_err)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Error pausing input stream: {}", e);
            }
            drop(stream);
            debug!("Input stream closed");
        }
    }
}

fn source_err(e: impl std::fmt::Display) -> TunerError {
    TunerError::AudioSource(e.to_string())
}

/// Finds an f32 configuration that covers the target sample rate, preferring
/// the fewest channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| {
            c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate().0 <= target_rate
                && c.max_sample_rate().0 >= target_rate
        })
        .min_by_key(|c| c.channels())
}

/// Synthetic sine source, paced like a real device.
///
/// Useful for running the tuner without a microphone.
#[derive(Debug)]
pub struct SignalGenerator {
    frequency: f32,
    amplitude: f32,
    realtime: bool,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SignalGenerator {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
            realtime: true,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Deliver frames as fast as the consumer takes them.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }
}

impl AudioSource for SignalGenerator {
    fn open(
        &mut self,
        config: &TunerConfig,
        frames: Sender<AudioFrame>,
        _errors: Sender<TunerError>,
    ) -> Result<()> {
        self.close();

        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        let step = 2.0 * PI * self.frequency / config.sample_rate as f32;
        let amplitude = self.amplitude;
        let block_size = config.block_size;
        let period = Duration::from_secs_f32(config.frame_period());
        let realtime = self.realtime;

        let worker = thread::Builder::new()
            .name("tuneme-signal".into())
            .spawn(move || {
                let mut phase = 0.0_f32;
                while running.load(Ordering::Acquire) {
                    let frame: AudioFrame = (0..block_size)
                        .map(|_| {
                            let sample = amplitude * phase.sin();
                            phase = (phase + step) % (2.0 * PI);
                            sample
                        })
                        .collect();
                    let disconnected = if realtime {
                        let sent = frames.try_send(frame);
                        thread::sleep(period);
                        matches!(sent, Err(TrySendError::Disconnected(_)))
                    } else {
                        matches!(
                            frames.send_timeout(frame, period),
                            Err(SendTimeoutError::Disconnected(_))
                        )
                    };
                    if disconnected {
                        break;
                    }
                }
            })
            .map_err(|e| TunerError::AudioSource(e.to_string()))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Signal generator thread panicked");
            }
        }
    }
}

impl Drop for SignalGenerator {
    fn drop(&mut self) {
        self.close();
    }
}
