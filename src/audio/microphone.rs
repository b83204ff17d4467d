// Microphone backend using cpal's default input device
//
// cpal streams are not Send on every platform, so the stream lives on a
// dedicated thread for its whole life. The thread builds the stream, reports
// readiness, then parks until told to stop. After the stream is dropped the
// thread flushes the resampler tail and drops the last frame sender, which
// closes the receiver handed out by start().

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::convert;

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    worker: Option<(std::sync::mpsc::Sender<()>, JoinHandle<()>)>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Result<Self> {
        let host = cpal::default_host();
        if host.default_input_device().is_none() {
            bail!("No default input device found");
        }

        info!(
            "Microphone backend initialized ({}Hz, {} channels)",
            config.target_sample_rate, config.target_channels
        );

        Ok(Self { config, worker: None })
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.worker.is_some() {
            bail!("Already capturing");
        }

        let (frame_tx, frame_rx) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let config = self.config.clone();

        let handle = std::thread::Builder::new()
            .name("field-microphone".to_string())
            .spawn(move || match open_stream(&config, frame_tx.clone()) {
                Ok((stream, state)) => {
                    let _ = ready_tx.send(Ok(()));
                    let _ = stop_rx.recv();
                    drop(stream);
                    flush(&state, &config, &frame_tx);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .context("Failed to spawn microphone thread")?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some((stop_tx, handle));
                info!("Microphone capture started");
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                bail!("Microphone thread exited before starting")
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        let Some((stop_tx, handle)) = self.worker.take() else {
            return Ok(());
        };

        let _ = stop_tx.send(());
        tokio::task::spawn_blocking(move || handle.join())
            .await
            .context("Failed to join microphone thread")?
            .map_err(|_| anyhow!("Microphone thread panicked"))?;

        info!("Microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

/// Conversion state shared by the stream callback and the final flush
struct StreamState {
    conformer: convert::Conformer,
    device_rate: u32,
    frames_seen: u64,
}

impl StreamState {
    fn timestamp_ms(&self) -> u64 {
        self.frames_seen * 1000 / self.device_rate.max(1) as u64
    }
}

fn flush(state: &Mutex<StreamState>, config: &AudioBackendConfig, frames: &mpsc::Sender<AudioFrame>) {
    let Ok(mut state) = state.lock() else {
        return;
    };
    match state.conformer.finish() {
        Ok(samples) if !samples.is_empty() => {
            let frame = AudioFrame {
                samples,
                sample_rate: config.target_sample_rate,
                channels: config.target_channels,
                timestamp_ms: state.timestamp_ms(),
            };
            if frames.blocking_send(frame).is_err() {
                warn!("Capture consumer gone before the final frame");
            }
        }
        Ok(_) => {}
        Err(e) => error!("Failed to flush capture resampler: {:#}", e),
    }
}

fn open_stream(
    config: &AudioBackendConfig,
    frames: mpsc::Sender<AudioFrame>,
) -> Result<(cpal::Stream, Arc<Mutex<StreamState>>)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No default input device found"))?;
    let supported = device
        .default_input_config()
        .context("Failed to query input configuration")?;

    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();

    // One resampler for the life of the stream so block edges stay continuous
    let state = Arc::new(Mutex::new(StreamState {
        conformer: convert::Conformer::new(
            stream_config.sample_rate.0,
            stream_config.channels,
            config.target_sample_rate,
            config.target_channels,
        )?,
        device_rate: stream_config.sample_rate.0,
        frames_seen: 0,
    }));

    let shared = Arc::clone(&state);
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, config, frames, shared)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, config, frames, shared)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, config, frames, shared)?,
        other => bail!("Unsupported input sample format: {:?}", other),
    };

    stream.play().context("Failed to start input stream")?;
    Ok((stream, state))
}

fn build_stream<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    config: &AudioBackendConfig,
    frames: mpsc::Sender<AudioFrame>,
    state: Arc<Mutex<StreamState>>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let device_channels = stream_config.channels.max(1) as usize;
    let target_rate = config.target_sample_rate;
    let target_channels = config.target_channels;

    let stream = device.build_input_stream(
        stream_config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let raw: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
            let Ok(mut state) = state.lock() else {
                return;
            };
            let timestamp_ms = state.timestamp_ms();
            state.frames_seen += (raw.len() / device_channels) as u64;

            let samples = match state.conformer.push(&raw) {
                Ok(samples) => samples,
                Err(e) => {
                    error!("Failed to convert captured audio: {:#}", e);
                    return;
                }
            };
            if samples.is_empty() {
                return;
            }

            let frame = AudioFrame {
                samples,
                sample_rate: target_rate,
                channels: target_channels,
                timestamp_ms,
            };
            if let Err(mpsc::error::TrySendError::Full(_)) = frames.try_send(frame) {
                warn!("Capture consumer is behind, dropping frame at {}ms", timestamp_ms);
            }
        },
        |err| error!("Input stream error: {}", err),
        None,
    )?;

    Ok(stream)
}
