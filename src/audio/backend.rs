use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::convert;
use super::file::AudioFile;
use crate::quality::{POLICY_CHANNELS, POLICY_SAMPLE_RATE};

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate (will resample if needed)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: POLICY_SAMPLE_RATE,
            target_channels: POLICY_CHANNELS,
            buffer_duration_ms: 100, // 100ms buffers
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (`device` feature)
/// - File: replays an audio file in real time (headless machines, tests)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. The channel
    /// closes once the backend is stopped.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend based on platform and configuration
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "device")]
                {
                    let backend = super::microphone::MicrophoneBackend::new(config)?;
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "device"))]
                {
                    let _ = config;
                    anyhow::bail!("Microphone capture requires the `device` feature")
                }
            }

            AudioSource::File(path) => Ok(Box::new(FileBackend::new(path, config))),
        }
    }
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default input device
    Microphone,
    /// File input, replayed at real-time pace
    File(PathBuf),
}

/// Backend that feeds frames from an audio file
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            anyhow::bail!("Already capturing");
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("File decode task panicked")??;

        let rate = self.config.target_sample_rate;
        let channels = self.config.target_channels;
        let samples = convert::conform(&audio.samples, audio.sample_rate, audio.channels, rate, channels)?;

        let buffer_ms = self.config.buffer_duration_ms.max(1);
        let samples_per_frame =
            ((rate as u64 * buffer_ms / 1000) as usize * channels as usize).max(channels as usize);

        let (tx, rx) = mpsc::channel(100);

        info!(
            "File capture started: {} ({}Hz, {} channels, {}ms frames)",
            self.path.display(),
            rate,
            channels,
            buffer_ms
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(buffer_ms));
            for (index, chunk) in samples.chunks(samples_per_frame).enumerate() {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: rate,
                    channels,
                    timestamp_ms: index as u64 * buffer_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            debug!("File capture source exhausted");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            // Wait for the task so its sender is dropped before returning
            let _ = task.await;
            info!("File capture stopped: {}", self.path.display());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "File replay"
    }
}
