use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, EncoderFactory,
    EncoderSettings, LevelMeter, SampleEncoder, METER_FLOOR_DB,
};
use crate::error::CaptureError;
use crate::persistence::SettingsStore;
use crate::platform::AudioRoute;
use crate::quality::{resolve, QualityPolicy, QualityTier};
use crate::store::LibraryStore;

/// Capture timing
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Cadence of level/elapsed updates
    pub metering_interval: Duration,
    /// Length of each frame delivered by the backend
    pub frame_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            metering_interval: Duration::from_millis(100),
            frame_duration_ms: 100,
        }
    }
}

/// Live recording state, published on every metering tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingStatus {
    pub is_recording: bool,
    pub target: Option<PathBuf>,
    /// Peak level of the latest captured frame, floored at -160 dB
    pub level_db: f32,
    pub elapsed: Duration,
}

impl RecordingStatus {
    fn idle(elapsed: Duration) -> Self {
        Self {
            is_recording: false,
            target: None,
            level_db: METER_FLOOR_DB,
            elapsed,
        }
    }
}

/// A finished, closed recording in the RAW partition
#[derive(Debug, Clone, Serialize)]
pub struct RecordedTake {
    pub path: PathBuf,
    pub tier: QualityTier,
    pub started_at: DateTime<Utc>,
    /// Audio actually written
    pub duration: Duration,
    pub frames: u64,
    /// Capture stopped on a write failure; the file holds what came before it
    pub ended_early: bool,
}

/// What the writer task got onto disk
struct WriterOutcome {
    frames: u64,
    failure: Option<anyhow::Error>,
}

struct ActiveRecording {
    target: PathBuf,
    policy: QualityPolicy,
    started_at: DateTime<Utc>,
    started: Instant,
    backend: Box<dyn AudioBackend>,
    writer_task: JoinHandle<Result<WriterOutcome>>,
    meter_task: JoinHandle<()>,
}

/// Records from a capture backend into the RAW partition
///
/// Idle until `start_recording` succeeds, Recording until `stop_recording`.
/// The output format follows the quality tier stored at the moment recording
/// starts; a tier change during a recording only affects the next one.
pub struct CaptureEngine {
    store: LibraryStore,
    settings: Arc<dyn SettingsStore>,
    route: Arc<dyn AudioRoute>,
    encoders: Arc<dyn EncoderFactory>,
    source: AudioSource,
    config: CaptureConfig,

    /// Whether recording is currently active
    is_recording: Arc<AtomicBool>,

    /// Latest frame level, written by the writer and read by the meter tick
    meter: Arc<LevelMeter>,

    active: Mutex<Option<ActiveRecording>>,
    status_tx: Arc<watch::Sender<RecordingStatus>>,
}

impl CaptureEngine {
    pub fn new(
        store: LibraryStore,
        settings: Arc<dyn SettingsStore>,
        route: Arc<dyn AudioRoute>,
        encoders: Arc<dyn EncoderFactory>,
        source: AudioSource,
        config: CaptureConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(RecordingStatus::idle(Duration::ZERO));
        Self {
            store,
            settings,
            route,
            encoders,
            source,
            config,
            is_recording: Arc::new(AtomicBool::new(false)),
            meter: Arc::new(LevelMeter::new()),
            active: Mutex::new(None),
            status_tx: Arc::new(status_tx),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> RecordingStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecordingStatus> {
        self.status_tx.subscribe()
    }

    /// Begin recording to a new RAW file and return its path
    ///
    /// Any failure leaves the engine idle with no file left behind.
    pub async fn start_recording(&self) -> Result<PathBuf, CaptureError> {
        let mut active = self.active.lock().await;
        if active.is_some() && self.is_recording() {
            warn!("Recording already started");
            return Err(CaptureError::AlreadyRecording);
        }
        if let Some(stale) = active.take() {
            // The writer ended the previous take on its own and nobody stopped it
            match self.close(stale).await {
                Ok(take) => info!("Closed interrupted recording: {}", take.path.display()),
                Err(e) => warn!("Interrupted recording dropped: {:#}", e),
            }
        }

        self.route.request_capture_route().map_err(|e| {
            warn!("Recording not started: {}", e);
            CaptureError::RouteDenied(e.to_string())
        })?;

        let recording = self.begin().await.map_err(|e| {
            error!("Recording not started: {:#}", e);
            CaptureError::Configuration(format!("{:#}", e))
        })?;

        info!(
            "Recording started: {} ({}, {}Hz, {} channels)",
            recording.target.display(),
            recording.policy.tier,
            recording.policy.sample_rate,
            recording.policy.channels
        );

        let target = recording.target.clone();
        *active = Some(recording);
        Ok(target)
    }

    async fn begin(&self) -> Result<ActiveRecording> {
        let tier = self.settings.load_quality_tier().await?;
        let policy = resolve(tier);

        self.store.setup()?;
        let started_at = Utc::now();
        let target = self.store.recording_path(started_at, &policy);

        let encoder = match self.encoders.create(&target, &EncoderSettings::from_policy(&policy)) {
            Ok(encoder) => encoder,
            Err(e) => {
                // The factory may have created the file before failing
                discard(&target);
                return Err(e.context("Failed to configure encoder"));
            }
        };

        let backend_config = AudioBackendConfig {
            target_sample_rate: policy.sample_rate,
            target_channels: policy.channels,
            buffer_duration_ms: self.config.frame_duration_ms,
        };

        let (backend, audio_rx) = match self.start_backend(backend_config).await {
            Ok(started) => started,
            Err(e) => {
                drop(encoder);
                discard(&target);
                return Err(e);
            }
        };

        self.meter.reset();
        self.is_recording.store(true, Ordering::SeqCst);
        let started = Instant::now();

        self.status_tx.send_replace(RecordingStatus {
            is_recording: true,
            target: Some(target.clone()),
            level_db: METER_FLOOR_DB,
            elapsed: Duration::ZERO,
        });

        let writer_task = spawn_writer(
            audio_rx,
            encoder,
            policy.channels,
            WriterShared {
                is_recording: Arc::clone(&self.is_recording),
                meter: Arc::clone(&self.meter),
                status_tx: Arc::clone(&self.status_tx),
                started,
            },
        );
        let meter_task = self.spawn_meter(target.clone(), started);

        Ok(ActiveRecording {
            target,
            policy,
            started_at,
            started,
            backend,
            writer_task,
            meter_task,
        })
    }

    async fn start_backend(
        &self,
        config: AudioBackendConfig,
    ) -> Result<(Box<dyn AudioBackend>, mpsc::Receiver<AudioFrame>)> {
        let mut backend =
            AudioBackendFactory::create(self.source.clone(), config).context("Failed to create audio backend")?;
        let audio_rx = backend.start().await.context("Failed to start audio capture")?;
        debug!("Capture backend started: {}", backend.name());
        Ok((backend, audio_rx))
    }

    fn spawn_meter(&self, target: PathBuf, started: Instant) -> JoinHandle<()> {
        let is_recording = Arc::clone(&self.is_recording);
        let meter = Arc::clone(&self.meter);
        let status_tx = Arc::clone(&self.status_tx);
        let interval = self.config.metering_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !is_recording.load(Ordering::SeqCst) {
                    break;
                }
                // Checked again under the channel lock so a writer that just
                // went idle is never overwritten with a live level
                status_tx.send_if_modified(|status| {
                    if !is_recording.load(Ordering::SeqCst) {
                        return false;
                    }
                    *status = RecordingStatus {
                        is_recording: true,
                        target: Some(target.clone()),
                        level_db: meter.level_db(),
                        elapsed: started.elapsed(),
                    };
                    true
                });
            }
        })
    }

    /// Stop capture, close the file and return the take
    ///
    /// The file is complete and closed when this returns. Returns `None` when
    /// nothing was recording. A take cut short by a write failure is still
    /// returned, with `ended_early` set.
    pub async fn stop_recording(&self) -> Result<Option<RecordedTake>> {
        let Some(recording) = self.active.lock().await.take() else {
            warn!("Recording not active");
            return Ok(None);
        };

        info!("Stopping recording: {}", recording.target.display());
        self.close(recording).await.map(Some)
    }

    async fn close(&self, recording: ActiveRecording) -> Result<RecordedTake> {
        // Mark as stopped first so a pending meter tick publishes nothing
        self.is_recording.store(false, Ordering::SeqCst);

        let ActiveRecording {
            target,
            policy,
            started_at,
            started,
            mut backend,
            writer_task,
            meter_task,
        } = recording;

        meter_task.abort();
        let _ = meter_task.await;

        if let Err(e) = backend.stop().await {
            error!("Failed to stop audio backend: {}", e);
        }

        let written = writer_task.await.context("Capture writer task panicked");
        self.meter.reset();
        self.status_tx.send_replace(RecordingStatus::idle(started.elapsed()));

        let outcome = match written.and_then(|r| r) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Recording failed: {:#}", e);
                discard(&target);
                return Err(e);
            }
        };

        let WriterOutcome { frames, failure } = outcome;
        let ended_early = match failure {
            Some(e) if frames == 0 => {
                discard(&target);
                return Err(e.context("Recording failed before any audio was written"));
            }
            Some(e) => {
                warn!("Recording ended early, keeping {} frames: {:#}", frames, e);
                true
            }
            None => false,
        };

        let duration = Duration::from_secs_f64(frames as f64 / policy.sample_rate.max(1) as f64);
        info!(
            "Recording saved: {} ({:.1}s, {} frames)",
            target.display(),
            duration.as_secs_f64(),
            frames
        );

        Ok(RecordedTake {
            path: target,
            tier: policy.tier,
            started_at,
            duration,
            frames,
            ended_early,
        })
    }
}

/// Engine state the writer updates when it has to stop on its own
struct WriterShared {
    is_recording: Arc<AtomicBool>,
    meter: Arc<LevelMeter>,
    status_tx: Arc<watch::Sender<RecordingStatus>>,
    started: Instant,
}

fn spawn_writer(
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    mut encoder: Box<dyn SampleEncoder>,
    channels: u16,
    shared: WriterShared,
) -> JoinHandle<Result<WriterOutcome>> {
    tokio::task::spawn_blocking(move || {
        let mut frames: u64 = 0;
        let mut failure = None;

        // Drain until the backend closes the channel so nothing captured is lost
        while let Some(frame) = audio_rx.blocking_recv() {
            shared.meter.record(&frame.samples);
            if let Err(e) = encoder.write_samples(&frame.samples) {
                failure = Some(e);
                break;
            }
            frames += (frame.samples.len() / channels.max(1) as usize) as u64;
        }

        if let Some(e) = &failure {
            error!("Capture write failed after {} frames: {:#}", frames, e);
            drop(audio_rx);
            shared.is_recording.store(false, Ordering::SeqCst);
            shared.meter.reset();
            shared
                .status_tx
                .send_replace(RecordingStatus::idle(shared.started.elapsed()));
        }

        // Close the file either way so frames already written stay playable
        encoder.finish()?;
        Ok(WriterOutcome { frames, failure })
    })
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed incomplete recording: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove incomplete recording {}: {}", path.display(), e),
    }
}
