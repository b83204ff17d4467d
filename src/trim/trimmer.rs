use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audio::{
    convert, AudioClip, AudioFile, EncoderFactory, EncoderSettings, PcmAudio, Playback, PlaybackDevice,
    PlaybackMode,
};
use crate::error::{PlaybackError, TrimError};
use crate::library::{AudioLibraryManager, SoundCategory, SoundOption};
use crate::platform::AudioRoute;
use crate::quality::{resolve, QualityPolicy, QualityTier};
use crate::store::{LibraryStore, Partition};

/// Cut `[start, end)` of `source` into the library as `name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimRequest {
    pub source: PathBuf,
    pub start: Duration,
    pub end: Duration,
    pub name: String,
    pub category: SoundCategory,
}

impl TrimRequest {
    pub fn new(
        source: impl Into<PathBuf>,
        start: Duration,
        end: Duration,
        name: impl Into<String>,
        category: SoundCategory,
    ) -> Self {
        Self {
            source: source.into(),
            start,
            end,
            name: name.into(),
            category,
        }
    }

    /// Name offered when the user has not typed one
    pub fn default_name(now: DateTime<Utc>) -> String {
        format!("FIELD_{}", now.timestamp())
    }
}

/// Duration and layout of a trim source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A finished export, already registered with the library
#[derive(Debug, Clone, Serialize)]
pub struct TrimOutcome {
    pub option: SoundOption,
    pub path: PathBuf,
    pub tier: QualityTier,
    pub duration: Duration,
}

struct Preview {
    source: PathBuf,
    handle: Box<dyn Playback>,
}

/// Trims recordings or imported files into the AMBIENT/CHIMES partitions
pub struct Trimmer {
    library: Arc<AudioLibraryManager>,
    encoders: Arc<dyn EncoderFactory>,
    device: Arc<dyn PlaybackDevice>,
    route: Arc<dyn AudioRoute>,
    preview: Mutex<Option<Preview>>,
}

impl Trimmer {
    pub fn new(
        library: Arc<AudioLibraryManager>,
        encoders: Arc<dyn EncoderFactory>,
        device: Arc<dyn PlaybackDevice>,
        route: Arc<dyn AudioRoute>,
    ) -> Self {
        Self {
            library,
            encoders,
            device,
            route,
            preview: Mutex::new(None),
        }
    }

    /// Decode the source far enough to report its duration
    ///
    /// A capture that was just stopped is already closed, so this succeeds
    /// immediately after `stop_recording` returns.
    pub async fn probe(&self, source: impl AsRef<Path>) -> Result<SourceInfo, TrimError> {
        let audio = decode(source.as_ref()).await?;
        Ok(SourceInfo {
            duration: audio.duration(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
        })
    }

    /// Export the requested range under the current tier and register it
    pub async fn trim(&self, request: TrimRequest) -> Result<TrimOutcome, TrimError> {
        self.stop_preview().await;

        let name = validate_name(&request.name)?.to_string();

        let tier = self
            .library
            .quality_tier()
            .await
            .map_err(|e| TrimError::Export(format!("Failed to read quality tier: {:#}", e)))?;
        let policy = resolve(tier);

        let audio = if policy.encoder_format.is_lossless() {
            decode_native(&request.source).await?
        } else {
            ExportSource::Pcm16(decode(&request.source).await?)
        };
        let duration = audio.duration();
        if request.start >= request.end || request.end > duration {
            warn!(
                "Trim rejected: {:?}..{:?} of {:?} ({})",
                request.start,
                request.end,
                duration,
                request.source.display()
            );
            return Err(TrimError::InvalidRange {
                start: request.start,
                end: request.end,
                duration,
            });
        }

        let partition = Partition::for_category(request.category);
        let destination = self.library.store().destination(partition, &name, &policy);

        info!(
            "Trimming {} [{:.2}s, {:.2}s) -> {} ({})",
            request.source.display(),
            request.start.as_secs_f64(),
            request.end.as_secs_f64(),
            destination.display(),
            tier
        );

        let encoders = Arc::clone(&self.encoders);
        let export_destination = destination.clone();
        let (start, end) = (request.start, request.end);
        let (frames, output_rate) = tokio::task::spawn_blocking(move || {
            export(&*encoders, &audio, start, end, &policy, &export_destination)
        })
        .await
        .map_err(|e| TrimError::Export(format!("Export task failed: {}", e)))?
        .map_err(|e| TrimError::Export(format!("{:#}", e)))?;

        let option = self
            .library
            .add_custom_sound(&name, &destination, request.category)
            .await
            .map_err(|e| TrimError::Export(format!("Failed to register {}: {:#}", name, e)))?;

        let output_duration = Duration::from_secs_f64(frames as f64 / output_rate.max(1) as f64);

        Ok(TrimOutcome {
            option,
            path: destination,
            tier,
            duration: output_duration,
        })
    }

    /// Play `[start, end)` of the source once, replacing any running preview
    pub async fn start_preview(
        &self,
        source: impl AsRef<Path>,
        start: Duration,
        end: Duration,
    ) -> Result<(), PlaybackError> {
        let source = source.as_ref().to_path_buf();
        let mut preview = self.preview.lock().await;
        if let Some(mut previous) = preview.take() {
            previous.handle.stop();
        }

        self.route
            .request_playback_route()
            .map_err(|e| PlaybackError::RouteDenied(e.to_string()))?;

        let audio = decode(&source).await.map_err(|e| PlaybackError::SourceUnavailable {
            path: source.clone(),
            reason: e.to_string(),
        })?;

        let clip = AudioClip {
            name: source.display().to_string(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            samples: Arc::new(audio.frames_between(start, end).to_vec()),
        };

        let handle = self
            .device
            .play(&clip, PlaybackMode::Once)
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        debug!("Preview started: {} ({:?}..{:?})", source.display(), start, end);
        *preview = Some(Preview { source, handle });
        Ok(())
    }

    pub async fn stop_preview(&self) {
        if let Some(mut preview) = self.preview.lock().await.take() {
            preview.handle.stop();
            debug!("Preview stopped: {}", preview.source.display());
        }
    }

    pub async fn is_previewing(&self) -> bool {
        let preview = self.preview.lock().await;
        preview.as_ref().map(|p| p.handle.is_playing()).unwrap_or(false)
    }
}

async fn decode(source: &Path) -> Result<AudioFile, TrimError> {
    let path = source.to_path_buf();
    tokio::task::spawn_blocking(move || AudioFile::open(path))
        .await
        .map_err(|e| TrimError::SourceUnavailable(format!("Decode task failed: {}", e)))?
        .map_err(|e| TrimError::SourceUnavailable(format!("{:#}", e)))
}

async fn decode_native(source: &Path) -> Result<ExportSource, TrimError> {
    let path = source.to_path_buf();
    tokio::task::spawn_blocking(move || PcmAudio::open(path))
        .await
        .map_err(|e| TrimError::SourceUnavailable(format!("Decode task failed: {}", e)))?
        .map(ExportSource::Native)
        .map_err(|e| TrimError::SourceUnavailable(format!("{:#}", e)))
}

/// Decoded trim source: native precision for lossless passthrough, 16-bit
/// for re-encoding
enum ExportSource {
    Native(PcmAudio),
    Pcm16(AudioFile),
}

impl ExportSource {
    fn duration(&self) -> Duration {
        match self {
            ExportSource::Native(audio) => audio.duration(),
            ExportSource::Pcm16(audio) => audio.duration(),
        }
    }
}

/// The name as stored, without surrounding whitespace
fn validate_name(name: &str) -> Result<&str, TrimError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.starts_with('.') || trimmed.contains(['/', '\\']) {
        return Err(TrimError::Export(format!("Invalid sound name: {:?}", name)));
    }
    Ok(trimmed)
}

/// Encode the range to a hidden partial file, then move it into place
///
/// Returns the frames written and the output sample rate.
fn export(
    encoders: &dyn EncoderFactory,
    audio: &ExportSource,
    start: Duration,
    end: Duration,
    policy: &QualityPolicy,
    destination: &Path,
) -> Result<(u64, u32)> {
    if let Some(dir) = destination.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }

    let partial = LibraryStore::partial_path(destination);
    let result = write_partial(encoders, audio, start, end, policy, &partial)
        .and_then(|written| LibraryStore::commit(&partial, destination).map(|_| written));

    if result.is_err() && partial.exists() {
        if let Err(e) = std::fs::remove_file(&partial) {
            warn!("Failed to remove partial export {}: {}", partial.display(), e);
        }
    }

    result
}

fn write_partial(
    encoders: &dyn EncoderFactory,
    audio: &ExportSource,
    start: Duration,
    end: Duration,
    policy: &QualityPolicy,
    partial: &Path,
) -> Result<(u64, u32)> {
    match audio {
        ExportSource::Native(audio) => {
            // Sample-exact copy in the source's own layout and precision
            let range = audio.frames_between(start, end);
            let settings = EncoderSettings::from_policy(policy)
                .with_layout(audio.sample_rate, audio.channels)
                .with_pcm_format(range.format());

            let mut encoder = encoders.create(partial, &settings)?;
            encoder.write_pcm(&range)?;
            encoder.finish()?;

            let frames = (range.len() / settings.channels.max(1) as usize) as u64;
            Ok((frames, settings.sample_rate))
        }
        ExportSource::Pcm16(audio) => {
            let range = audio.frames_between(start, end);
            let samples =
                convert::conform(range, audio.sample_rate, audio.channels, policy.sample_rate, policy.channels)?;
            let settings = EncoderSettings::from_policy(policy);

            let mut encoder = encoders.create(partial, &settings)?;
            encoder.write_samples(&samples)?;
            encoder.finish()?;

            let frames = (samples.len() / settings.channels.max(1) as usize) as u64;
            Ok((frames, settings.sample_rate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name() -> anyhow::Result<()> {
        let now = DateTime::from_timestamp(1_700_000_000, 0).context("timestamp")?;
        assert_eq!(TrimRequest::default_name(now), "FIELD_1700000000");
        Ok(())
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("Rain").ok(), Some("Rain"));
        assert_eq!(validate_name("  Rain ").ok(), Some("Rain"));
        assert!(validate_name("Rain at night").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("../escape").is_err());
    }
}
