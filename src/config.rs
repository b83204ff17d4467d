use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::CodecEncoders;
use crate::capture::CaptureConfig;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub audio: AudioConfig,
    pub timer: TimerConfig,
    pub encoder: EncoderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Library root; holds RAW/AMBIENT/CHIMES, settings and history
    pub root: String,
    /// Directory of the bundled preset sounds
    pub bundled_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "~/.field".to_string(),
            bundled_dir: "~/.field/bundled".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.root).as_ref())
    }

    pub fn bundled_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.bundled_dir).as_ref())
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root_path().join("settings.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.root_path().join("history.jsonl")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    pub metering_interval_ms: u64,
    pub capture_frame_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            metering_interval_ms: 100,
            capture_frame_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimerConfig {
    pub tick_interval_ms: u64,
    /// 0 = open-ended
    pub default_goal_secs: u64,
    pub min_recorded_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            default_goal_secs: 300,
            min_recorded_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg_path: String,
    pub aac_bitrate_kbps: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            aac_bitrate_kbps: 128,
        }
    }
}

impl Config {
    /// Load `path` (any extension the config crate knows, optional) with
    /// `FIELD_SECTION__KEY` environment overrides on top
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("FIELD").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            metering_interval: Duration::from_millis(self.audio.metering_interval_ms.max(1)),
            frame_duration_ms: self.audio.capture_frame_ms.max(1),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            goal_secs: self.timer.default_goal_secs,
            tick_interval: Duration::from_millis(self.timer.tick_interval_ms.max(1)),
            min_recorded: Duration::from_secs(self.timer.min_recorded_secs),
        }
    }

    pub fn encoders(&self) -> CodecEncoders {
        CodecEncoders::new(&self.encoder.ffmpeg_path, self.encoder.aac_bitrate_kbps)
    }
}
