// Shared fixtures for the integration tests
//
// Sounds are synthesized at test time. Compressed-tier tests use a stand-in
// encoder factory so they do not need ffmpeg on the test machine.

#![allow(dead_code)]

use anyhow::{bail, Result};
use field_session::audio::caf::CafWriter;
use field_session::audio::{EncoderFactory, EncoderSettings, HeadlessDevice, SampleEncoder};
use field_session::persistence::MemorySettingsStore;
use field_session::platform::SwitchableAudioRoute;
use field_session::{AudioLibraryManager, LibraryStore, QualityTier};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Interleaved 440 Hz tone at half scale
pub fn tone(sample_rate: u32, channels: u16, seconds: f64) -> Vec<i16> {
    let frames = (sample_rate as f64 * seconds).round() as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let value = (0.5 * (2.0 * std::f64::consts::PI * 440.0 * t).sin() * i16::MAX as f64) as i16;
        for _ in 0..channels {
            samples.push(value);
        }
    }
    samples
}

pub fn write_tone_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f64) -> Result<Vec<i16>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let samples = tone(sample_rate, channels, seconds);

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(samples)
}

/// 24-bit WAV whose samples use the low byte, so 16-bit storage would lose them
pub fn write_tone_wav_24(path: &Path, sample_rate: u32, channels: u16, seconds: f64) -> Result<Vec<i32>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 24,
        sample_format: SampleFormat::Int,
    };
    let samples: Vec<i32> = tone(sample_rate, channels, seconds)
        .into_iter()
        .enumerate()
        .map(|(i, s)| ((s as i32) << 8) | (i as i32 & 0xff))
        .collect();

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(samples)
}

pub fn write_tone_caf(path: &Path, sample_rate: u32, channels: u16, seconds: f64) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = CafWriter::create(path, sample_rate, channels)?;
    writer.write_samples(&tone(sample_rate, channels, seconds))?;
    writer.finalize()?;
    Ok(())
}

/// Encoder set that stores every format as PCM CAF and remembers what it
/// was asked for
#[derive(Default)]
pub struct PcmStandInEncoders {
    pub requested: Mutex<Vec<(PathBuf, EncoderSettings)>>,
}

impl PcmStandInEncoders {
    pub fn requests(&self) -> Vec<(PathBuf, EncoderSettings)> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl EncoderFactory for PcmStandInEncoders {
    fn create(&self, path: &Path, settings: &EncoderSettings) -> Result<Box<dyn SampleEncoder>> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push((path.to_path_buf(), settings.clone()));
        }
        let writer = CafWriter::create(path, settings.sample_rate, settings.channels)?;
        Ok(Box::new(StandInEncoder { writer }))
    }
}

struct StandInEncoder {
    writer: CafWriter,
}

impl SampleEncoder for StandInEncoder {
    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        self.writer.write_samples(samples)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

/// Encoder set whose outputs fail when closed
pub struct FailingEncoders;

impl EncoderFactory for FailingEncoders {
    fn create(&self, path: &Path, settings: &EncoderSettings) -> Result<Box<dyn SampleEncoder>> {
        let writer = CafWriter::create(path, settings.sample_rate, settings.channels)?;
        Ok(Box::new(FailingEncoder { _writer: writer }))
    }
}

struct FailingEncoder {
    _writer: CafWriter,
}

impl SampleEncoder for FailingEncoder {
    fn write_samples(&mut self, _samples: &[i16]) -> Result<()> {
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        bail!("encoder rejected the stream")
    }
}

/// Encoder set whose outputs write PCM CAF until a given write fails
pub struct FailAfterEncoders {
    pub failing_write: usize,
}

impl EncoderFactory for FailAfterEncoders {
    fn create(&self, path: &Path, settings: &EncoderSettings) -> Result<Box<dyn SampleEncoder>> {
        let writer = CafWriter::create(path, settings.sample_rate, settings.channels)?;
        Ok(Box::new(FailAfterEncoder {
            writer,
            writes: 0,
            failing_write: self.failing_write,
        }))
    }
}

struct FailAfterEncoder {
    writer: CafWriter,
    writes: usize,
    failing_write: usize,
}

impl SampleEncoder for FailAfterEncoder {
    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        self.writes += 1;
        if self.writes >= self.failing_write {
            bail!("disk full");
        }
        self.writer.write_samples(samples)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

/// Library in a temp dir with in-memory settings and a headless device
pub struct Fixture {
    pub temp_dir: TempDir,
    pub store: LibraryStore,
    pub settings: Arc<MemorySettingsStore>,
    pub device: HeadlessDevice,
    pub route: Arc<SwitchableAudioRoute>,
}

impl Fixture {
    pub fn new(tier: QualityTier) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let store = LibraryStore::new(temp_dir.path().join("library"));
        store.setup()?;

        Ok(Self {
            temp_dir,
            store,
            settings: Arc::new(MemorySettingsStore::with_tier(tier)),
            device: HeadlessDevice::new(),
            route: Arc::new(SwitchableAudioRoute::default()),
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn bundled_dir(&self) -> PathBuf {
        self.temp_dir.path().join("bundled")
    }

    pub async fn library(&self) -> Result<Arc<AudioLibraryManager>> {
        let manager = AudioLibraryManager::new(
            self.store.clone(),
            self.bundled_dir(),
            self.settings.clone(),
            Arc::new(self.device.clone()),
            self.route.clone(),
        )
        .await?;
        Ok(Arc::new(manager))
    }
}
