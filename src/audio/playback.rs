use anyhow::Result;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::file::AudioFile;

/// Decoded sound ready for playback
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Arc<Vec<i16>>,
}

impl AudioClip {
    /// Decode a file into a clip (blocking)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from(AudioFile::open(path)?))
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() / self.channels as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

impl From<AudioFile> for AudioClip {
    fn from(file: AudioFile) -> Self {
        Self {
            name: file.path,
            sample_rate: file.sample_rate,
            channels: file.channels,
            samples: Arc::new(file.samples),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Repeat from the start until stopped
    Loop,
    /// Play to the end once
    Once,
}

/// A sound output
pub trait PlaybackDevice: Send + Sync {
    /// Start playing a clip from the beginning
    fn play(&self, clip: &AudioClip, mode: PlaybackMode) -> Result<Box<dyn Playback>>;

    fn name(&self) -> &str;
}

/// Handle to one running playback. Dropping the handle stops it.
pub trait Playback: Send {
    fn stop(&mut self);

    fn is_playing(&self) -> bool;
}

/// Playback device without audio hardware
///
/// Keeps wall-clock time for each handle so one-shots report finished once
/// their duration has elapsed. Counts live handles so callers can check that
/// players are replaced rather than layered.
#[derive(Debug, Clone, Default)]
pub struct HeadlessDevice {
    live: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles started and not yet stopped or dropped
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Total number of playbacks started on this device
    pub fn plays_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl PlaybackDevice for HeadlessDevice {
    fn play(&self, clip: &AudioClip, mode: PlaybackMode) -> Result<Box<dyn Playback>> {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
        debug!("Headless playback started: {} ({:?})", clip.name, mode);

        Ok(Box::new(HeadlessPlayback {
            started_at: Instant::now(),
            duration: clip.duration(),
            mode,
            stopped: false,
            live: Arc::clone(&self.live),
        }))
    }

    fn name(&self) -> &str {
        "headless"
    }
}

struct HeadlessPlayback {
    started_at: Instant,
    duration: Duration,
    mode: PlaybackMode,
    stopped: bool,
    live: Arc<AtomicUsize>,
}

impl Playback for HeadlessPlayback {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_playing(&self) -> bool {
        if self.stopped {
            return false;
        }
        match self.mode {
            PlaybackMode::Loop => true,
            PlaybackMode::Once => self.started_at.elapsed() < self.duration,
        }
    }
}

impl Drop for HeadlessPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(seconds: f64) -> AudioClip {
        let frames = (seconds * 1000.0) as usize;
        AudioFile::from_samples("tone", 1000, 1, vec![100; frames]).into()
    }

    #[test]
    fn test_clip_duration() {
        assert_eq!(clip(1.5).duration(), Duration::from_millis(1500));
    }

    #[test]
    fn test_loop_plays_until_stopped() -> Result<()> {
        let device = HeadlessDevice::new();
        let mut playback = device.play(&clip(0.0), PlaybackMode::Loop)?;
        assert!(playback.is_playing());
        assert_eq!(device.live_handles(), 1);

        playback.stop();
        playback.stop();
        assert!(!playback.is_playing());
        assert_eq!(device.live_handles(), 0);
        Ok(())
    }

    #[test]
    fn test_once_finishes_after_duration() -> Result<()> {
        let device = HeadlessDevice::new();
        let short = device.play(&clip(0.0), PlaybackMode::Once)?;
        assert!(!short.is_playing());

        let long = device.play(&clip(60.0), PlaybackMode::Once)?;
        assert!(long.is_playing());
        assert_eq!(device.plays_started(), 2);

        drop(short);
        drop(long);
        assert_eq!(device.live_handles(), 0);
        Ok(())
    }
}
