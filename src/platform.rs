//! Host audio routing
//!
//! Playback and capture ask the host for an audio route before touching a
//! device. A denied request aborts the operation that asked.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub trait AudioRoute: Send + Sync {
    fn request_playback_route(&self) -> Result<()>;

    fn request_capture_route(&self) -> Result<()>;
}

/// Route for hosts without an audio session API; always granted
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAudioRoute;

impl AudioRoute for SystemAudioRoute {
    fn request_playback_route(&self) -> Result<()> {
        debug!("Playback route granted");
        Ok(())
    }

    fn request_capture_route(&self) -> Result<()> {
        debug!("Capture route granted");
        Ok(())
    }
}

/// Route whose grants can be switched off at runtime
#[derive(Debug)]
pub struct SwitchableAudioRoute {
    playback: AtomicBool,
    capture: AtomicBool,
}

impl SwitchableAudioRoute {
    pub fn new(playback: bool, capture: bool) -> Self {
        Self {
            playback: AtomicBool::new(playback),
            capture: AtomicBool::new(capture),
        }
    }

    pub fn set_playback(&self, granted: bool) {
        self.playback.store(granted, Ordering::SeqCst);
    }

    pub fn set_capture(&self, granted: bool) {
        self.capture.store(granted, Ordering::SeqCst);
    }
}

impl Default for SwitchableAudioRoute {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl AudioRoute for SwitchableAudioRoute {
    fn request_playback_route(&self) -> Result<()> {
        if !self.playback.load(Ordering::SeqCst) {
            anyhow::bail!("Playback route denied");
        }
        Ok(())
    }

    fn request_capture_route(&self) -> Result<()> {
        if !self.capture.load(Ordering::SeqCst) {
            anyhow::bail!("Capture route denied");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switchable_route() {
        let route = SwitchableAudioRoute::default();
        assert!(route.request_playback_route().is_ok());

        route.set_playback(false);
        assert!(route.request_playback_route().is_err());
        assert!(route.request_capture_route().is_ok());

        route.set_capture(false);
        assert!(route.request_capture_route().is_err());
    }
}
