//! Errors callers branch on
//!
//! Plumbing returns `anyhow::Result`; these enums sit at the boundaries where
//! the caller's behavior depends on what went wrong.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Ambience, chime or preview playback could not start
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Playback route denied: {0}")]
    RouteDenied(String),

    /// Missing or undecodable file, including stale selections
    #[error("Sound unavailable: {path:?}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Output device error: {0}")]
    Device(String),
}

/// Recording could not start
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Already recording")]
    AlreadyRecording,

    #[error("Capture route denied: {0}")]
    RouteDenied(String),

    /// Target file, encoder or backend setup failed
    #[error("Capture configuration failed: {0}")]
    Configuration(String),
}

/// Trim and re-encode failed
#[derive(Error, Debug)]
pub enum TrimError {
    #[error("Invalid trim range {start:?}..{end:?} for source of {duration:?}")]
    InvalidRange {
        start: Duration,
        end: Duration,
        duration: Duration,
    },

    #[error("Trim source unavailable: {0}")]
    SourceUnavailable(String),

    /// Encoding or placing the output failed; no output file remains
    #[error("Export failed: {0}")]
    Export(String),
}
