//! Focus session coordination
//!
//! This module provides the `FocusSession` abstraction that ties together:
//! - The session timer and its tick
//! - Ambience playback following start/pause/resume
//! - The goal chime
//! - Session history and statistics

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::FocusSession;
pub use stats::{DailyTotal, SessionStats};
