pub mod engine;

pub use engine::{CaptureConfig, CaptureEngine, RecordedTake, RecordingStatus};
