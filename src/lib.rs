pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod library;
pub mod persistence;
pub mod platform;
pub mod quality;
pub mod session;
pub mod store;
pub mod timer;
pub mod trim;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioClip, AudioFile, AudioFrame, AudioSource,
    CodecEncoders, EncoderFactory, HeadlessDevice, PlaybackDevice,
};
pub use capture::{CaptureConfig, CaptureEngine, RecordedTake, RecordingStatus};
pub use config::Config;
pub use error::{CaptureError, PlaybackError, TrimError};
pub use library::{AudioLibraryManager, LibrarySnapshot, SoundCategory, SoundOption, SoundSource};
pub use persistence::{
    CompletedSession, JsonSettingsStore, JsonlSessionHistory, MemorySessionHistory, MemorySettingsStore,
    SessionHistory, SettingsStore,
};
pub use platform::{AudioRoute, SystemAudioRoute};
pub use quality::{allowed_import_extensions, resolve, QualityPolicy, QualityTier};
pub use session::{FocusSession, SessionConfig, SessionStats};
pub use store::{LibraryStore, Partition};
pub use timer::{format_clock, SessionGoal, SessionTimer, TimerSnapshot, TimerState};
pub use trim::{TrimOutcome, TrimRequest, Trimmer};
