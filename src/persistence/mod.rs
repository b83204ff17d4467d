pub mod history;
pub mod settings;

pub use history::{CompletedSession, JsonlSessionHistory, MemorySessionHistory, SessionHistory};
pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsDocument, SettingsStore};
