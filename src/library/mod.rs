pub mod manager;
pub mod option;

pub use manager::{AudioLibraryManager, LibrarySnapshot};
pub use option::{default_selection, presets, SoundCategory, SoundOption, SoundSource, BUNDLED_EXTENSION};
