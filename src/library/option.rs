use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Extension of the bundled preset resources
pub const BUNDLED_EXTENSION: &str = "mp3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCategory {
    Ambience,
    Chime,
}

impl SoundCategory {
    pub const ALL: [SoundCategory; 2] = [SoundCategory::Ambience, SoundCategory::Chime];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoundCategory::Ambience => "ambience",
            SoundCategory::Chime => "chime",
        }
    }
}

impl fmt::Display for SoundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a sound's audio comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoundSource {
    /// Resource shipped with the application, by name
    Bundled { resource: String },
    /// File in the user's library
    File { path: PathBuf },
}

impl SoundSource {
    /// Concrete file to decode for this source
    pub fn resolve(&self, bundled_dir: &Path) -> PathBuf {
        match self {
            SoundSource::Bundled { resource } => {
                bundled_dir.join(format!("{}.{}", resource, BUNDLED_EXTENSION))
            }
            SoundSource::File { path } => path.clone(),
        }
    }

    /// Short description for listings
    pub fn describe(&self) -> String {
        match self {
            SoundSource::Bundled { resource } => format!("bundled:{}", resource),
            SoundSource::File { path } => path.display().to_string(),
        }
    }
}

/// A selectable ambience or chime. Identity is the id alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundOption {
    pub id: Uuid,
    pub name: String,
    pub source: SoundSource,
}

impl SoundOption {
    /// User sound backed by a library file
    pub fn custom(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source: SoundSource::File { path: path.into() },
        }
    }

    /// Bundled preset; the id is derived from the resource name so it is
    /// identical across runs
    pub fn preset(name: impl Into<String>, resource: &str) -> Self {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("field.preset.{}", resource).as_bytes());
        Self {
            id,
            name: name.into(),
            source: SoundSource::Bundled {
                resource: resource.to_string(),
            },
        }
    }

    pub fn is_preset(&self) -> bool {
        matches!(self.source, SoundSource::Bundled { .. })
    }

    pub fn file_path(&self) -> Option<&Path> {
        match &self.source {
            SoundSource::File { path } => Some(path),
            SoundSource::Bundled { .. } => None,
        }
    }
}

impl PartialEq for SoundOption {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SoundOption {}

/// Bundled presets for a category, in display order
pub fn presets(category: SoundCategory) -> Vec<SoundOption> {
    match category {
        SoundCategory::Ambience => vec![
            SoundOption::preset("Ambient 1", "Ambient1"),
            SoundOption::preset("Ambient 2", "Ambient2"),
        ],
        SoundCategory::Chime => vec![SoundOption::preset("Bowl 1", "Chime1")],
    }
}

/// Selection used before the user picks anything
pub fn default_selection(category: SoundCategory) -> SoundOption {
    match category {
        SoundCategory::Ambience => SoundOption::preset("Ambient 1", "Ambient1"),
        SoundCategory::Chime => SoundOption::preset("Bowl 1", "Chime1"),
    }
}
