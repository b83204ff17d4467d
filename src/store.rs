//! Sound library store
//!
//! On-disk layout of the library: one directory per partition under a common
//! root. Scans only see finished files carrying the current tier's extension;
//! partial exports are written under hidden names so they never show up.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::library::SoundCategory;
use crate::quality::QualityPolicy;

/// Storage partition of the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Freshly captured, untrimmed recordings
    Raw,
    Ambient,
    Chimes,
}

impl Partition {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Partition::Raw => "RAW",
            Partition::Ambient => "AMBIENT",
            Partition::Chimes => "CHIMES",
        }
    }

    pub fn for_category(category: SoundCategory) -> Self {
        match category {
            SoundCategory::Ambience => Partition::Ambient,
            SoundCategory::Chime => Partition::Chimes,
        }
    }
}

/// File-system backed library store
#[derive(Debug, Clone)]
pub struct LibraryStore {
    root: PathBuf,
}

impl LibraryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.root.join(partition.dir_name())
    }

    /// Create every partition directory if missing
    pub fn setup(&self) -> Result<()> {
        for partition in [Partition::Raw, Partition::Ambient, Partition::Chimes] {
            let dir = self.partition_dir(partition);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create library directory: {:?}", dir))?;
        }
        debug!("Library store ready at {}", self.root.display());
        Ok(())
    }

    /// List finished files in a partition that match the policy's extension
    ///
    /// Results are ordered oldest first so user additions keep their insertion
    /// order across scans.
    pub async fn scan(&self, partition: Partition, policy: &QualityPolicy) -> Result<Vec<PathBuf>> {
        let dir = self.partition_dir(partition);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read library directory: {:?}", dir))
            }
        };

        let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_hidden(&path) || !policy.matches_extension(&path) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, path));
        }

        found.sort();
        debug!(
            "Scanned {} for .{}: {} files",
            dir.display(),
            policy.extension,
            found.len()
        );

        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// Final library path for a named sound
    pub fn destination(&self, partition: Partition, name: &str, policy: &QualityPolicy) -> PathBuf {
        self.partition_dir(partition)
            .join(format!("{}.{}", name, policy.extension))
    }

    /// Path for a recording started at `started_at`, unique within RAW
    pub fn recording_path(&self, started_at: DateTime<Utc>, policy: &QualityPolicy) -> PathBuf {
        let dir = self.partition_dir(Partition::Raw);
        let stem = format!("REC_{}", started_at.timestamp());

        let mut path = dir.join(format!("{}.{}", stem, policy.extension));
        let mut suffix = 1;
        while path.exists() {
            path = dir.join(format!("{}_{}.{}", stem, suffix, policy.extension));
            suffix += 1;
        }
        path
    }

    /// Hidden sibling used while a file is being written
    pub fn partial_path(destination: &Path) -> PathBuf {
        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        destination.with_file_name(format!(".{}.partial", file_name))
    }

    /// Move a finished partial file into place, replacing any previous file
    pub fn commit(partial: &Path, destination: &Path) -> Result<()> {
        if destination.exists() {
            fs::remove_file(destination)
                .with_context(|| format!("Failed to remove existing file: {:?}", destination))?;
        }
        fs::rename(partial, destination)
            .with_context(|| format!("Failed to move {:?} into place", destination))?;
        info!("Library file written: {}", destination.display());
        Ok(())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true)
}
