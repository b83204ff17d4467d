use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::library::{SoundCategory, SoundOption};
use crate::quality::QualityTier;

/// Key/value persistence of user choices
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn save_selection(&self, category: SoundCategory, option: &SoundOption) -> Result<()>;

    async fn load_selection(&self, category: SoundCategory) -> Result<Option<SoundOption>>;

    async fn save_option_list(&self, category: SoundCategory, options: &[SoundOption]) -> Result<()>;

    async fn load_option_list(&self, category: SoundCategory) -> Result<Option<Vec<SoundOption>>>;

    async fn save_quality_tier(&self, tier: QualityTier) -> Result<()>;

    /// Stored tier, or the default tier if none was saved
    async fn load_quality_tier(&self) -> Result<QualityTier>;
}

/// Everything the settings store keeps, as one serializable document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default)]
    pub quality_tier: Option<QualityTier>,
    #[serde(default)]
    pub selections: BTreeMap<SoundCategory, SoundOption>,
    #[serde(default)]
    pub option_lists: BTreeMap<SoundCategory, Vec<SoundOption>>,
}

/// Settings kept in memory only
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    document: Mutex<SettingsDocument>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(tier: QualityTier) -> Self {
        Self {
            document: Mutex::new(SettingsDocument {
                quality_tier: Some(tier),
                ..Default::default()
            }),
        }
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn save_selection(&self, category: SoundCategory, option: &SoundOption) -> Result<()> {
        self.document.lock().await.selections.insert(category, option.clone());
        Ok(())
    }

    async fn load_selection(&self, category: SoundCategory) -> Result<Option<SoundOption>> {
        Ok(self.document.lock().await.selections.get(&category).cloned())
    }

    async fn save_option_list(&self, category: SoundCategory, options: &[SoundOption]) -> Result<()> {
        self.document
            .lock()
            .await
            .option_lists
            .insert(category, options.to_vec());
        Ok(())
    }

    async fn load_option_list(&self, category: SoundCategory) -> Result<Option<Vec<SoundOption>>> {
        Ok(self.document.lock().await.option_lists.get(&category).cloned())
    }

    async fn save_quality_tier(&self, tier: QualityTier) -> Result<()> {
        self.document.lock().await.quality_tier = Some(tier);
        Ok(())
    }

    async fn load_quality_tier(&self) -> Result<QualityTier> {
        Ok(self.document.lock().await.quality_tier.unwrap_or_default())
    }
}

/// Settings in a JSON file
///
/// The file is re-read on every call so a tier changed by another process is
/// seen by the next operation. Writes go to a temporary sibling which is then
/// renamed over the file.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<SettingsDocument> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse settings: {:?}", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsDocument::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read settings: {:?}", self.path)),
        }
    }

    async fn modify<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut SettingsDocument) + Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read().await?;
        change(&mut document);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
        }

        let json = serde_json::to_vec_pretty(&document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write settings: {:?}", tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace settings: {:?}", self.path))?;

        debug!("Settings saved: {}", self.path.display());
        Ok(())
    }
}

#[async_trait::async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn save_selection(&self, category: SoundCategory, option: &SoundOption) -> Result<()> {
        let option = option.clone();
        self.modify(move |doc| {
            doc.selections.insert(category, option);
        })
        .await
    }

    async fn load_selection(&self, category: SoundCategory) -> Result<Option<SoundOption>> {
        Ok(self.read().await?.selections.remove(&category))
    }

    async fn save_option_list(&self, category: SoundCategory, options: &[SoundOption]) -> Result<()> {
        let options = options.to_vec();
        self.modify(move |doc| {
            doc.option_lists.insert(category, options);
        })
        .await
    }

    async fn load_option_list(&self, category: SoundCategory) -> Result<Option<Vec<SoundOption>>> {
        Ok(self.read().await?.option_lists.remove(&category))
    }

    async fn save_quality_tier(&self, tier: QualityTier) -> Result<()> {
        self.modify(move |doc| doc.quality_tier = Some(tier)).await
    }

    async fn load_quality_tier(&self) -> Result<QualityTier> {
        Ok(self.read().await?.quality_tier.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("settings.json");
        let store = JsonSettingsStore::new(&path);

        assert_eq!(store.load_quality_tier().await?, QualityTier::Lossless);
        assert!(store.load_selection(SoundCategory::Chime).await?.is_none());

        let rain = SoundOption::custom("Rain", "/lib/AMBIENT/Rain.caf");
        store.save_quality_tier(QualityTier::Compressed).await?;
        store.save_selection(SoundCategory::Ambience, &rain).await?;
        store
            .save_option_list(SoundCategory::Ambience, std::slice::from_ref(&rain))
            .await?;

        // A second store on the same file sees everything
        let reopened = JsonSettingsStore::new(&path);
        assert_eq!(reopened.load_quality_tier().await?, QualityTier::Compressed);

        let selection = reopened.load_selection(SoundCategory::Ambience).await?;
        assert_eq!(selection.map(|o| o.id), Some(rain.id));

        let list = reopened
            .load_option_list(SoundCategory::Ambience)
            .await?
            .unwrap_or_default();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].source, rain.source);
        assert!(reopened.load_option_list(SoundCategory::Chime).await?.is_none());

        assert!(!path.with_extension("json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, b"{ not json")?;

        let store = JsonSettingsStore::new(&path);
        assert!(store.load_quality_tier().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_store_is_isolated() -> Result<()> {
        let a = MemorySettingsStore::with_tier(QualityTier::Compressed);
        let b = MemorySettingsStore::new();

        assert_eq!(a.load_quality_tier().await?, QualityTier::Compressed);
        assert_eq!(b.load_quality_tier().await?, QualityTier::Lossless);
        Ok(())
    }
}
