use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::option::{default_selection, presets, SoundCategory, SoundOption};
use crate::audio::{AudioClip, Playback, PlaybackDevice, PlaybackMode};
use crate::error::PlaybackError;
use crate::persistence::SettingsStore;
use crate::platform::AudioRoute;
use crate::quality::{resolve, QualityTier};
use crate::store::{LibraryStore, Partition};

/// Published view of the library
#[derive(Debug, Clone, Serialize)]
pub struct LibrarySnapshot {
    pub tier: QualityTier,
    pub ambience_options: Vec<SoundOption>,
    pub chime_options: Vec<SoundOption>,
    pub selected_ambience: SoundOption,
    pub selected_chime: SoundOption,
    pub ambience_playing: bool,
}

impl LibrarySnapshot {
    pub fn options(&self, category: SoundCategory) -> &[SoundOption] {
        match category {
            SoundCategory::Ambience => &self.ambience_options,
            SoundCategory::Chime => &self.chime_options,
        }
    }

    pub fn selected(&self, category: SoundCategory) -> &SoundOption {
        match category {
            SoundCategory::Ambience => &self.selected_ambience,
            SoundCategory::Chime => &self.selected_chime,
        }
    }
}

struct LibraryState {
    tier: QualityTier,
    ambience_options: Vec<SoundOption>,
    chime_options: Vec<SoundOption>,
    selected_ambience: SoundOption,
    selected_chime: SoundOption,
    ambience: Option<Box<dyn Playback>>,
    chime: Option<Box<dyn Playback>>,
}

impl LibraryState {
    fn options_mut(&mut self, category: SoundCategory) -> &mut Vec<SoundOption> {
        match category {
            SoundCategory::Ambience => &mut self.ambience_options,
            SoundCategory::Chime => &mut self.chime_options,
        }
    }

    fn selected_mut(&mut self, category: SoundCategory) -> &mut SoundOption {
        match category {
            SoundCategory::Ambience => &mut self.selected_ambience,
            SoundCategory::Chime => &mut self.selected_chime,
        }
    }

    fn ambience_playing(&self) -> bool {
        self.ambience.as_ref().map(|p| p.is_playing()).unwrap_or(false)
    }

    fn snapshot(&self) -> LibrarySnapshot {
        LibrarySnapshot {
            tier: self.tier,
            ambience_options: self.ambience_options.clone(),
            chime_options: self.chime_options.clone(),
            selected_ambience: self.selected_ambience.clone(),
            selected_chime: self.selected_chime.clone(),
            ambience_playing: self.ambience_playing(),
        }
    }
}

/// Owns the option lists, the selections and the two players
///
/// There is at most one ambience handle and one chime handle. Every path that
/// starts a player stops the previous handle first.
pub struct AudioLibraryManager {
    store: LibraryStore,
    bundled_dir: PathBuf,
    settings: Arc<dyn SettingsStore>,
    device: Arc<dyn PlaybackDevice>,
    route: Arc<dyn AudioRoute>,
    state: Mutex<LibraryState>,
    snapshot_tx: watch::Sender<LibrarySnapshot>,
}

impl AudioLibraryManager {
    /// Restore persisted selections and run the first library scan
    pub async fn new(
        store: LibraryStore,
        bundled_dir: impl Into<PathBuf>,
        settings: Arc<dyn SettingsStore>,
        device: Arc<dyn PlaybackDevice>,
        route: Arc<dyn AudioRoute>,
    ) -> Result<Self> {
        let tier = settings.load_quality_tier().await?;
        let selected_ambience = settings
            .load_selection(SoundCategory::Ambience)
            .await?
            .unwrap_or_else(|| default_selection(SoundCategory::Ambience));
        let selected_chime = settings
            .load_selection(SoundCategory::Chime)
            .await?
            .unwrap_or_else(|| default_selection(SoundCategory::Chime));

        let state = LibraryState {
            tier,
            ambience_options: Vec::new(),
            chime_options: Vec::new(),
            selected_ambience,
            selected_chime,
            ambience: None,
            chime: None,
        };
        let (snapshot_tx, _) = watch::channel(state.snapshot());

        let manager = Self {
            store,
            bundled_dir: bundled_dir.into(),
            settings,
            device,
            route,
            state: Mutex::new(state),
            snapshot_tx,
        };

        manager.refresh_library().await?;
        Ok(manager)
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<LibrarySnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Rebuild both option lists from the store for the current tier
    pub async fn refresh_library(&self) -> Result<()> {
        let tier = self.settings.load_quality_tier().await?;
        let policy = resolve(tier);

        let mut state = self.state.lock().await;
        state.tier = tier;

        for category in SoundCategory::ALL {
            let files = self.store.scan(Partition::for_category(category), &policy).await?;
            let persisted = self.settings.load_option_list(category).await?.unwrap_or_default();

            let mut options = if tier.shows_bundled_presets() {
                presets(category)
            } else {
                Vec::new()
            };

            for path in files {
                let known = state
                    .options_mut(category)
                    .iter()
                    .chain(persisted.iter())
                    .find(|o| o.file_path() == Some(path.as_path()))
                    .cloned();
                options.push(known.unwrap_or_else(|| SoundOption::custom(display_name(&path), path)));
            }

            debug!("Library {} options: {}", category, options.len());
            *state.options_mut(category) = options;
        }

        info!(
            "Library refreshed ({}): {} ambience, {} chime",
            tier,
            state.ambience_options.len(),
            state.chime_options.len()
        );
        self.publish(&state);
        Ok(())
    }

    pub async fn quality_tier(&self) -> Result<QualityTier> {
        self.settings.load_quality_tier().await
    }

    /// Persist a new tier and rescan the library under it
    pub async fn set_quality_tier(&self, tier: QualityTier) -> Result<()> {
        self.settings.save_quality_tier(tier).await?;
        info!("Quality tier set: {}", tier);
        self.refresh_library().await
    }

    pub async fn select_ambience(&self, option: SoundOption) -> Result<()> {
        let restart = {
            let mut state = self.state.lock().await;
            state.selected_ambience = option.clone();
            self.publish(&state);
            state.ambience_playing()
        };

        self.settings.save_selection(SoundCategory::Ambience, &option).await?;
        info!("Ambience selected: {}", option.name);

        if restart {
            // Failure leaves ambience stopped and is already logged
            let _ = self.start_ambience().await;
        }
        Ok(())
    }

    pub async fn select_chime(&self, option: SoundOption) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.selected_chime = option.clone();
            self.publish(&state);
        }

        self.settings.save_selection(SoundCategory::Chime, &option).await?;
        info!("Chime selected: {}", option.name);
        Ok(())
    }

    /// Loop the selected ambience from the start, replacing any current loop
    ///
    /// The clip is decoded without holding the library lock, so a chime can
    /// fire while a long ambience loads. The handle swap happens under the lock.
    pub async fn start_ambience(&self) -> Result<(), PlaybackError> {
        let option = self.state.lock().await.selected_ambience.clone();
        let loaded = self.load_clip(&option).await;

        let mut state = self.state.lock().await;
        if state.selected_ambience != option {
            debug!("Ambience selection changed while loading {}", option.name);
            return Ok(());
        }

        if let Some(mut previous) = state.ambience.take() {
            previous.stop();
        }

        let result = loaded.and_then(|clip| {
            self.device
                .play(&clip, PlaybackMode::Loop)
                .map_err(|e| PlaybackError::Device(e.to_string()))
        });

        let outcome = match result {
            Ok(handle) => {
                info!("Ambience started: {}", option.name);
                state.ambience = Some(handle);
                Ok(())
            }
            Err(e) => {
                warn!("Ambience not started: {}", e);
                Err(e)
            }
        };

        self.publish(&state);
        outcome
    }

    pub async fn stop_ambience(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut handle) = state.ambience.take() {
            handle.stop();
            info!("Ambience stopped");
            self.publish(&state);
        }
    }

    pub async fn is_ambience_playing(&self) -> bool {
        self.state.lock().await.ambience_playing()
    }

    /// Play the selected chime once; a chime still sounding restarts
    pub async fn trigger_chime(&self) -> Result<(), PlaybackError> {
        let option = self.state.lock().await.selected_chime.clone();
        let loaded = self.load_clip(&option).await;

        let mut state = self.state.lock().await;
        if let Some(mut previous) = state.chime.take() {
            previous.stop();
        }

        let clip = match loaded {
            Ok(clip) => clip,
            Err(e) => {
                warn!("Chime not played: {}", e);
                return Err(e);
            }
        };

        match self.device.play(&clip, PlaybackMode::Once) {
            Ok(handle) => {
                info!("Chime played: {}", option.name);
                state.chime = Some(handle);
                Ok(())
            }
            Err(e) => {
                warn!("Chime not played: {}", e);
                Err(PlaybackError::Device(e.to_string()))
            }
        }
    }

    pub async fn is_chime_playing(&self) -> bool {
        let state = self.state.lock().await;
        state.chime.as_ref().map(|p| p.is_playing()).unwrap_or(false)
    }

    /// Register a new library file and make it the category's selection
    pub async fn add_custom_sound(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
        category: SoundCategory,
    ) -> Result<SoundOption> {
        let path = path.into();
        let (option, custom) = {
            let mut state = self.state.lock().await;
            let options = state.options_mut(category);

            let option = match options.iter_mut().find(|o| o.file_path() == Some(path.as_path())) {
                Some(existing) => {
                    existing.name = name.to_string();
                    existing.clone()
                }
                None => {
                    let option = SoundOption::custom(name, &path);
                    options.push(option.clone());
                    option
                }
            };

            let custom: Vec<SoundOption> = options.iter().filter(|o| !o.is_preset()).cloned().collect();
            *state.selected_mut(category) = option.clone();
            self.publish(&state);
            (option, custom)
        };

        self.settings.save_option_list(category, &custom).await?;
        self.settings.save_selection(category, &option).await?;

        info!("Custom {} added: {} ({})", category, option.name, path.display());
        Ok(option)
    }

    /// Stop both players
    pub async fn stop_all(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut handle) = state.ambience.take() {
            handle.stop();
        }
        if let Some(mut handle) = state.chime.take() {
            handle.stop();
        }
        self.publish(&state);
    }

    async fn load_clip(&self, option: &SoundOption) -> Result<AudioClip, PlaybackError> {
        self.route
            .request_playback_route()
            .map_err(|e| PlaybackError::RouteDenied(e.to_string()))?;

        let path = option.source.resolve(&self.bundled_dir);
        if !path.exists() {
            return Err(PlaybackError::SourceUnavailable {
                path,
                reason: "file not found".to_string(),
            });
        }

        let load_path = path.clone();
        match tokio::task::spawn_blocking(move || AudioClip::load(load_path)).await {
            Ok(Ok(clip)) => Ok(clip),
            Ok(Err(e)) => Err(PlaybackError::SourceUnavailable {
                path,
                reason: format!("{:#}", e),
            }),
            Err(e) => Err(PlaybackError::Device(format!("Decode task failed: {}", e))),
        }
    }

    fn publish(&self, state: &LibraryState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }
}

fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::HeadlessDevice;
    use crate::persistence::MemorySettingsStore;
    use crate::platform::SystemAudioRoute;
    use tempfile::TempDir;

    async fn manager(root: &Path, tier: QualityTier) -> Result<(AudioLibraryManager, HeadlessDevice)> {
        let store = LibraryStore::new(root.join("library"));
        store.setup()?;
        let device = HeadlessDevice::new();
        let manager = AudioLibraryManager::new(
            store,
            root.join("bundled"),
            Arc::new(MemorySettingsStore::with_tier(tier)),
            Arc::new(device.clone()),
            Arc::new(SystemAudioRoute),
        )
        .await?;
        Ok((manager, device))
    }

    #[tokio::test]
    async fn test_presets_only_in_compressed_tier() -> Result<()> {
        let temp_dir = TempDir::new()?;

        let (lossless, _) = manager(temp_dir.path(), QualityTier::Lossless).await?;
        let snapshot = lossless.snapshot();
        assert!(snapshot.ambience_options.is_empty());
        assert!(snapshot.chime_options.is_empty());
        assert_eq!(snapshot.selected_chime.name, "Bowl 1");

        lossless.set_quality_tier(QualityTier::Compressed).await?;
        let snapshot = lossless.snapshot();
        assert_eq!(snapshot.ambience_options.len(), 2);
        assert_eq!(snapshot.chime_options.len(), 1);
        assert!(snapshot.ambience_options.iter().all(|o| o.is_preset()));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_bundled_resource_is_unavailable() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let (manager, device) = manager(temp_dir.path(), QualityTier::Compressed).await?;

        let result = manager.start_ambience().await;
        assert!(matches!(result, Err(PlaybackError::SourceUnavailable { .. })));
        assert!(!manager.is_ambience_playing().await);
        assert_eq!(device.plays_started(), 0);

        manager.stop_ambience().await;
        manager.stop_ambience().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_add_custom_sound_selects_and_dedupes() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let (manager, _) = manager(temp_dir.path(), QualityTier::Lossless).await?;

        let path = temp_dir.path().join("library/CHIMES/Gong.caf");
        let first = manager.add_custom_sound("Gong", &path, SoundCategory::Chime).await?;
        let second = manager.add_custom_sound("Big Gong", &path, SoundCategory::Chime).await?;

        assert_eq!(first.id, second.id);
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.chime_options.len(), 1);
        assert_eq!(snapshot.selected_chime.name, "Big Gong");

        let persisted = manager
            .settings()
            .load_option_list(SoundCategory::Chime)
            .await?
            .unwrap_or_default();
        assert_eq!(persisted.len(), 1);
        Ok(())
    }
}
