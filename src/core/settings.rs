//! Loader settings and the read-only view the engine consumes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::util::Result;

/// Read-only policy switches consulted while decoding.
pub trait SettingsProvider: Send + Sync {
    /// Reuse textures already materialized for the same checksum.
    fn share_textures(&self) -> bool;
    /// Reuse meshes already materialized for the same checksum.
    fn share_meshes(&self) -> bool;
    /// Reuse materials already materialized for the same checksum.
    fn share_materials(&self) -> bool;
    /// Skip prefab content of DLCs listed by [`SettingsProvider::skip_dlc`].
    fn skip_prefabs(&self) -> bool {
        false
    }
    /// True if the given DLC id is in the skip list.
    fn skip_dlc(&self, _id: u32) -> bool {
        false
    }
}

/// User-facing loader settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    pub load_enabled_assets: bool,
    pub load_used_assets: bool,
    pub share_textures: bool,
    pub share_materials: bool,
    pub share_meshes: bool,
    pub optimize_thumbnails: bool,
    pub skip_prefabs: bool,
    pub skip_dlcs: Vec<u32>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            load_enabled_assets: true,
            load_used_assets: true,
            share_textures: false,
            share_materials: false,
            share_meshes: false,
            optimize_thumbnails: true,
            skip_prefabs: false,
            skip_dlcs: Vec::new(),
        }
    }
}

impl LoaderSettings {
    /// Settings with all three sharing switches on.
    pub fn sharing_all() -> Self {
        Self {
            share_textures: true,
            share_materials: true,
            share_meshes: true,
            ..Self::default()
        }
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("assetpack");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load from the default path, falling back to defaults on any failure.
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable settings {}: {}", path.display(), e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    /// Save settings to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Whether content of an owned DLC should be loaded.
    pub fn allows_dlc(&self, owned: bool, id: u32) -> bool {
        owned && (!self.skip_prefabs || !self.skip_dlc(id))
    }
}

impl SettingsProvider for LoaderSettings {
    fn share_textures(&self) -> bool {
        self.share_textures
    }

    fn share_meshes(&self) -> bool {
        self.share_meshes
    }

    fn share_materials(&self) -> bool {
        self.share_materials
    }

    fn skip_prefabs(&self) -> bool {
        self.skip_prefabs
    }

    fn skip_dlc(&self, id: u32) -> bool {
        self.skip_dlcs.contains(&id)
    }
}

/// Engine-side session options (not user toggles).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Quiescence window after which pooled buffers and shared caches are
    /// dropped. `None` keeps them until the session is closed.
    pub idle_timeout: Option<Duration>,
    /// Initial capacity of each shared-object cache.
    pub cache_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(5 * 60)),
            cache_capacity: 256,
        }
    }
}
