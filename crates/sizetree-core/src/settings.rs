//! User settings persisted as TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{PatternMap, PatternValue, resolve_patterns};
use crate::error::{ScanError, ScanResult};
use crate::sort::SortMode;

/// Settings file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// File exclusion maps.
    pub files: FileSettings,
    /// Initial presentation of results.
    pub view: ViewSettings,
}

/// The `[files]` table: host-style exclusion maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    /// Patterns hidden from results.
    pub exclude: PatternMap,
    /// Patterns the host never watches; merged into `exclude` for scans.
    #[serde(rename = "watcherExclude")]
    pub watcher_exclude: PatternMap,
}

impl Default for FileSettings {
    fn default() -> Self {
        let enabled = |patterns: &[&str]| -> PatternMap {
            patterns
                .iter()
                .map(|p| (p.to_string(), PatternValue::Enabled(true)))
                .collect()
        };

        Self {
            exclude: enabled(&[
                "**/.git",
                "**/.svn",
                "**/.hg",
                "**/CVS",
                "**/.DS_Store",
                "**/Thumbs.db",
            ]),
            watcher_exclude: enabled(&["**/node_modules"]),
        }
    }
}

/// The `[view]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Initial sort mode.
    pub sort: SortMode,
    /// Group files by extension.
    pub group: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            sort: SortMode::default(),
            group: true,
        }
    }
}

impl Settings {
    /// Get the config file path.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sizetree").join("settings.toml"))
    }

    /// Load settings from the default location, or return defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path().filter(|p| p.exists()) else {
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable settings");
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file.
    pub fn load_from(path: &Path) -> ScanResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        toml::from_str(&content).map_err(|e| ScanError::InvalidConfig {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Enabled exclude patterns from both maps.
    pub fn exclude_patterns(&self) -> Vec<String> {
        resolve_patterns([Some(&self.files.exclude), Some(&self.files.watcher_exclude)])
    }
}
