//! Scan configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Upper bound on automatically sized worker pools.
pub const MAX_AUTO_WORKERS: usize = 6;

/// Largest batch handed to a single worker unit.
pub const MAX_BATCH_SIZE: usize = 400;

/// Configuration for scanning operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root folder to search.
    pub root: PathBuf,

    /// Glob (relative to `root`) a file must match to be scanned.
    #[builder(default = "default_include()")]
    #[serde(default = "default_include")]
    pub include: String,

    /// Globs (relative to `root`) excluding files and whole folders.
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Cap on the number of paths the search may return.
    #[builder(default = "default_max_results()")]
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Number of worker units (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub workers: usize,

    /// Stat calls a single worker keeps in flight.
    #[builder(default = "default_stat_concurrency()")]
    #[serde(default = "default_stat_concurrency")]
    pub stat_concurrency: usize,

    /// Follow symbolic links while searching.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,
}

fn default_true() -> bool {
    true
}

fn default_include() -> String {
    "**/*".to_string()
}

fn default_max_results() -> usize {
    100_000
}

fn default_stat_concurrency() -> usize {
    64
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if self.max_results == Some(0) {
            return Err("max_results must be greater than zero".to_string());
        }
        if self.stat_concurrency == Some(0) {
            return Err("stat_concurrency must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: default_include(),
            exclude_patterns: Vec::new(),
            max_results: default_max_results(),
            workers: 0,
            stat_concurrency: default_stat_concurrency(),
            follow_symlinks: false,
            include_hidden: true,
        }
    }

    /// Effective worker count: the configured value, or the available
    /// parallelism capped at [`MAX_AUTO_WORKERS`].
    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(MAX_AUTO_WORKERS),
            n => n,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Value of one entry in a host exclude map.
///
/// Only a literal `true` enables a pattern; conditional entries
/// (`{ when = "$(basename).ts" }`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternValue {
    Enabled(bool),
    Sibling { when: String },
}

/// Ordered glob → enabled map, as stored in `files.exclude`.
pub type PatternMap = IndexMap<String, PatternValue>;

/// Merge exclude maps and return the enabled patterns.
///
/// Later maps override earlier ones key by key; keys keep the position of
/// their first appearance.
pub fn resolve_patterns<'a>(maps: impl IntoIterator<Item = Option<&'a PatternMap>>) -> Vec<String> {
    let mut merged: IndexMap<&str, &PatternValue> = IndexMap::new();
    for map in maps.into_iter().flatten() {
        for (pattern, value) in map {
            merged.insert(pattern.as_str(), value);
        }
    }

    merged
        .into_iter()
        .filter(|(_, value)| matches!(value, PatternValue::Enabled(true)))
        .map(|(pattern, _)| pattern.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .root("/home/user")
            .workers(4usize)
            .max_results(500usize)
            .exclude_patterns(vec!["**/target".to_string()])
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/home/user"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.worker_count(), 4);
        assert_eq!(config.max_results, 500);
        assert_eq!(config.include, "**/*");
        assert_eq!(config.stat_concurrency, 64);
    }

    #[test]
    fn test_config_validation() {
        assert!(ScanConfig::builder().build().is_err());
        assert!(ScanConfig::builder().root("").build().is_err());
        assert!(
            ScanConfig::builder()
                .root("/x")
                .max_results(0usize)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_auto_worker_count_is_capped() {
        let config = ScanConfig::new("/x");
        let count = config.worker_count();
        assert!(count >= 1);
        assert!(count <= MAX_AUTO_WORKERS);
    }

    #[test]
    fn test_resolve_patterns_merges_in_order() {
        let mut exclude = PatternMap::new();
        exclude.insert("**/.git".into(), PatternValue::Enabled(true));
        exclude.insert("**/dist".into(), PatternValue::Enabled(true));
        exclude.insert(
            "**/*.js".into(),
            PatternValue::Sibling {
                when: "$(basename).ts".into(),
            },
        );

        let mut watcher = PatternMap::new();
        watcher.insert("**/dist".into(), PatternValue::Enabled(false));
        watcher.insert("**/node_modules".into(), PatternValue::Enabled(true));

        let patterns = resolve_patterns([Some(&exclude), None, Some(&watcher)]);
        assert_eq!(patterns, ["**/.git", "**/node_modules"]);
    }
}
