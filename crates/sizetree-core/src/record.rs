//! Per-file size records.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use humansize::WINDOWS;
use serde::{Deserialize, Serialize};

/// Size information for a single scanned file.
///
/// Records are produced by worker units and never mutated afterwards; a new
/// scan replaces the whole collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// File name (last path component).
    pub name: CompactString,
    /// Size in bytes.
    pub size: u64,
    /// Display form of `size`.
    pub human_readable_size: String,
    /// Full path of the file.
    pub path: PathBuf,
}

impl FileRecord {
    /// Build a record for `path` with the given byte size.
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| CompactString::new(n.to_string_lossy()))
            .unwrap_or_else(|| CompactString::new(path.to_string_lossy()));

        Self {
            name,
            size,
            human_readable_size: format_size(size),
            path,
        }
    }

    /// Extension key used for grouping, including the leading dot.
    ///
    /// Files without an extension (including dotfiles such as `.bashrc`)
    /// map to the empty string.
    pub fn extension(&self) -> String {
        extension_key(&self.path)
    }
}

/// Extension of `path` as `.ext`, or an empty string.
pub fn extension_key(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Format a byte count for display.
///
/// Zero bytes render as `n/a`; everything else uses a 1024 base with `kB`
/// style units and at most one decimal place.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "n/a".to_string();
    }
    humansize::format_size(bytes, WINDOWS.decimal_places(1))
}
