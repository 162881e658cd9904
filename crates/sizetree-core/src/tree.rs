//! Grouped view over scanned file records.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::record::{FileRecord, format_size};
use crate::sort::compare_names;

/// Files sharing one extension, with aggregate figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileGroup {
    /// Extension key including the dot (`.txt`), empty for no extension.
    pub extension: String,
    /// Files in this group, in the order of the input list.
    pub files: Vec<FileRecord>,
    /// Sum of `size` over `files`.
    pub total_size: u64,
    /// Share of the grand total, 0.0 to 100.0.
    pub percent: f64,
}

impl FileGroup {
    /// Number of files in the group.
    pub fn count(&self) -> usize {
        self.files.len()
    }

    /// Display label for the group.
    pub fn label(&self) -> &str {
        if self.extension.is_empty() {
            "(no extension)"
        } else {
            &self.extension
        }
    }

    /// Human readable total size.
    pub fn human_readable_size(&self) -> String {
        format_size(self.total_size)
    }
}

/// One row of the size tree: either a group with children or a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeEntry {
    /// Extension group carrying its files as children.
    Group(FileGroup),
    /// A single file leaf.
    File(FileRecord),
}

impl TreeEntry {
    /// Children of this entry; files have none.
    pub fn children(&self) -> Vec<TreeEntry> {
        match self {
            TreeEntry::Group(group) => group.files.iter().cloned().map(TreeEntry::File).collect(),
            TreeEntry::File(_) => Vec::new(),
        }
    }

    /// Size shown for this entry.
    pub fn size(&self) -> u64 {
        match self {
            TreeEntry::Group(group) => group.total_size,
            TreeEntry::File(file) => file.size,
        }
    }

    /// Label shown for this entry.
    pub fn label(&self) -> &str {
        match self {
            TreeEntry::Group(group) => group.label(),
            TreeEntry::File(file) => file.name.as_str(),
        }
    }
}

/// Partition `files` by extension.
///
/// Groups come back ordered by extension; files inside a group keep the
/// order they had in `files`, so a sorted input yields sorted groups.
pub fn group_by_extension(files: &[FileRecord]) -> Vec<FileGroup> {
    let grand_total: u64 = files.iter().map(|f| f.size).sum();

    files
        .iter()
        .cloned()
        .into_group_map_by(FileRecord::extension)
        .into_iter()
        .map(|(extension, files)| {
            let total_size = files.iter().map(|f| f.size).sum();
            FileGroup {
                extension,
                percent: percent_of(total_size, grand_total),
                total_size,
                files,
            }
        })
        .sorted_by(|a, b| compare_names(&a.extension, &b.extension))
        .collect()
}

/// Build the top level of the tree, grouped or flat.
pub fn build_tree(files: &[FileRecord], grouped: bool) -> Vec<TreeEntry> {
    if grouped {
        group_by_extension(files)
            .into_iter()
            .map(TreeEntry::Group)
            .collect()
    } else {
        files.iter().cloned().map(TreeEntry::File).collect()
    }
}

fn percent_of(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
