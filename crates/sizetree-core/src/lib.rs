//! Core types for sizetree.
//!
//! This crate provides the data structures shared by the scanner, the file
//! operations and the CLI: file records, grouping, sort policies,
//! configuration and errors.

mod config;
mod error;
mod filter;
mod record;
mod settings;
mod sort;
mod tree;

pub use config::{
    MAX_AUTO_WORKERS, MAX_BATCH_SIZE, PatternMap, PatternValue, ScanConfig, ScanConfigBuilder,
    resolve_patterns,
};
pub use error::{ScanError, ScanResult};
pub use filter::{PathFilter, exclude_glob};
pub use record::{FileRecord, extension_key, format_size};
pub use settings::{FileSettings, Settings, ViewSettings};
pub use sort::{SortKey, SortMode, compare_names};
pub use tree::{FileGroup, TreeEntry, build_tree, group_by_extension};
