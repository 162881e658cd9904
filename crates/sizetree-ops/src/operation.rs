//! Operation types shared by the file operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a delete should be carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Move items to the system trash instead of removing them.
    pub use_trash: bool,
}

impl DeleteOptions {
    /// Options that move items to the trash.
    pub fn with_trash() -> Self {
        Self { use_trash: true }
    }
}

/// An error that occurred for one item of a file operation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{}: {message}", path.display())]
pub struct OperationError {
    /// The path that caused the error.
    pub path: PathBuf,
    /// A human-readable error message.
    pub message: String,
}

impl OperationError {
    /// Create a new operation error.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a delete across all requested paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Items removed (or trashed).
    pub deleted: usize,
    /// Items that could not be removed.
    pub failed: usize,
    /// Bytes held by the removed items.
    pub bytes_freed: u64,
    /// One entry per failed item.
    pub errors: Vec<OperationError>,
}

impl DeleteReport {
    /// Check if every item was removed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// One-line summary for the user.
    pub fn summary(&self) -> String {
        let freed = sizetree_core::format_size(self.bytes_freed);
        if self.is_success() {
            format!("Deleted {} items, freed {}", self.deleted, freed)
        } else {
            format!(
                "Deleted {}, failed {} (freed {})",
                self.deleted, self.failed, freed
            )
        }
    }
}
