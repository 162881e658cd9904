//! Error types for scanning operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while discovering, stat-ing or scheduling files.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The governing cancellation token was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// A pool was torn down while one of its workers still held a task.
    #[error("Worker {id} is still running")]
    ActiveWorker { id: usize },

    /// A worker stopped before replying to its task.
    #[error("Worker {id} exited before replying")]
    WorkerExited { id: usize },

    /// The worker pool has been destroyed.
    #[error("Worker pool has been destroyed")]
    PoolDestroyed,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A glob pattern failed to compile.
    #[error("Invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Whether this error only signals cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result alias used across the sizetree crates.
pub type ScanResult<T> = Result<T, ScanError>;
