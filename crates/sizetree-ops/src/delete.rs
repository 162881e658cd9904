//! Deleting files and folders.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use jwalk::WalkDir;
use tracing::{debug, warn};

use crate::operation::{DeleteOptions, DeleteReport, OperationError};

/// Delete every path concurrently.
///
/// Failures never stop the other deletions; each one is recorded in the
/// report. Folders are removed recursively.
pub async fn delete_paths(paths: Vec<PathBuf>, options: DeleteOptions) -> DeleteReport {
    let attempts = paths.into_iter().map(|path| async move {
        // Removal is blocking I/O.
        let target = path.clone();
        let result = tokio::task::spawn_blocking(move || delete_one(&target, options))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e.to_string())));
        (path, result)
    });

    let mut report = DeleteReport::default();
    for (path, result) in join_all(attempts).await {
        match result {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes, "deleted");
                report.deleted += 1;
                report.bytes_freed += bytes;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "delete failed");
                report.failed += 1;
                report.errors.push(OperationError::new(path, err.to_string()));
            }
        }
    }

    report
}

/// Remove one item and return the bytes it held.
fn delete_one(path: &Path, options: DeleteOptions) -> io::Result<u64> {
    let metadata = fs::symlink_metadata(path)?;
    let bytes = if metadata.is_dir() {
        dir_size(path)
    } else {
        metadata.len()
    };

    if options.use_trash {
        trash::delete(path).map_err(|e| io::Error::other(e.to_string()))?;
    } else if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }

    Ok(bytes)
}

/// Total size of the regular files below `path`.
///
/// Symlinks are not followed and hidden entries count. Unreadable entries
/// are logged and left out of the total.
fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .skip_hidden(false)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry_result| match entry_result {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "unreadable entry left out of freed bytes");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| match entry.metadata() {
            Ok(metadata) => Some(metadata.len()),
            Err(err) => {
                debug!(path = %entry.path().display(), error = %err, "metadata unavailable");
                None
            }
        })
        .sum()
}
