//! File discovery.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jwalk::WalkDir;
use tracing::{debug, info};

use sizetree_core::{PathFilter, ScanConfig, ScanError, ScanResult};

use crate::cancel::CancellationToken;
use crate::stat::BoxFuture;

/// What to look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Folder to search.
    pub root: PathBuf,
    /// Glob (relative to `root`) files must match.
    pub include: String,
    /// Globs (relative to `root`) excluding files and whole folders.
    pub exclude: Vec<String>,
    /// Stop after this many files.
    pub max_results: usize,
    /// Follow symbolic links.
    pub follow_symlinks: bool,
    /// Report hidden files and descend into hidden folders.
    pub include_hidden: bool,
}

impl SearchQuery {
    /// Query described by a scan config.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            root: config.root.clone(),
            include: config.include.clone(),
            exclude: config.exclude_patterns.clone(),
            max_results: config.max_results,
            follow_symlinks: config.follow_symlinks,
            include_hidden: config.include_hidden,
        }
    }
}

/// Finds the files a scan should stat.
pub trait FileSearch: Send + Sync {
    /// Paths of matching files, at most `query.max_results` of them.
    ///
    /// Fails with [`ScanError::Cancelled`] if `token` is cancelled before the
    /// search finishes.
    fn find<'a>(
        &'a self,
        query: &'a SearchQuery,
        token: CancellationToken,
    ) -> BoxFuture<'a, ScanResult<Vec<PathBuf>>>;
}

/// Parallel directory walk with jwalk.
///
/// Excluded folders are pruned before they are read.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkSearch;

impl FileSearch for WalkSearch {
    fn find<'a>(
        &'a self,
        query: &'a SearchQuery,
        token: CancellationToken,
    ) -> BoxFuture<'a, ScanResult<Vec<PathBuf>>> {
        let query = query.clone();
        Box::pin(async move {
            token.error_if_cancelled()?;

            let stop = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stop);
            token.on_cancellation_requested(move || flag.store(true, Ordering::SeqCst));

            let paths = tokio::task::spawn_blocking(move || walk(&query, &stop))
                .await
                .map_err(|e| ScanError::Other {
                    message: format!("search task failed: {e}"),
                })??;

            token.error_if_cancelled()?;
            Ok(paths)
        })
    }
}

/// Blocking walk behind [`WalkSearch`].
pub fn walk(query: &SearchQuery, stop: &AtomicBool) -> ScanResult<Vec<PathBuf>> {
    let root = query
        .root
        .canonicalize()
        .map_err(|e| ScanError::io(&query.root, e))?;
    if !root.is_dir() {
        return Err(ScanError::NotADirectory { path: root });
    }

    let filter = Arc::new(PathFilter::new(&query.include, &query.exclude)?);

    let prune_root = root.clone();
    let prune_filter = Arc::clone(&filter);
    let walker = WalkDir::new(&root)
        .skip_hidden(!query.include_hidden)
        .follow_links(query.follow_symlinks)
        .sort(true)
        .process_read_dir(move |_depth, _dir, _state, children| {
            children.retain(|child| match child {
                Ok(entry) => {
                    let path = entry.path();
                    let relative = path.strip_prefix(&prune_root).unwrap_or(&path);
                    !prune_filter.is_excluded(relative)
                }
                Err(_) => true,
            });
        });

    let mut paths = Vec::new();
    for entry_result in walker {
        if stop.load(Ordering::SeqCst) {
            debug!(found = paths.len(), "search cancelled");
            return Err(ScanError::Cancelled);
        }

        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                debug!(error = %err, "unreadable entry skipped");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(&path);
        if !filter.accepts(relative) {
            continue;
        }

        paths.push(path);
        if paths.len() >= query.max_results {
            info!(max_results = query.max_results, "search result cap reached");
            break;
        }
    }

    debug!(root = %root.display(), found = paths.len(), "search finished");
    Ok(paths)
}
