//! Scan orchestration: search, partition, dispatch, collect, publish.
//!
//! A scan moves through `Idle -> Scanning -> Completed | Cancelled | Idle`.
//! Starting a new scan cancels the one in flight; only the newest scan may
//! publish, and the published list is replaced wholesale.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use strum::Display;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use sizetree_core::{
    FileGroup, FileRecord, ScanConfig, ScanError, ScanResult, SortKey, SortMode, TreeEntry,
    build_tree, group_by_extension,
};

use crate::batch::partition;
use crate::cancel::{CancellationToken, CancellationTokenSource};
use crate::pool::{PoolStatus, TaskHandle, WorkerPool};
use crate::search::{FileSearch, SearchQuery};
use crate::stat::FileStat;

/// Lifecycle of the most recent scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Completed,
    Cancelled,
}

/// How a call to [`ScanOrchestrator::refresh`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The view is hidden; nothing was scanned.
    Skipped,
    /// Results were published.
    Completed { files: usize },
    /// Superseded or cancelled; nothing was published.
    Cancelled,
    /// The scan failed; previous results are untouched.
    Failed { message: String },
}

/// Notifications for whoever renders the results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A scan started.
    Started { generation: u64 },
    /// A scan published `files` records totalling `total_size` bytes.
    Published {
        generation: u64,
        files: usize,
        total_size: u64,
    },
    /// A scan ended without publishing because it was cancelled.
    Cancelled { generation: u64 },
    /// A scan ended without publishing because it failed.
    Failed { generation: u64, message: String },
    /// Sort order or grouping changed; the published list was re-rendered.
    ViewChanged,
}

struct ActiveScan {
    generation: u64,
    source: CancellationTokenSource,
}

impl ActiveScan {
    fn abandon(self) {
        self.source.cancel();
        self.source.dispose();
    }
}

struct ViewState {
    state: ScanState,
    visible: bool,
    generation: u64,
    current: Option<ActiveScan>,
    files: Vec<FileRecord>,
    sort: SortMode,
    grouped: bool,
}

/// Per-scan handle checked at every await point.
struct ScanRun {
    generation: u64,
    token: CancellationToken,
    aborted: Arc<AtomicBool>,
}

impl ScanRun {
    fn is_cancelled(&self) -> bool {
        self.aborted.load(Ordering::SeqCst) || self.token.is_cancelled()
    }
}

/// Drives scans over its own worker pool and keeps the published results.
pub struct ScanOrchestrator {
    config: Mutex<ScanConfig>,
    pool: Arc<WorkerPool>,
    search: Arc<dyn FileSearch>,
    view: Mutex<ViewState>,
    events: broadcast::Sender<ScanEvent>,
}

impl ScanOrchestrator {
    /// Create an orchestrator with its own pool of
    /// [`ScanConfig::worker_count`] units.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: ScanConfig,
        search: Arc<dyn FileSearch>,
        stat: Arc<dyn FileStat>,
    ) -> ScanResult<Self> {
        let pool = WorkerPool::new(config.worker_count(), stat, config.stat_concurrency)?;
        Ok(Self::with_pool(config, pool, search))
    }

    /// Create an orchestrator that takes over `pool`.
    ///
    /// Cancelling a scan stops every unit of the pool, so the orchestrator
    /// must be its only user.
    pub fn with_pool(config: ScanConfig, pool: WorkerPool, search: Arc<dyn FileSearch>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config: Mutex::new(config),
            pool: Arc::new(pool),
            search,
            view: Mutex::new(ViewState {
                state: ScanState::Idle,
                visible: true,
                generation: 0,
                current: None,
                files: Vec::new(),
                sort: SortMode::default(),
                grouped: true,
            }),
            events,
        }
    }

    /// Subscribe to scan and view notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ScanEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Run a scan and publish its results.
    ///
    /// Cancels any scan already in flight. Never fails: errors are logged and
    /// reported as [`ScanOutcome::Failed`], leaving earlier results in place.
    pub async fn refresh(&self) -> ScanOutcome {
        let (run, query) = {
            let mut view = self.view();
            if !view.visible {
                debug!("view hidden, refresh skipped");
                return ScanOutcome::Skipped;
            }

            if let Some(previous) = view.current.take() {
                debug!(generation = previous.generation, "superseding scan in flight");
                previous.abandon();
            }

            view.generation += 1;
            let source = CancellationTokenSource::new();
            let run = ScanRun {
                generation: view.generation,
                token: source.token(),
                aborted: Arc::new(AtomicBool::new(false)),
            };

            let aborted = Arc::clone(&run.aborted);
            let pool = Arc::clone(&self.pool);
            run.token.on_cancellation_requested(move || {
                aborted.store(true, Ordering::SeqCst);
                pool.stop();
            });

            view.current = Some(ActiveScan {
                generation: run.generation,
                source,
            });
            view.state = ScanState::Scanning;

            let config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
            (run, SearchQuery::from_config(&config))
        };

        info!(generation = run.generation, root = %query.root.display(), "scan started");
        self.emit(ScanEvent::Started {
            generation: run.generation,
        });

        let result = self.execute(&run, &query).await;
        self.finish(&run, result)
    }

    async fn execute(&self, run: &ScanRun, query: &SearchQuery) -> ScanResult<Vec<FileRecord>> {
        let paths = self.search.find(query, run.token.clone()).await?;
        if run.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let total = paths.len();
        let batches = partition(paths, self.pool.size());
        debug!(
            generation = run.generation,
            total,
            batches = batches.len(),
            "dispatching batches"
        );

        let handles: Vec<TaskHandle> = batches
            .into_iter()
            .map(|batch| {
                if run.is_cancelled() {
                    TaskHandle::failed(ScanError::Cancelled)
                } else {
                    self.pool.submit(batch)
                }
            })
            .collect();

        let replies = futures::future::try_join_all(handles).await?;
        if run.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        Ok(replies.into_iter().flatten().collect())
    }

    fn finish(&self, run: &ScanRun, result: ScanResult<Vec<FileRecord>>) -> ScanOutcome {
        let mut view = self.view();
        let current = view.generation == run.generation;
        if current
            && let Some(active) = view.current.take_if(|a| a.generation == run.generation)
        {
            active.source.dispose();
        }

        match result {
            Ok(mut files) if current && !run.is_cancelled() => {
                view.sort.sort(&mut files);
                let count = files.len();
                let total_size = files.iter().map(|f| f.size).sum();
                view.files = files;
                view.state = ScanState::Completed;
                drop(view);

                info!(generation = run.generation, files = count, total_size, "scan published");
                self.emit(ScanEvent::Published {
                    generation: run.generation,
                    files: count,
                    total_size,
                });
                ScanOutcome::Completed { files: count }
            }
            Err(err) if !err.is_cancelled() && current && !run.is_cancelled() => {
                view.state = ScanState::Idle;
                drop(view);

                let message = err.to_string();
                error!(generation = run.generation, error = %err, "scan failed");
                self.emit(ScanEvent::Failed {
                    generation: run.generation,
                    message: message.clone(),
                });
                ScanOutcome::Failed { message }
            }
            _ => {
                if current {
                    view.state = ScanState::Cancelled;
                }
                drop(view);

                debug!(generation = run.generation, "scan cancelled, results discarded");
                self.emit(ScanEvent::Cancelled {
                    generation: run.generation,
                });
                ScanOutcome::Cancelled
            }
        }
    }

    /// Cancel the scan in flight, if any.
    pub fn cancel(&self) {
        let current = self.view().current.take();
        if let Some(active) = current {
            debug!(generation = active.generation, "scan cancelled by request");
            active.abandon();
        }
    }

    /// Show or hide the view.
    ///
    /// Hiding cancels the scan in flight. Showing starts a fresh scan and
    /// returns its outcome.
    pub async fn set_visible(&self, visible: bool) -> Option<ScanOutcome> {
        let was_visible = std::mem::replace(&mut self.view().visible, visible);
        match (was_visible, visible) {
            (true, false) => {
                self.cancel();
                None
            }
            (false, true) => Some(self.refresh().await),
            _ => None,
        }
    }

    /// Whether the view is shown.
    pub fn is_visible(&self) -> bool {
        self.view().visible
    }

    /// Point the scan at `folder` and rescan.
    pub async fn search_in_folder(&self, folder: impl Into<PathBuf>) -> ScanOutcome {
        let folder = folder.into();
        debug!(folder = %folder.display(), "scan root changed");
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .root = folder;
        self.refresh().await
    }

    /// Root the next scan will search.
    pub fn root(&self) -> PathBuf {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .root
            .clone()
    }

    /// State of the most recent scan.
    pub fn state(&self) -> ScanState {
        self.view().state
    }

    /// Published records in the current sort order.
    pub fn files(&self) -> Vec<FileRecord> {
        self.view().files.clone()
    }

    /// Published records grouped by extension.
    pub fn groups(&self) -> Vec<FileGroup> {
        group_by_extension(&self.view().files)
    }

    /// Top level of the rendered tree: groups when grouping is on, files
    /// otherwise.
    pub fn tree(&self) -> Vec<TreeEntry> {
        let view = self.view();
        build_tree(&view.files, view.grouped)
    }

    /// Current sort mode.
    pub fn sort_mode(&self) -> SortMode {
        self.view().sort
    }

    /// Re-sort the published list.
    pub fn sort(&self, mode: SortMode) {
        {
            let mut view = self.view();
            view.sort = mode;
            mode.sort(&mut view.files);
        }
        debug!(%mode, "sort mode changed");
        self.emit(ScanEvent::ViewChanged);
    }

    /// Sort by `key` with its natural direction: names ascending, sizes
    /// descending.
    pub fn sort_by(&self, key: SortKey) {
        self.sort(SortMode::for_key(key));
    }

    /// Flip the direction of the current sort key.
    pub fn toggle_direction(&self) {
        let mode = self.sort_mode().reverse();
        self.sort(mode);
    }

    /// Whether results are grouped by extension.
    pub fn is_grouped(&self) -> bool {
        self.view().grouped
    }

    /// Turn grouping by extension on or off.
    pub fn set_grouped(&self, grouped: bool) {
        self.view().grouped = grouped;
        self.emit(ScanEvent::ViewChanged);
    }

    /// Snapshot of the underlying pool.
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Cancel any scan and tear the pool down.
    pub fn shutdown(&self) -> ScanResult<()> {
        self.cancel();
        self.pool.destroy(true)
    }
}

impl Drop for ScanOrchestrator {
    fn drop(&mut self) {
        self.cancel();
    }
}
