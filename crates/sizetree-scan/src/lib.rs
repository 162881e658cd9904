//! Parallel file-stat scanning engine for sizetree.
//!
//! # Overview
//!
//! `sizetree-scan` finds the files under a folder and looks up their sizes
//! on a fixed pool of worker units:
//!
//! - **Search** via [`FileSearch`] (default [`WalkSearch`], a jwalk walk with
//!   glob filtering and a result cap)
//! - **Worker units** that stat batches concurrently and honour a stop signal
//!   mid-batch
//! - **A worker pool** with a FIFO queue and forced or graceful teardown
//! - **An orchestrator** that partitions work, supersedes stale scans and
//!   publishes sorted, optionally grouped results
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sizetree_scan::{FsStat, ScanConfig, ScanOrchestrator, ScanOutcome, WalkSearch};
//!
//! # async fn run() -> Result<(), sizetree_scan::ScanError> {
//! let config = ScanConfig::new("/path/to/scan");
//! let orchestrator = ScanOrchestrator::new(config, Arc::new(WalkSearch), Arc::new(FsStat))?;
//!
//! if let ScanOutcome::Completed { files } = orchestrator.refresh().await {
//!     println!("{files} files");
//!     for record in orchestrator.files().iter().take(10) {
//!         println!("{:>10}  {}", record.human_readable_size, record.path.display());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! # fn watch(orchestrator: &sizetree_scan::ScanOrchestrator) {
//! let mut events = orchestrator.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//! # }
//! ```

mod batch;
mod cancel;
mod orchestrator;
mod pool;
mod search;
mod stat;
mod wire;
mod worker;

pub use batch::{chunk_size, partition};
pub use cancel::{CancellationToken, CancellationTokenSource, SubscriptionId};
pub use orchestrator::{ScanEvent, ScanOrchestrator, ScanOutcome, ScanState};
pub use pool::{PoolStatus, TaskHandle, WorkerPool};
pub use search::{FileSearch, SearchQuery, WalkSearch, walk};
pub use stat::{BoxFuture, FileStat, FsStat};
pub use wire::{STOP_SIGNAL, WorkerMessage, WorkerReply};

// Re-export core types for convenience
pub use sizetree_core::{
    FileGroup, FileRecord, ScanConfig, ScanError, ScanResult, SortKey, SortMode, TreeEntry,
};
