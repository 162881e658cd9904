//! Worker units: long-lived tasks that stat batches of paths.
//!
//! A unit handles one message at a time. While a batch is running it keeps
//! listening to its inbox so a `Stop` is observed mid-batch.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;

use futures::{FutureExt, StreamExt, stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use sizetree_core::FileRecord;

use crate::cancel::{CancellationToken, CancellationTokenSource};
use crate::stat::FileStat;
use crate::wire::{WorkerMessage, WorkerReply};

/// Pool-side handle to a spawned unit.
pub(crate) struct UnitHandle {
    pub(crate) inbox: mpsc::UnboundedSender<WorkerMessage>,
    pub(crate) task: JoinHandle<()>,
}

/// Spawn unit `id` on the current runtime.
///
/// Returns the handle plus the receiving end of the unit's reply channel. The
/// channel closes when the unit exits.
pub(crate) fn spawn_unit(
    id: usize,
    stat: Arc<dyn FileStat>,
    stat_concurrency: usize,
) -> (UnitHandle, mpsc::UnboundedReceiver<WorkerReply>) {
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    let unit = WorkerUnit {
        id,
        stat,
        stat_concurrency: stat_concurrency.max(1),
        inbox: inbox_rx,
        replies: reply_tx,
        current: CancellationTokenSource::new(),
    };
    let task = tokio::spawn(unit.run());

    (
        UnitHandle {
            inbox: inbox_tx,
            task,
        },
        reply_rx,
    )
}

struct WorkerUnit {
    id: usize,
    stat: Arc<dyn FileStat>,
    stat_concurrency: usize,
    inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    replies: mpsc::UnboundedSender<WorkerReply>,
    current: CancellationTokenSource,
}

impl WorkerUnit {
    async fn run(mut self) {
        trace!(unit = self.id, "worker unit started");

        while let Some(message) = self.inbox.recv().await {
            match message {
                WorkerMessage::Stop => {
                    trace!(unit = self.id, "stop received while idle");
                    self.current.cancel();
                }
                WorkerMessage::Batch(paths) => {
                    let reply = self.process(paths).await;
                    if self.replies.send(reply).is_err() {
                        break;
                    }
                }
            }
        }

        self.current.dispose();
        trace!(unit = self.id, "worker unit exiting");
    }

    async fn process(&mut self, paths: Vec<PathBuf>) -> WorkerReply {
        self.current.dispose();
        self.current = CancellationTokenSource::new();

        let requested = paths.len();
        let work = AssertUnwindSafe(stat_batch(
            Arc::clone(&self.stat),
            paths,
            self.current.token(),
            self.stat_concurrency,
        ))
        .catch_unwind();
        let mut work = pin!(work);
        let mut inbox_open = true;

        let outcome = loop {
            tokio::select! {
                outcome = &mut work => break outcome,
                message = self.inbox.recv(), if inbox_open => match message {
                    Some(WorkerMessage::Stop) => {
                        debug!(unit = self.id, "stop received mid-batch");
                        self.current.cancel();
                    }
                    Some(WorkerMessage::Batch(extra)) => {
                        warn!(unit = self.id, dropped = extra.len(), "batch received while busy");
                    }
                    None => {
                        inbox_open = false;
                        self.current.cancel();
                    }
                },
            }
        };

        match outcome {
            Ok(records) => {
                trace!(unit = self.id, requested, returned = records.len(), "batch finished");
                records
            }
            Err(payload) => {
                error!(
                    unit = self.id,
                    requested,
                    "batch processing panicked: {}",
                    panic_message(payload.as_ref())
                );
                Vec::new()
            }
        }
    }
}

/// Stat `paths` with at most `concurrency` calls in flight.
///
/// Paths not yet started when `token` is cancelled are skipped, and results
/// that arrive after cancellation are dropped.
async fn stat_batch(
    stat: Arc<dyn FileStat>,
    paths: Vec<PathBuf>,
    token: CancellationToken,
    concurrency: usize,
) -> Vec<FileRecord> {
    stream::iter(paths)
        .map(|path| {
            let stat = Arc::clone(&stat);
            let token = token.clone();
            async move { stat_one(stat.as_ref(), path, &token).await }
        })
        .buffer_unordered(concurrency)
        .filter_map(|record| async move { record })
        .collect()
        .await
}

async fn stat_one(
    stat: &dyn FileStat,
    path: PathBuf,
    token: &CancellationToken,
) -> Option<FileRecord> {
    if token.is_cancelled() {
        return None;
    }

    match stat.stat(&path).await {
        Ok(_) if token.is_cancelled() => None,
        Ok(size) => Some(FileRecord::new(path, size)),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "stat failed, entry dropped");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::path::Path;
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use super::*;
    use crate::stat::BoxFuture;

    struct MapStat {
        sizes: HashMap<PathBuf, u64>,
        gate: Option<Arc<Semaphore>>,
    }

    impl FileStat for MapStat {
        fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>> {
            Box::pin(async move {
                if let Some(gate) = &self.gate {
                    gate.acquire().await.unwrap().forget();
                }
                self.sizes
                    .get(path)
                    .copied()
                    .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
            })
        }
    }

    struct PanicStat;

    impl FileStat for PanicStat {
        fn stat<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, io::Result<u64>> {
            Box::pin(async { panic!("stat exploded") })
        }
    }

    fn sizes() -> HashMap<PathBuf, u64> {
        HashMap::from([
            (PathBuf::from("/w/a.txt"), 100),
            (PathBuf::from("/w/b.txt"), 1500),
        ])
    }

    #[tokio::test]
    async fn test_batch_drops_failed_stats() {
        let stat = Arc::new(MapStat {
            sizes: sizes(),
            gate: None,
        });
        let (unit, mut replies) = spawn_unit(0, stat, 4);

        unit.inbox
            .send(WorkerMessage::Batch(vec![
                "/w/a.txt".into(),
                "/w/b.txt".into(),
                "/w/missing".into(),
            ]))
            .unwrap();

        let mut reply = replies.recv().await.unwrap();
        reply.sort_by_key(|r| r.size);
        let sizes: Vec<u64> = reply.iter().map(|r| r.size).collect();
        assert_eq!(sizes, [100, 1500]);
    }

    #[tokio::test]
    async fn test_empty_batch_still_replies() {
        let stat = Arc::new(MapStat {
            sizes: sizes(),
            gate: None,
        });
        let (unit, mut replies) = spawn_unit(0, stat, 4);

        unit.inbox.send(WorkerMessage::Batch(Vec::new())).unwrap();
        assert!(replies.recv().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_mid_batch_replies_early() {
        let gate = Arc::new(Semaphore::new(0));
        let stat = Arc::new(MapStat {
            sizes: sizes(),
            gate: Some(Arc::clone(&gate)),
        });
        let (unit, mut replies) = spawn_unit(0, stat, 1);

        unit.inbox
            .send(WorkerMessage::Batch(vec!["/w/a.txt".into(), "/w/b.txt".into()]))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        unit.inbox.send(WorkerMessage::Stop).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.add_permits(10);

        let reply = tokio::time::timeout(Duration::from_secs(5), replies.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(reply.is_empty());

        // The next batch runs under a fresh token.
        unit.inbox
            .send(WorkerMessage::Batch(vec!["/w/b.txt".into()]))
            .unwrap();
        let reply = replies.recv().await.unwrap();
        assert_eq!(reply.len(), 1);
        assert_eq!(reply[0].size, 1500);
    }

    #[tokio::test]
    async fn test_panic_yields_empty_reply() {
        let (unit, mut replies) = spawn_unit(3, Arc::new(PanicStat), 2);

        unit.inbox
            .send(WorkerMessage::Batch(vec!["/w/a.txt".into()]))
            .unwrap();
        assert!(replies.recv().await.unwrap().is_empty());

        // The unit survives and keeps serving.
        unit.inbox.send(WorkerMessage::Batch(Vec::new())).unwrap();
        assert!(replies.recv().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unit_exits_when_inbox_closes() {
        let stat = Arc::new(MapStat {
            sizes: sizes(),
            gate: None,
        });
        let (unit, mut replies) = spawn_unit(0, stat, 1);

        drop(unit.inbox);
        assert!(replies.recv().await.is_none());
        unit.task.await.unwrap();
    }
}
