//! Fixed-size pool of worker units with a FIFO task queue.
//!
//! Every bookkeeping transition (dispatch, reply, exit, stop, destroy)
//! happens under a single mutex, so at any instant `active <= size` and a
//! non-empty queue implies every live unit is busy.

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use sizetree_core::{FileRecord, ScanError, ScanResult};

use crate::stat::FileStat;
use crate::wire::{WorkerMessage, WorkerReply};
use crate::worker::{self, UnitHandle};

type TaskResult = ScanResult<Vec<FileRecord>>;

/// Snapshot of pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of units the pool was created with.
    pub size: usize,
    /// Units currently holding a task.
    pub active: usize,
    /// Tasks waiting for a unit.
    pub queued: usize,
    /// Whether [`WorkerPool::destroy`] has run.
    pub destroyed: bool,
}

/// Future resolving to the records of one submitted batch.
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle {
    inner: HandleInner,
}

enum HandleInner {
    Pending(oneshot::Receiver<TaskResult>),
    Failed(Option<ScanError>),
}

impl TaskHandle {
    fn pending(rx: oneshot::Receiver<TaskResult>) -> Self {
        Self {
            inner: HandleInner::Pending(rx),
        }
    }

    /// A handle that resolves to `err` without touching any unit.
    pub(crate) fn failed(err: ScanError) -> Self {
        Self {
            inner: HandleInner::Failed(Some(err)),
        }
    }
}

impl Future for TaskHandle {
    type Output = TaskResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            HandleInner::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or(Err(ScanError::PoolDestroyed))),
            HandleInner::Failed(err) => {
                Poll::Ready(Err(err.take().unwrap_or(ScanError::PoolDestroyed)))
            }
        }
    }
}

struct Task {
    paths: Vec<PathBuf>,
    reply: oneshot::Sender<TaskResult>,
}

impl Task {
    fn reject(self, err: ScanError) {
        // The submitter may have stopped waiting.
        let _ = self.reply.send(Err(err));
    }
}

struct UnitSlot {
    inbox: mpsc::UnboundedSender<WorkerMessage>,
    task: JoinHandle<()>,
    active: bool,
    exited: bool,
    pending: Option<oneshot::Sender<TaskResult>>,
}

struct PoolState {
    units: Vec<UnitSlot>,
    queue: VecDeque<Task>,
    destroyed: bool,
}

impl PoolState {
    fn idle_unit(&self) -> Option<usize> {
        self.units.iter().position(|u| !u.active && !u.exited)
    }

    fn all_exited(&self) -> bool {
        self.units.iter().all(|u| u.exited)
    }

    fn dispatch(&mut self, id: usize, task: Task) {
        let unit = &mut self.units[id];
        trace!(unit = id, paths = task.paths.len(), "dispatching batch");

        match unit.inbox.send(WorkerMessage::Batch(task.paths)) {
            Ok(()) => {
                unit.active = true;
                unit.pending = Some(task.reply);
            }
            Err(_) => {
                unit.exited = true;
                let _ = task.reply.send(Err(ScanError::WorkerExited { id }));
            }
        }
    }
}

struct Shared {
    state: Mutex<PoolState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settle unit `id`'s task and hand it the next queued one.
    fn settle(&self, id: usize, reply: WorkerReply) {
        let mut state = self.lock();

        let exited = {
            let unit = &mut state.units[id];
            let Some(pending) = unit.pending.take() else {
                debug!(unit = id, "reply without a pending task ignored");
                return;
            };
            unit.active = false;
            if pending.send(Ok(reply)).is_err() {
                trace!(unit = id, "submitter gone, reply discarded");
            }
            unit.exited
        };

        if !exited && let Some(next) = state.queue.pop_front() {
            state.dispatch(id, next);
        }
    }

    /// Unit `id`'s reply channel closed: it will never reply again.
    fn unit_exited(&self, id: usize) {
        let mut state = self.lock();
        let destroyed = state.destroyed;

        let unit = &mut state.units[id];
        unit.exited = true;
        unit.active = false;
        if let Some(pending) = unit.pending.take() {
            warn!(unit = id, "worker unit exited with a task in flight");
            let _ = pending.send(Err(ScanError::WorkerExited { id }));
        } else if !destroyed {
            warn!(unit = id, "worker unit exited");
        }

        if state.all_exited() {
            for task in state.queue.drain(..) {
                task.reject(ScanError::WorkerExited { id });
            }
        }
    }
}

/// A fixed set of worker units fed from a FIFO queue.
///
/// Must be created inside a tokio runtime; units are spawned immediately and
/// reused for every task.
pub struct WorkerPool {
    shared: Arc<Shared>,
    listeners: Vec<JoinHandle<()>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` units that stat with `stat`, each keeping at most
    /// `stat_concurrency` calls in flight.
    pub fn new(size: usize, stat: Arc<dyn FileStat>, stat_concurrency: usize) -> ScanResult<Self> {
        if size < 1 {
            return Err(ScanError::InvalidConfig {
                message: "Number of workers must be at least 1".to_string(),
            });
        }

        let mut units = Vec::with_capacity(size);
        let mut replies = Vec::with_capacity(size);
        for id in 0..size {
            let (UnitHandle { inbox, task }, reply_rx) =
                worker::spawn_unit(id, Arc::clone(&stat), stat_concurrency);
            units.push(UnitSlot {
                inbox,
                task,
                active: false,
                exited: false,
                pending: None,
            });
            replies.push(reply_rx);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                units,
                queue: VecDeque::new(),
                destroyed: false,
            }),
        });

        let listeners = replies
            .into_iter()
            .enumerate()
            .map(|(id, mut reply_rx)| {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    while let Some(reply) = reply_rx.recv().await {
                        shared.settle(id, reply);
                    }
                    shared.unit_exited(id);
                })
            })
            .collect();

        debug!(size, stat_concurrency, "worker pool started");
        Ok(Self {
            shared,
            listeners,
            size,
        })
    }

    /// Number of units.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a batch.
    ///
    /// The batch goes to the lowest-numbered idle unit right away, or waits
    /// in FIFO order for the next unit to reply.
    pub fn submit(&self, paths: Vec<PathBuf>) -> TaskHandle {
        let mut state = self.shared.lock();
        if state.destroyed || state.all_exited() {
            return TaskHandle::failed(ScanError::PoolDestroyed);
        }

        let (reply, rx) = oneshot::channel();
        let task = Task { paths, reply };
        match state.idle_unit() {
            Some(id) => state.dispatch(id, task),
            None => {
                trace!(queued = state.queue.len() + 1, "all units busy, batch queued");
                state.queue.push_back(task);
            }
        }

        TaskHandle::pending(rx)
    }

    /// Submit a batch and wait for its records.
    pub async fn run(&self, paths: Vec<PathBuf>) -> ScanResult<Vec<FileRecord>> {
        self.submit(paths).await
    }

    /// Tell every unit to abandon its batch and reject queued tasks with
    /// [`ScanError::Cancelled`].
    ///
    /// Units that are mid-batch still reply, usually with a partial or empty
    /// list, and their submitters receive that reply.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        for unit in state.units.iter().filter(|u| !u.exited) {
            let _ = unit.inbox.send(WorkerMessage::Stop);
        }

        let dropped = state.queue.len();
        for task in state.queue.drain(..) {
            task.reject(ScanError::Cancelled);
        }
        debug!(dropped, "stop sent to worker units");
    }

    /// Tear the pool down.
    ///
    /// Without `force`, fails with [`ScanError::ActiveWorker`] if any unit
    /// holds a task, and nothing is terminated. Otherwise every unit is
    /// aborted and all outstanding tasks fail with
    /// [`ScanError::PoolDestroyed`]. Destroying twice is a no-op.
    pub fn destroy(&self, force: bool) -> ScanResult<()> {
        let mut state = self.shared.lock();
        if state.destroyed {
            return Ok(());
        }

        if !force && let Some(id) = state.units.iter().position(|u| u.active) {
            return Err(ScanError::ActiveWorker { id });
        }

        state.destroyed = true;
        for unit in &mut state.units {
            unit.task.abort();
            unit.active = false;
            if let Some(pending) = unit.pending.take() {
                let _ = pending.send(Err(ScanError::PoolDestroyed));
            }
        }
        for task in state.queue.drain(..) {
            task.reject(ScanError::PoolDestroyed);
        }

        debug!(force, "worker pool destroyed");
        Ok(())
    }

    /// Current bookkeeping snapshot.
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.lock();
        PoolStatus {
            size: self.size,
            active: state.units.iter().filter(|u| u.active).count(),
            queued: state.queue.len(),
            destroyed: state.destroyed,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for unit in &self.shared.lock().units {
            unit.task.abort();
        }
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("status", &self.status())
            .finish()
    }
}
