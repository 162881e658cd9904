//! Cooperative cancellation.
//!
//! A [`CancellationTokenSource`] owns the right to cancel, reset and dispose.
//! The [`CancellationToken`] it hands out is a cheap clone that can only be
//! observed: polled with [`CancellationToken::is_cancelled`], awaited with
//! [`CancellationToken::cancelled`], or hooked with listeners.

use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use sizetree_core::{ScanError, ScanResult};

type OnceListener = Box<dyn FnOnce() + Send>;
type PersistentListener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`CancellationToken::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Listeners {
    once: Vec<OnceListener>,
    persistent: Vec<(SubscriptionId, PersistentListener)>,
    next_id: u64,
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    disposed: AtomicBool,
    /// Bumped on every cancel so waiters notice a cancel even if the flag
    /// was cleared again before they woke up.
    epoch: AtomicU64,
    listeners: Mutex<Listeners>,
    notify: Notify,
}

impl TokenState {
    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read side of a cancellation flag.
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`ScanError::Cancelled`] if cancellation has been requested.
    pub fn error_if_cancelled(&self) -> ScanResult<()> {
        if self.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Register a listener invoked at most once, on the next cancel.
    ///
    /// Ignored once the source has been disposed.
    pub fn on_cancellation_requested(&self, listener: impl FnOnce() + Send + 'static) {
        if self.state.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.state.listeners().once.push(Box::new(listener));
    }

    /// Register a listener invoked on every cancel until unsubscribed.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        let mut listeners = self.state.listeners();
        let id = SubscriptionId(listeners.next_id);
        listeners.next_id += 1;
        if !self.state.disposed.load(Ordering::SeqCst) {
            listeners.persistent.push((id, Arc::new(listener)));
        }
        id
    }

    /// Remove a persistent listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.state.listeners();
        let before = listeners.persistent.len();
        listeners.persistent.retain(|(existing, _)| *existing != id);
        listeners.persistent.len() != before
    }

    /// Wait until cancellation is requested.
    ///
    /// Completes immediately if the token is already cancelled. A token whose
    /// source is disposed without being cancelled never completes.
    pub async fn cancelled(&self) {
        let start = self.state.epoch.load(Ordering::SeqCst);
        loop {
            let mut notified = pin!(self.state.notify.notified());
            notified.as_mut().enable();
            if self.is_cancelled() || self.state.epoch.load(Ordering::SeqCst) != start {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Owner of a cancellation flag.
pub struct CancellationTokenSource {
    token: CancellationToken,
}

impl CancellationTokenSource {
    /// Create a source in the not-cancelled state.
    pub fn new() -> Self {
        Self {
            token: CancellationToken {
                state: Arc::new(TokenState::default()),
            },
        }
    }

    /// A token observing this source.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request cancellation.
    ///
    /// One-shot listeners registered since the previous cancel fire exactly
    /// once; persistent listeners fire on every call. No-op after dispose.
    pub fn cancel(&self) {
        let state = &self.token.state;
        if state.disposed.load(Ordering::SeqCst) {
            return;
        }

        state.cancelled.store(true, Ordering::SeqCst);
        state.epoch.fetch_add(1, Ordering::SeqCst);

        // Listeners run outside the lock so they may touch the token.
        let (once, persistent) = {
            let mut listeners = state.listeners();
            let once = std::mem::take(&mut listeners.once);
            let persistent: Vec<PersistentListener> = listeners
                .persistent
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            (once, persistent)
        };

        for listener in once {
            listener();
        }
        for listener in persistent {
            listener();
        }

        state.notify.notify_waiters();
    }

    /// Clear the cancelled flag without notifying anyone.
    pub fn reset(&self) {
        self.token.state.cancelled.store(false, Ordering::SeqCst);
    }

    /// Drop every listener and return to the not-cancelled state for good.
    pub fn dispose(&self) {
        let state = &self.token.state;
        state.disposed.store(true, Ordering::SeqCst);
        state.cancelled.store(false, Ordering::SeqCst);

        let mut listeners = state.listeners();
        listeners.once.clear();
        listeners.persistent.clear();
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationTokenSource")
            .field("cancelled", &self.is_cancelled())
            .field("disposed", &self.token.state.disposed.load(Ordering::SeqCst))
            .finish()
    }
}
