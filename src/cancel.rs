//! Cooperative cancellation shared by a subscription, its pollers and the
//! multiplexer wait.
//!
//! The signal is a channel whose only sender is dropped on cancel: every
//! receiver then observes disconnection, so waits on it (alone or inside a
//! `select!`) unblock at once.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

struct Inner {
    cancelled: AtomicBool,
    /// Dropped on cancel.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(self.trigger.lock().take());

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Cloneable cancellation signal. All clones observe the same state.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a token that is cancelled when this one is, but can also be
    /// cancelled on its own without affecting this one.
    pub fn child(&self) -> Self {
        let child = Self::new();
        self.adopt(&child);
        child
    }

    /// Make an existing token follow this one, as if it had been created by
    /// [`child`](Self::child). Clones of `child` already handed out stay valid.
    pub(crate) fn adopt(&self, child: &CancellationToken) {
        if Arc::ptr_eq(&self.inner, &child.inner) {
            return;
        }

        let mut children = self.inner.children.lock();
        if self.is_cancelled() {
            drop(children);
            child.cancel();
            return;
        }
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(&child.inner));
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` on cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.inner.signal.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) | Ok(()) => false,
        }
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let _ = self.inner.signal.recv();
    }

    /// Receiver that disconnects on cancel, for use in `crossbeam_channel::select!`.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
