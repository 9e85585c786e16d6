//! Generic runloop-backed environment proxy.

use crate::runloop::{RunloopHandle, Task};
use crate::RuntimeError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// A thread-safe, reference-counted poster onto an owner's runloop.
///
/// The owner keeps the counter (initialized to 1, its own base
/// reference) and may gate terminal teardown on the count returning to
/// 1: as long as any proxy is alive, asynchronous callers may still
/// post.
///
/// Tasks already enqueued run to completion; dropping a proxy does not
/// unqueue them. The proxy has no timer — timeouts belong to the
/// caller.
pub struct EnvProxy<T: 'static> {
    handle: RunloopHandle<T>,
    refs: Arc<AtomicUsize>,
}

impl<T> EnvProxy<T> {
    /// Creates a proxy over the owner's runloop, incrementing the
    /// owner's holder count.
    #[must_use]
    pub fn new(handle: RunloopHandle<T>, refs: Arc<AtomicUsize>) -> Self {
        refs.fetch_add(1, Ordering::SeqCst);
        Self { handle, refs }
    }

    /// Enqueues `task` on the owner's runloop.
    pub fn notify(&self, task: Task<T>) -> Result<(), RuntimeError> {
        self.handle.post_task_tail(task)
    }

    /// Enqueues `task` and blocks until it has run. Must not be called
    /// on the owner's thread.
    pub fn notify_sync(&self, task: Task<T>, timeout: Duration) -> Result<(), RuntimeError> {
        let (done_tx, done_rx) = mpsc::channel();
        self.handle.post_task_tail(move |owner: &mut T| {
            task(owner);
            let _ = done_tx.send(());
        })?;
        done_rx
            .recv_timeout(timeout)
            .map_err(|_| RuntimeError::Timeout(timeout))
    }

    /// Fire-and-forget variant used in teardown where no one is left
    /// to signal.
    pub fn notify_async(&self, task: Task<T>) {
        let _ = self.handle.post_task_tail(task);
    }

    /// Current holder count, including the owner's base reference.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }
}

impl<T> Clone for EnvProxy<T> {
    fn clone(&self) -> Self {
        self.refs.fetch_add(1, Ordering::SeqCst);
        Self {
            handle: self.handle.clone(),
            refs: Arc::clone(&self.refs),
        }
    }
}

impl<T> Drop for EnvProxy<T> {
    fn drop(&mut self) {
        self.refs.fetch_sub(1, Ordering::SeqCst);
    }
}
