//! The runloop primitive.
//!
//! A [`Runloop`] is a FIFO task queue drained by a single blocking
//! [`run`](Runloop::run) on its owning thread. Tasks are closures over
//! the owner's state, so cross-thread callers mutate the owner without
//! any shared locks: the queue is the synchronization.
//!
//! # Contract
//!
//! - [`RunloopHandle::post_task_tail`] may be called from any thread.
//! - Tasks posted by the same thread run in posting order.
//! - Tasks run serially on the owning thread, to completion.
//! - [`RunloopHandle::stop`] is itself queued; `run` returns once the
//!   stop has been seen **and** the queue has drained, so no accepted
//!   task is ever silently dropped.
//! - Posting to a destroyed loop returns
//!   [`RuntimeError::RunloopDestroyed`].
//! - Individual tasks cannot be cancelled; post a superseding task.

use crate::RuntimeError;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;
use tracing::trace;

/// A unit of work executed on the owning thread.
pub type Task<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

enum Op<T> {
    Task(Task<T>),
    Stop,
}

/// The queue side of a runloop. Owned (and drained) by exactly one
/// thread.
pub struct Runloop<T> {
    rx: Receiver<Op<T>>,
    tx: Sender<Op<T>>,
}

/// A cloneable posting handle to a [`Runloop`].
pub struct RunloopHandle<T> {
    tx: Sender<Op<T>>,
}

impl<T> Clone for RunloopHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> RunloopHandle<T> {
    /// Enqueues a task at the tail of the queue.
    pub fn post_task_tail(
        &self,
        task: impl FnOnce(&mut T) + Send + 'static,
    ) -> Result<(), RuntimeError> {
        self.tx
            .send(Op::Task(Box::new(task)))
            .map_err(|_| RuntimeError::RunloopDestroyed)
    }

    /// Requests the loop to stop once everything queued ahead (and
    /// behind, until the queue drains) has run.
    pub fn stop(&self) -> Result<(), RuntimeError> {
        self.tx.send(Op::Stop).map_err(|_| RuntimeError::RunloopDestroyed)
    }
}

impl<T> Runloop<T> {
    /// Creates an empty runloop. Call this on the thread that will run
    /// it.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { rx, tx }
    }

    /// Returns a posting handle.
    #[must_use]
    pub fn handle(&self) -> RunloopHandle<T> {
        RunloopHandle {
            tx: self.tx.clone(),
        }
    }

    /// Runs until a stop is seen and the queue drains. Consumes the
    /// loop; posting to surviving handles fails afterwards.
    pub fn run(self, owner: &mut T) {
        let Runloop { rx, tx } = self;
        // Dropping our own sender means `recv` disconnects if every
        // handle is gone, instead of parking forever.
        drop(tx);

        loop {
            match rx.recv() {
                Ok(Op::Task(task)) => task(owner),
                Ok(Op::Stop) => break,
                Err(_) => {
                    trace!("runloop: all handles dropped, exiting");
                    return;
                }
            }
        }
        Self::drain(&rx, owner);
    }

    /// Like [`run`](Self::run), but also invokes `on_tick` on the
    /// owning thread whenever `tick_every` elapses without traffic.
    /// Used by the engine for its outstanding-command timeout sweep.
    pub fn run_with_tick(
        self,
        owner: &mut T,
        tick_every: Duration,
        mut on_tick: impl FnMut(&mut T),
    ) {
        let Runloop { rx, tx } = self;
        drop(tx);

        loop {
            match rx.recv_timeout(tick_every) {
                Ok(Op::Task(task)) => task(owner),
                Ok(Op::Stop) => break,
                Err(RecvTimeoutError::Timeout) => on_tick(owner),
                Err(RecvTimeoutError::Disconnected) => {
                    trace!("runloop: all handles dropped, exiting");
                    return;
                }
            }
        }
        Self::drain(&rx, owner);
    }

    // A stop does not cancel work already accepted.
    fn drain(rx: &Receiver<Op<T>>, owner: &mut T) {
        loop {
            match rx.try_recv() {
                Ok(Op::Task(task)) => task(owner),
                Ok(Op::Stop) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }
}

impl<T> Default for Runloop<T> {
    fn default() -> Self {
        Self::new()
    }
}
