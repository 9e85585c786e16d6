//! Thread-safe environment proxies.
//!
//! An [`EnvProxyHandle`] is the only way code off an extension's home
//! thread may reach that extension's environment: it posts closures
//! onto the owning thread's runloop. Helper threads, bridges to other
//! runtimes and test harnesses all hold proxies.
//!
//! # Reference counting
//!
//! The runtime tracks how many proxies exist per extension; the count
//! starts at 1 (the extension itself) and each live proxy adds one.
//! Teardown of the extension completes only after the count returns to
//! 1, so a helper thread can never post into a freed extension.

use crate::{ExtensionEnv, ExtensionError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Work shipped onto the extension's home thread.
pub type EnvTask = Box<dyn FnOnce(&mut dyn ExtensionEnv) + Send>;

type PostFn = dyn Fn(EnvTask) -> Result<(), ExtensionError> + Send + Sync;
type ReleaseFn = dyn Fn() + Send + Sync;

/// A cloneable, thread-safe front to one extension's environment.
///
/// Constructed by the runtime via
/// [`ExtensionEnv::create_proxy`](crate::ExtensionEnv::create_proxy);
/// extension code only consumes it.
pub struct EnvProxyHandle {
    post: Arc<PostFn>,
    on_release: Arc<ReleaseFn>,
    refs: Arc<AtomicUsize>,
}

impl EnvProxyHandle {
    /// Wires a proxy up to the runtime. `post` enqueues a task on the
    /// owner's runloop; `on_release` is invoked every time a proxy
    /// clone drops, so the owner can re-check deferred teardown.
    #[must_use]
    pub fn new(
        post: impl Fn(EnvTask) -> Result<(), ExtensionError> + Send + Sync + 'static,
        on_release: impl Fn() + Send + Sync + 'static,
        refs: Arc<AtomicUsize>,
    ) -> Self {
        refs.fetch_add(1, Ordering::SeqCst);
        Self {
            post: Arc::new(post),
            on_release: Arc::new(on_release),
            refs,
        }
    }

    /// Enqueues `f` to run with the extension's environment on its
    /// home thread. Tasks already enqueued run to completion even if
    /// the proxy drops afterwards.
    pub fn notify(&self, f: EnvTask) -> Result<(), ExtensionError> {
        (self.post)(f)
    }

    /// Like [`notify`](Self::notify), but blocks until the task has
    /// run. Must not be called on the extension's home thread.
    pub fn notify_sync(&self, f: EnvTask, timeout: Duration) -> Result<(), ExtensionError> {
        let (done_tx, done_rx) = mpsc::channel();
        self.notify(Box::new(move |env| {
            f(env);
            let _ = done_tx.send(());
        }))?;
        done_rx
            .recv_timeout(timeout)
            .map_err(|_| ExtensionError::ExecutionFailed("notify_sync timed out".into()))
    }

    /// Fire-and-forget variant for teardown paths where nobody is left
    /// to observe an error.
    pub fn notify_async(&self, f: EnvTask) {
        let _ = (self.post)(f);
    }

    /// Current holder count, including the owner's base reference.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }
}

impl Clone for EnvProxyHandle {
    fn clone(&self) -> Self {
        self.refs.fetch_add(1, Ordering::SeqCst);
        Self {
            post: Arc::clone(&self.post),
            on_release: Arc::clone(&self.on_release),
            refs: Arc::clone(&self.refs),
        }
    }
}

impl Drop for EnvProxyHandle {
    fn drop(&mut self) {
        self.refs.fetch_sub(1, Ordering::SeqCst);
        (self.on_release)();
    }
}

impl std::fmt::Debug for EnvProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvProxyHandle")
            .field("refs", &self.ref_count())
            .finish()
    }
}
