//! Thread-affinity tags.
//!
//! Every long-lived runtime object carries a [`ThreadAffinity`]: the id
//! of the one thread allowed to mutate it. The tag starts unset; it is
//! latched by the owning thread on first entry to its runloop, and
//! checks pass unconditionally while unset. That covers the hand-off
//! window in which the engine thread configures an extension thread
//! before the OS thread exists, without a lock or a bypass flag.
//!
//! Violating a strict check is a programming error, not a recoverable
//! condition: the process aborts, because silently continuing would
//! corrupt the single-owner model everything else relies on.

use parking_lot::Mutex;
use std::thread::{self, ThreadId};
use tracing::error;

/// Aborts the process over an integrity violation. Never returns.
pub fn integrity_violation(context: &str) -> ! {
    error!(context, "integrity violation; aborting");
    panic!("integrity violation: {context}");
}

/// A belonging-thread tag.
#[derive(Debug, Default)]
pub struct ThreadAffinity {
    belonging: Mutex<Option<ThreadId>>,
}

impl ThreadAffinity {
    /// Creates an unset tag. Checks pass until it is latched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches the tag to the calling thread.
    pub fn latch_to_current(&self) {
        *self.belonging.lock() = Some(thread::current().id());
    }

    /// Copies the belonging thread from another tag. Used when
    /// sub-objects (path tables, environments) are promoted to a newly
    /// spawned extension thread.
    pub fn inherit_from(&self, src: &ThreadAffinity) {
        *self.belonging.lock() = *src.belonging.lock();
    }

    /// Returns `true` if the tag has been latched.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.belonging.lock().is_some()
    }

    /// Returns `true` if the calling thread may touch the object:
    /// either the tag is unset (pre-attach phase) or it names the
    /// calling thread.
    #[must_use]
    pub fn check(&self) -> bool {
        match *self.belonging.lock() {
            None => true,
            Some(owner) => owner == thread::current().id(),
        }
    }

    /// Strict check: aborts the process on violation.
    pub fn assert_on_owner(&self, what: &str) {
        if !self.check() {
            integrity_violation(what);
        }
    }
}
