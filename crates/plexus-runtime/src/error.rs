//! Runtime layer errors.

use plexus_types::ErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Errors from the runtime's resource layer: posting to runloops,
/// waiting on calls, talking to a closing app.
///
/// Programming errors (thread-affinity violations, impossible state
/// transitions) are not represented here; those abort the process.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The target runloop has been destroyed; the task was not
    /// enqueued.
    #[error("runloop destroyed; task not posted")]
    RunloopDestroyed,

    /// A blocking call did not complete within the window.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The app is closing or closed.
    #[error("app is closed")]
    Closed,
}

impl ErrorCode for RuntimeError {
    fn code(&self) -> &'static str {
        match self {
            Self::RunloopDestroyed => "RT_RUNLOOP_DESTROYED",
            Self::Timeout(_) => "RT_TIMEOUT",
            Self::Closed => "RT_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
