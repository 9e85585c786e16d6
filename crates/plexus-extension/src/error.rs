//! Extension layer errors.
//!
//! All codes use the `EXT_` prefix. Recoverable means a retry may
//! succeed; not recoverable means the caller should fix the request or
//! give up.

use plexus_types::ErrorCode;
use thiserror::Error;

/// Errors surfaced by extensions and their environment.
#[derive(Debug, Clone, Error)]
pub enum ExtensionError {
    /// The command or operation is not recognized by this extension.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// The message payload does not match what the extension expects.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The operation was recognized but failed while executing.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Configuration or initialization failed; the extension never
    /// advances past init.
    #[error("initialization failed: {0}")]
    InitFailed(String),

    /// The runtime is closing; the send or operation was cancelled.
    #[error("runtime is closed")]
    Closed,
}

impl ErrorCode for ExtensionError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotSupported(_) => "EXT_NOT_SUPPORTED",
            Self::InvalidPayload(_) => "EXT_INVALID_PAYLOAD",
            Self::ExecutionFailed(_) => "EXT_EXECUTION_FAILED",
            Self::InitFailed(_) => "EXT_INIT_FAILED",
            Self::Closed => "EXT_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::ExecutionFailed(_) | Self::InitFailed(_) => true,
            Self::NotSupported(_) | Self::InvalidPayload(_) | Self::Closed => false,
        }
    }
}
