//! Unified error interface.
//!
//! Every Plexus error type implements [`ErrorCode`] so callers can
//! branch on a stable machine-readable code and decide whether a retry
//! is worth attempting, without matching on concrete error enums from
//! other crates.
//!
//! # Code format
//!
//! - UPPER_SNAKE_CASE
//! - Prefixed with the owning domain: `MSG_`, `EXT_`, `ADDON_`, `RT_`
//! - Stable once published
//!
//! # Example
//!
//! ```
//! use plexus_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum QueueError {
//!     Full,
//!     Destroyed,
//! }
//!
//! impl ErrorCode for QueueError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Full => "QUEUE_FULL",
//!             Self::Destroyed => "QUEUE_DESTROYED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Full)
//!     }
//! }
//!
//! assert_eq!(QueueError::Full.code(), "QUEUE_FULL");
//! assert!(QueueError::Full.is_recoverable());
//! ```

/// Stable machine-readable error classification.
pub trait ErrorCode {
    /// Returns the machine-readable code for this error.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the failed operation may succeed.
    ///
    /// Transient conditions (a momentarily full queue) are recoverable;
    /// logic errors (unknown addon name, duplicate registration) are
    /// not.
    fn is_recoverable(&self) -> bool;
}
