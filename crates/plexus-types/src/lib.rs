//! Plexus shared types - Plugin SDK layer.
//!
//! Foundation types used across every Plexus crate:
//!
//! - [`CmdId`] / [`GraphId`]: UUID-based identifiers
//! - [`Loc`]: routing location (app uri, graph, extension)
//! - [`StatusCode`]: command result status codes
//! - [`Stage`]: extension lifecycle stages
//! - [`LogLevel`]: runtime log severities
//! - [`ErrorCode`]: unified error code interface
//!
//! This crate sits at the bottom of the dependency graph and is part of
//! the extension SDK surface: extension authors see these types in every
//! message they touch, so they are SemVer-sensitive.

mod error;
mod id;
mod level;
mod loc;
mod stage;
mod status;

pub use error::ErrorCode;
pub use id::{CmdId, GraphId};
pub use level::LogLevel;
pub use loc::Loc;
pub use stage::Stage;
pub use status::StatusCode;

/// Asserts that every error in `errors` carries a code with the given
/// prefix in UPPER_SNAKE_CASE. Test support for the [`ErrorCode`]
/// convention; call it from an exhaustive-variants test in each crate
/// that defines an error type.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], prefix: &str) {
    for err in errors {
        let code = err.code();
        assert!(
            code.starts_with(prefix),
            "error code {code:?} missing prefix {prefix:?}"
        );
        assert!(
            code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
            "error code {code:?} is not UPPER_SNAKE_CASE"
        );
    }
}
