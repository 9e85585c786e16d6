//! Command result status codes.

use serde::{Deserialize, Serialize};

/// Status carried by every command result.
///
/// The numeric values are part of the wire contract and must not be
/// reordered.
///
/// | Code | Value | Meaning |
/// |------|-------|---------|
/// | `Ok` | 0 | command handled successfully |
/// | `Error` | 1 | the handling extension reported failure |
/// | `Timeout` | 2 | no result arrived within the configured window |
/// | `RouteFailed` | 3 | no such destination extension |
/// | `Closed` | 4 | the runtime was closing; the command was cancelled |
/// | `Generic` | 5 | unclassified failure |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    Error,
    Timeout,
    RouteFailed,
    Closed,
    Generic,
}

impl StatusCode {
    /// Returns the wire value.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Error => 1,
            Self::Timeout => 2,
            Self::RouteFailed => 3,
            Self::Closed => 4,
            Self::Generic => 5,
        }
    }

    /// Parses a wire value. Unknown values map to `Generic`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Error,
            2 => Self::Timeout,
            3 => Self::RouteFailed,
            4 => Self::Closed,
            _ => Self::Generic,
        }
    }

    /// Returns `true` for `Ok`.
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::RouteFailed => "route_failed",
            Self::Closed => "closed",
            Self::Generic => "generic",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(StatusCode::Ok.as_u8(), 0);
        assert_eq!(StatusCode::Error.as_u8(), 1);
        assert_eq!(StatusCode::Timeout.as_u8(), 2);
        assert_eq!(StatusCode::RouteFailed.as_u8(), 3);
        assert_eq!(StatusCode::Closed.as_u8(), 4);
        assert_eq!(StatusCode::Generic.as_u8(), 5);
    }

    #[test]
    fn round_trip() {
        for v in 0..=5 {
            assert_eq!(StatusCode::from_u8(v).as_u8(), v);
        }
    }

    #[test]
    fn unknown_value_maps_to_generic() {
        assert_eq!(StatusCode::from_u8(42), StatusCode::Generic);
    }
}
