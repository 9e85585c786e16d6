//! Log severities.

use serde::{Deserialize, Serialize};

/// Severity of a runtime log line.
///
/// The runtime emits through `tracing`; `Fatal` and `Mandatory` have no
/// direct `tracing` equivalent and map to `ERROR` and `INFO` with a
/// severity field preserved on the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    /// The process is about to abort.
    Fatal,
    /// Always emitted regardless of filter configuration, e.g. the
    /// graph-resources line at startup.
    Mandatory,
}

impl LogLevel {
    /// Single-letter form used in formatted output.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Self::Verbose => 'V',
            Self::Debug => 'D',
            Self::Info => 'I',
            Self::Warn => 'W',
            Self::Error => 'E',
            Self::Fatal => 'F',
            Self::Mandatory => 'M',
        }
    }

    /// Closest `tracing` level.
    #[must_use]
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            Self::Verbose => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info | Self::Mandatory => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error | Self::Fatal => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}
