//! Lifecycle stages.

use serde::{Deserialize, Serialize};

/// A stage in an extension's lifecycle.
///
/// The runtime drives each extension through
/// `Configure → Init → Start → (running) → Stop → Deinit`; the
/// extension acknowledges each stage through the matching `*_done`
/// call on its environment. `Start` and `Stop` may be gated on an
/// external trigger command, in which case the stage name travels in
/// the trigger's `stage` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configure,
    Init,
    Start,
    Stop,
    Deinit,
}

impl Stage {
    /// Parses a stage name as it appears in graph properties and
    /// trigger commands.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "configure" => Some(Self::Configure),
            "init" => Some(Self::Init),
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "deinit" => Some(Self::Deinit),
            _ => None,
        }
    }

    /// The stage name as it appears in graph properties.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Init => "init",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Deinit => "deinit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
