//! Identifier types for Plexus.
//!
//! All identifiers are UUID-based so they stay unique across processes,
//! which matters once a graph spans more than one app over the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a command message.
///
/// Every command carries exactly one `CmdId`; the command's result
/// references it back through `original_cmd_id`. Path tables are keyed
/// by `CmdId`.
///
/// # Example
///
/// ```
/// use plexus_types::CmdId;
///
/// let a = CmdId::new();
/// let b = CmdId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CmdId(pub Uuid);

#[allow(clippy::new_without_default)] // Default would mint an id nobody tracks
impl CmdId {
    /// Creates a new `CmdId` with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for CmdId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmd:{}", self.0)
    }
}

/// Identifier for a running graph.
///
/// One engine runs one graph; the `GraphId` doubles as the engine's
/// identity in routing locations. A `StartGraph` command that does not
/// name a graph id gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub Uuid);

#[allow(clippy::new_without_default)] // graphs are minted by the app, not by Default
impl GraphId {
    /// Creates a new `GraphId` with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "graph:{}", self.0)
    }
}
