//! Command results.

use crate::{Cmd, DETAIL_KEY};
use chrono::{DateTime, Utc};
use plexus_types::{CmdId, Loc, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The result of a command.
///
/// A result references exactly one command by
/// [`original_cmd_id`](Self::original_cmd_id) and is routed back to
/// that command's source
/// location. The runtime synthesizes results itself for routing
/// failures (`RouteFailed`), teardown (`Closed`) and expiry
/// (`Timeout`); extensions produce `Ok`/`Error` results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdResult {
    name: String,
    original_cmd_id: CmdId,
    status: StatusCode,
    src: Loc,
    dests: Vec<Loc>,
    properties: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl CmdResult {
    /// Creates a result answering `cmd`, addressed back to the
    /// command's source.
    #[must_use]
    pub fn from_cmd(cmd: &Cmd, status: StatusCode) -> Self {
        Self {
            name: cmd.name().to_string(),
            original_cmd_id: cmd.id(),
            status,
            src: Loc::empty(),
            dests: vec![cmd.src().clone()],
            properties: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a result for a command known only by id and source
    /// location (used when the runtime synthesizes results for
    /// commands it no longer holds).
    #[must_use]
    pub fn synthesized(
        name: impl Into<String>,
        original_cmd_id: CmdId,
        back_to: Loc,
        status: StatusCode,
    ) -> Self {
        Self {
            name: name.into(),
            original_cmd_id,
            status,
            src: Loc::empty(),
            dests: vec![back_to],
            properties: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// The name of the command this result answers.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the command this result answers.
    #[must_use]
    pub fn original_cmd_id(&self) -> CmdId {
        self.original_cmd_id
    }

    /// Result status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns `true` if the status is `Ok`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Source location (set by the runtime on send).
    #[must_use]
    pub fn src(&self) -> &Loc {
        &self.src
    }

    /// Overwrites the source location.
    pub fn set_src(&mut self, src: Loc) {
        self.src = src;
    }

    /// Destination locations (normally the original command's source).
    #[must_use]
    pub fn dests(&self) -> &[Loc] {
        &self.dests
    }

    /// Replaces the destinations with a single location.
    pub fn set_dest(&mut self, dest: Loc) {
        self.dests = vec![dest];
    }

    /// The property map.
    #[must_use]
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Looks a property up by key.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Sets a property.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Builder form of [`set_property`](Self::set_property).
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set_property(key, value);
        self
    }

    /// Sets the conventional human-readable detail property.
    #[must_use]
    pub fn with_detail(self, detail: impl Into<String>) -> Self {
        self.with_property(DETAIL_KEY, Value::String(detail.into()))
    }

    /// The conventional detail property, if set.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.property(DETAIL_KEY).and_then(Value::as_str)
    }

    /// Creation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
