//! Command messages.

use crate::graph::GraphDescription;
use crate::STAGE_KEY;
use chrono::{DateTime, Utc};
use plexus_types::{CmdId, Loc, Stage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a command asks for.
///
/// `Custom` is the application-defined case; the remaining variants are
/// the runtime's own control verbs. They share the [`Cmd`] envelope so
/// a single routing path carries both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CmdKind {
    /// Application-defined command, dispatched to an extension's
    /// `on_cmd`.
    Custom,
    /// Establish a graph: nodes, groups, connections.
    StartGraph { graph: GraphDescription },
    /// Tear a running graph down.
    StopGraph,
    /// Close the whole app: every engine, then the addon store.
    CloseApp,
    /// Release a manually gated lifecycle stage; the stage name rides
    /// in the `stage` property.
    TriggerLifeCycle,
    /// Arm a timer (reserved; the core has no timer service).
    Timer { timer_id: u64, timeout_us: u64, times: i64 },
    /// A timer fired (reserved).
    Timeout { timer_id: u64 },
}

/// A command message.
///
/// Every command carries a unique [`CmdId`] and receives exactly one
/// ultimate [`CmdResult`](crate::CmdResult) back at its source
/// location.
///
/// # Example
///
/// ```
/// use plexus_msg::Cmd;
/// use serde_json::json;
///
/// let cmd = Cmd::new("hello_world").with_property("detail", json!("hi"));
/// assert_eq!(cmd.name(), "hello_world");
/// assert!(cmd.property("detail").is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cmd {
    name: String,
    id: CmdId,
    kind: CmdKind,
    src: Loc,
    dests: Vec<Loc>,
    properties: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl Cmd {
    /// Creates a custom command with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(name, CmdKind::Custom)
    }

    /// Creates a command with an explicit kind.
    #[must_use]
    pub fn with_kind(name: impl Into<String>, kind: CmdKind) -> Self {
        Self {
            name: name.into(),
            id: CmdId::new(),
            kind,
            src: Loc::empty(),
            dests: Vec::new(),
            properties: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a `StartGraph` command carrying a graph description.
    #[must_use]
    pub fn start_graph(graph: GraphDescription) -> Self {
        Self::with_kind("start_graph", CmdKind::StartGraph { graph })
    }

    /// Creates a `StopGraph` command addressed to a graph.
    #[must_use]
    pub fn stop_graph() -> Self {
        Self::with_kind("stop_graph", CmdKind::StopGraph)
    }

    /// Creates a `CloseApp` command.
    #[must_use]
    pub fn close_app() -> Self {
        Self::with_kind("close_app", CmdKind::CloseApp)
    }

    /// Creates a `TriggerLifeCycle` command releasing the given stage.
    #[must_use]
    pub fn trigger_life_cycle(stage: Stage) -> Self {
        Self::with_kind("trigger_life_cycle", CmdKind::TriggerLifeCycle)
            .with_property(STAGE_KEY, Value::String(stage.name().to_string()))
    }

    /// The command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The command id.
    #[must_use]
    pub fn id(&self) -> CmdId {
        self.id
    }

    /// The command kind.
    #[must_use]
    pub fn kind(&self) -> &CmdKind {
        &self.kind
    }

    /// Takes the graph description out of a `StartGraph` command.
    #[must_use]
    pub fn take_graph(&mut self) -> Option<GraphDescription> {
        match std::mem::replace(&mut self.kind, CmdKind::Custom) {
            CmdKind::StartGraph { graph } => Some(graph),
            other => {
                self.kind = other;
                None
            }
        }
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

    /// Destination locations.
    #[must_use]
    pub fn dests(&self) -> &[Loc] {
        &self.dests
    }

    /// Replaces the destinations with a single location.
    pub fn set_dest(&mut self, dest: Loc) {
        self.dests = vec![dest];
    }

    /// Builder form of [`set_dest`](Self::set_dest).
    #[must_use]
    pub fn with_dest(mut self, dest: Loc) -> Self {
        self.set_dest(dest);
        self
    }

    /// Appends a destination.
    pub fn add_dest(&mut self, dest: Loc) {
        self.dests.push(dest);
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

    /// Creation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The gated stage of a `TriggerLifeCycle` command, if present and
    /// recognized.
    #[must_use]
    pub fn trigger_stage(&self) -> Option<Stage> {
        self.property(STAGE_KEY)
            .and_then(Value::as_str)
            .and_then(Stage::parse)
    }
}
