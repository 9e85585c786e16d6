//! Graph descriptions.
//!
//! A graph description is the JSON document a `StartGraph` command
//! carries: the extension nodes to instantiate (grouped onto extension
//! threads by `extension_group`) and the typed connections between
//! them.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "type": "extension", "name": "doubler", "addon": "arith",
//!       "extension_group": "workers" }
//!   ],
//!   "connections": [
//!     { "extension": "doubler",
//!       "cmd": [ { "name": "process", "dest": [ { "extension": "squarer" } ] } ] }
//!   ]
//! }
//! ```
//!
//! An extension opts into manual lifecycle gating through its node
//! property map:
//!
//! ```json
//! { "property": { "plexus": { "manual_trigger_life_cycle": [ { "stage": "start" } ] } } }
//! ```

use plexus_types::{ErrorCode, Stage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reserved node-property namespace interpreted by the runtime rather
/// than handed to the extension.
pub const RUNTIME_PROPERTY_KEY: &str = "plexus";

/// Errors from parsing or validating a graph description.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The document is not valid JSON or does not match the schema.
    #[error("graph description is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Two nodes share a name.
    #[error("duplicate extension node: {0}")]
    DuplicateNode(String),

    /// A node is missing a required field.
    #[error("extension node {node} is invalid: {reason}")]
    InvalidNode { node: String, reason: String },

    /// A connection references an extension no node declares and no
    /// remote app qualifies.
    #[error("connection references unknown extension: {0}")]
    UnknownExtension(String),
}

impl ErrorCode for GraphError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "GRAPH_MALFORMED",
            Self::DuplicateNode(_) => "GRAPH_DUPLICATE_NODE",
            Self::InvalidNode { .. } => "GRAPH_INVALID_NODE",
            Self::UnknownExtension(_) => "GRAPH_UNKNOWN_EXTENSION",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Kind of a graph node. Only extensions exist today; the enum keeps
/// the `type` field forward-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Extension,
}

/// One extension node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Instance name, unique within the graph.
    pub name: String,
    /// Addon that manufactures the instance.
    pub addon: String,
    /// Extension group (one group per extension thread).
    pub extension_group: String,
    /// Owning app; `None` means the app receiving the `StartGraph`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Property map handed to the extension at configure time. The
    /// `plexus` key inside it is reserved for the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<Map<String, Value>>,
}

impl GraphNode {
    /// Creates an extension node.
    #[must_use]
    pub fn extension(
        name: impl Into<String>,
        addon: impl Into<String>,
        extension_group: impl Into<String>,
    ) -> Self {
        Self {
            node_type: NodeType::Extension,
            name: name.into(),
            addon: addon.into(),
            extension_group: extension_group.into(),
            app: None,
            property: None,
        }
    }

    /// Builder form: attaches a property map.
    #[must_use]
    pub fn with_property(mut self, property: Map<String, Value>) -> Self {
        self.property = Some(property);
        self
    }

    /// Builder form: gates the given stages on manual triggers.
    #[must_use]
    pub fn with_manual_trigger(mut self, stages: &[Stage]) -> Self {
        let list: Vec<Value> = stages
            .iter()
            .map(|s| {
                let mut entry = Map::new();
                entry.insert("stage".into(), Value::String(s.name().into()));
                Value::Object(entry)
            })
            .collect();
        let mut runtime = Map::new();
        runtime.insert("manual_trigger_life_cycle".into(), Value::Array(list));
        self.property
            .get_or_insert_with(Map::new)
            .insert(RUNTIME_PROPERTY_KEY.into(), Value::Object(runtime));
        self
    }

    /// The stages this node gates on manual triggers.
    #[must_use]
    pub fn manual_trigger_stages(&self) -> Vec<Stage> {
        let Some(entries) = self
            .property
            .as_ref()
            .and_then(|p| p.get(RUNTIME_PROPERTY_KEY))
            .and_then(|v| v.get("manual_trigger_life_cycle"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|e| e.get("stage"))
            .filter_map(Value::as_str)
            .filter_map(Stage::parse)
            .collect()
    }
}

/// Destination of a connection rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDest {
    /// Target app; `None` means the local app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Target extension name.
    pub extension: String,
}

/// One routing rule: messages with `name` flow to `dest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRule {
    pub name: String,
    pub dest: Vec<ConnectionDest>,
}

/// All rules originating from one extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphConnection {
    /// Source app; `None` means the local app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Source extension name.
    pub extension: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<ConnectionRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<ConnectionRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_frame: Vec<ConnectionRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_frame: Vec<ConnectionRule>,
}

/// A complete graph description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDescription {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub connections: Vec<GraphConnection>,
}

impl GraphDescription {
    /// Parses a graph description from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let graph: Self = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Validates node uniqueness, required fields and connection
    /// references. Connections whose source or destination names a
    /// remote app are not resolvable locally and are left to the far
    /// side.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return Err(GraphError::InvalidNode {
                    node: node.name.clone(),
                    reason: "empty name".into(),
                });
            }
            if node.addon.is_empty() {
                return Err(GraphError::InvalidNode {
                    node: node.name.clone(),
                    reason: "empty addon".into(),
                });
            }
            if node.extension_group.is_empty() {
                return Err(GraphError::InvalidNode {
                    node: node.name.clone(),
                    reason: "empty extension_group".into(),
                });
            }
            if !seen.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateNode(node.name.clone()));
            }
        }

        for conn in &self.connections {
            if conn.app.is_none() && !seen.contains(conn.extension.as_str()) {
                return Err(GraphError::UnknownExtension(conn.extension.clone()));
            }
            for rule in conn
                .cmd
                .iter()
                .chain(&conn.data)
                .chain(&conn.audio_frame)
                .chain(&conn.video_frame)
            {
                for dest in &rule.dest {
                    if dest.app.is_none() && !seen.contains(dest.extension.as_str()) {
                        return Err(GraphError::UnknownExtension(dest.extension.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Groups node indexes by extension group, preserving declaration
    /// order of groups and of nodes within a group.
    #[must_use]
    pub fn nodes_by_group(&self) -> Vec<(String, Vec<&GraphNode>)> {
        let mut groups: Vec<(String, Vec<&GraphNode>)> = Vec::new();
        for node in &self.nodes {
            match groups.iter_mut().find(|(name, _)| *name == node.extension_group) {
                Some((_, members)) => members.push(node),
                None => groups.push((node.extension_group.clone(), vec![node])),
            }
        }
        groups
    }
}
