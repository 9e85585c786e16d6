//! Routing locations.
//!
//! A [`Loc`] names a point in the routing fabric: an app (by uri), a
//! graph inside that app, and an extension inside that graph. Each field
//! is optional so the same type describes every addressing granularity:
//!
//! | app_uri | graph_id | extension | Meaning |
//! |---------|----------|-----------|---------|
//! | None    | None     | None      | the local client / external sender |
//! | Some    | None     | None      | an app |
//! | Some    | Some     | None      | a graph (engine) |
//! | Some    | Some     | Some      | an extension |

use crate::GraphId;
use serde::{Deserialize, Serialize};

/// A location in the routing fabric.
///
/// Messages carry a source `Loc` and a list of destination `Loc`s.
/// Results are routed back to the source location of the command they
/// answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    /// Uri of the app, e.g. `"plexus://localhost:8001"`. `None` means
    /// "this app" for destinations and "external client" for sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_uri: Option<String>,
    /// The graph (engine) within the app.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<GraphId>,
    /// The extension within the graph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl Loc {
    /// An empty location (external client).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A location naming an extension in a graph.
    #[must_use]
    pub fn extension(
        app_uri: impl Into<String>,
        graph_id: GraphId,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            app_uri: Some(app_uri.into()),
            graph_id: Some(graph_id),
            extension: Some(extension.into()),
        }
    }

    /// A location naming a graph (engine).
    #[must_use]
    pub fn graph(app_uri: impl Into<String>, graph_id: GraphId) -> Self {
        Self {
            app_uri: Some(app_uri.into()),
            graph_id: Some(graph_id),
            extension: None,
        }
    }

    /// A location naming an app.
    #[must_use]
    pub fn app(app_uri: impl Into<String>) -> Self {
        Self {
            app_uri: Some(app_uri.into()),
            graph_id: None,
            extension: None,
        }
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.app_uri.is_none() && self.graph_id.is_none() && self.extension.is_none()
    }

    /// Returns the extension name, if this location names one.
    #[must_use]
    pub fn extension_name(&self) -> Option<&str> {
        self.extension.as_deref()
    }
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.app_uri.as_deref().unwrap_or("-"),
            self.graph_id.map(|g| g.to_string()).unwrap_or_else(|| "-".into()),
            self.extension.as_deref().unwrap_or("-"),
        )
    }
}
