//! Workspace context supplied with each terminal request.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque workspace context attached to a terminal request.
///
/// The bridge never interprets this itself; it is handed to the
/// [`WorkspaceResolver`](crate::WorkspaceResolver) which maps it to a
/// directory on disk. A context without a project means "no workspace".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceContext {
    /// Project the request is scoped to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Arbitrary metadata for resolver-specific needs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl WorkspaceContext {
    /// A context with no workspace attached.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A context scoped to a single project.
    #[must_use]
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            metadata: HashMap::new(),
        }
    }
}
