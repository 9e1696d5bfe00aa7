//! DAG-level error type.

use thiserror::Error;

/// Errors produced by DAG validation and traversal.
#[derive(Debug, Error)]
pub enum DagError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: String, side: &'static str },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// The requested workflow has no nodes/edges loaded.
    #[error("workflow '{0}' not found while loading DAG")]
    NotFound(uuid::Uuid),

    /// Underlying data source failed to answer a query.
    #[error("dag source error: {0}")]
    Source(String),
}
