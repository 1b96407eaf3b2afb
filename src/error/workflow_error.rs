//! Workflow-level error types.

use super::NodeError;
use thiserror::Error;

/// Workflow-level errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Graph build error: {0}")]
    GraphBuildError(String),
    #[error("Graph validation error: {0}")]
    GraphValidationError(String),
    #[error("Cycle detected in graph involving node '{0}'")]
    CycleDetected(String),
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Workflow timeout")]
    Timeout,
    #[error("Workflow cancelled")]
    Cancelled,
    #[error("Node execution error: node={node_id}, error={source}")]
    NodeExecutionError {
        node_id: String,
        #[source]
        source: NodeError,
    },
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Workflow store error: {0}")]
    StoreError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WorkflowError {
    /// Wrap a node failure together with the id of the node that raised it.
    pub fn node(node_id: impl Into<String>, source: NodeError) -> Self {
        WorkflowError::NodeExecutionError {
            node_id: node_id.into(),
            source,
        }
    }

    /// The id of the offending node, when the error is node-scoped.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            WorkflowError::NodeExecutionError { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WorkflowError {
    fn from(e: std::io::Error) -> Self {
        WorkflowError::StoreError(e.to_string())
    }
}
