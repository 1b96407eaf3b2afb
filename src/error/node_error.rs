use thiserror::Error;

/// Node-level errors: anything that fails a single node, either during
/// port resolution just before dispatch or inside `process()`.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Missing required input '{port}'")]
    MissingRequiredInput { port: String },
    #[error("Type mismatch on port '{port}': expected {expected}, got {actual}")]
    TypeMismatch {
        port: String,
        expected: String,
        actual: String,
    },
    #[error("Coercion failed on port '{port}': {reason}")]
    TypeCoercionError { port: String, reason: String },
    #[error("Invalid value on port '{port}': {reason}")]
    InvalidValue { port: String, reason: String },
    #[error("ForEach items must be an array, got {0}")]
    InvalidForEachItems(String),
    #[error("Invalid sub-workflow: {0}")]
    InvalidSubWorkflow(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Node execution cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn missing_input(port: impl Into<String>) -> Self {
        NodeError::MissingRequiredInput { port: port.into() }
    }

    pub fn invalid_value(port: impl Into<String>, reason: impl Into<String>) -> Self {
        NodeError::InvalidValue {
            port: port.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::ExecutionError(e.to_string())
    }
}
