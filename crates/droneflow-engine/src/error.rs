//! Error types for the workflow engine

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the workflow engine
///
/// The `Display` text of each variant is what the error policy inspects when
/// classifying a failure, so transport-shaped variants keep their keywords
/// ("connection", "timeout", "unavailable", "configuration") in the message.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A command dispatched to the host failed
    #[error("Command '{command}' failed: {message}")]
    Dispatch { command: String, message: String },

    /// A command did not answer within the dispatcher timeout
    #[error("Timeout: command '{command}' did not respond within {after_ms} ms")]
    Timeout { command: String, after_ms: u64 },

    /// A backing service could not be reached at all
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A node parameter is missing or has the wrong shape
    #[error("Validation error: invalid parameter '{parameter}' on node '{node_id}': {message}")]
    InvalidParameter {
        node_id: String,
        parameter: String,
        message: String,
    },

    /// Engine or policy configuration is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The dependency graph cannot be scheduled
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// No start node exists to begin a sequential walk
    #[error("Workflow has no start node")]
    NoStartNode,

    /// A node id was not found in the loaded workflow
    #[error("Node not found: {0}")]
    UnknownNode(String),

    /// No workflow has been loaded into the engine
    #[error("No workflow loaded")]
    NoWorkflow,

    /// A node failure escalated to an abort
    #[error("Workflow aborted at node '{node_id}': {reason}")]
    Aborted { node_id: String, reason: String },

    /// The run was cancelled while an operation was waiting
    #[error("Workflow cancelled")]
    Cancelled,

    /// A run is already in progress on this engine
    #[error("A workflow run is already in progress")]
    AlreadyRunning,

    /// A node handler failed for a reason of its own
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create a dispatch error for a command
    pub fn dispatch(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dispatch {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        node_id: impl Into<String>,
        parameter: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            node_id: node_id.into(),
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
