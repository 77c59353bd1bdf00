//! Error types for tool execution.

use conduit_llm::ErrorKind;
use thiserror::Error;

/// Result type alias using the tool error type.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type for tool lookup and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// The input did not match the tool's schema.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The tool ran and failed.
    #[error("Tool execution failed: {0}")]
    Execution(String),

    /// Execution was cancelled.
    #[error("Tool execution cancelled")]
    Cancelled,
}

impl ToolError {
    /// Create an invalid-parameters error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidParameters(_) => ErrorKind::BadParameter,
            Self::Execution(_) | Self::Cancelled => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::InvalidParameters(err.to_string())
    }
}
