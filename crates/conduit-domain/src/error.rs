//! Gateway error types.

use thiserror::Error;

use conduit_config::ConfigError;
use conduit_llm::{ErrorKind, LlmError, Message};
use conduit_session::SessionError;
use conduit_tools::ToolError;

/// Gateway-level errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Provider, tool or other named entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No backend serves the requested model.
    #[error("Model '{model}' not found{}", unreachable_suffix(.unreachable))]
    ModelNotFound {
        model: String,
        /// Backends that could not be queried during the search.
        unreachable: Vec<String>,
    },

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadParameter(String),

    /// The resolved backend lacks a capability.
    #[error("Backend '{backend}' does not support {capability}")]
    NotImplemented { backend: String, capability: String },

    /// The tool loop ran out of iterations; the conversation was rolled back.
    #[error("Tool loop exceeded {limit} iterations")]
    MaxIterations {
        limit: u32,
        /// The last tool-call message, marked `max_iterations`.
        message: Box<Message>,
    },

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn unreachable_suffix(unreachable: &[String]) -> String {
    if unreachable.is_empty() {
        String::new()
    } else {
        format!(" (unreachable backends: {})", unreachable.join(", "))
    }
}

impl GatewayError {
    pub fn not_implemented(backend: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::NotImplemented {
            backend: backend.into(),
            capability: capability.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::ModelNotFound { .. } => ErrorKind::NotFound,
            Self::BadParameter(_) => ErrorKind::BadParameter,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::MaxIterations { .. } => ErrorKind::Conflict,
            Self::Llm(e) => e.kind(),
            Self::Session(e) => e.kind(),
            Self::Tool(e) => e.kind(),
            Self::Config(e) => e.kind(),
            Self::Cancelled | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if the caller cancelled the request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Llm(LlmError::Cancelled))
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_llm::FinishReason;

    #[test]
    fn test_model_not_found_lists_unreachable() {
        let err = GatewayError::ModelNotFound {
            model: "gpt-x".to_string(),
            unreachable: vec!["ollama".to_string(), "vllm".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Model 'gpt-x' not found (unreachable backends: ollama, vllm)"
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let plain = GatewayError::ModelNotFound {
            model: "gpt-x".to_string(),
            unreachable: vec![],
        };
        assert_eq!(plain.to_string(), "Model 'gpt-x' not found");
    }

    #[test]
    fn test_kinds_delegate() {
        let llm: GatewayError = LlmError::not_implemented("openai", "top_k").into();
        assert_eq!(llm.kind(), ErrorKind::NotImplemented);

        let session: GatewayError = SessionError::NotFound("abc".to_string()).into();
        assert_eq!(session.kind(), ErrorKind::NotFound);

        let tool: GatewayError = ToolError::NotFound("grep".to_string()).into();
        assert_eq!(tool.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_max_iterations_is_conflict() {
        let err = GatewayError::MaxIterations {
            limit: 3,
            message: Box::new(Message::assistant("x").with_result(FinishReason::MaxIterations)),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains('3'));
    }
}
