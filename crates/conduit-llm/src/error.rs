//! Error types for the LLM crate.

use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Error Kind
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse classification shared by every Conduit error type.
///
/// Transport layers map these onto status codes; the core only uses them to
/// decide how a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A model, provider, session or tool is absent.
    NotFound,
    /// The caller supplied invalid input.
    BadParameter,
    /// A backend lacks a requested capability or option.
    NotImplemented,
    /// The request conflicts with current state or exhausted a budget.
    Conflict,
    /// Unexpected failure.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadParameter => "bad_parameter",
            ErrorKind::NotImplemented => "not_implemented",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Error
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for backend and option-translation operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Model or backend not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    BadParameter(String),

    /// The backend does not support the requested option or capability.
    #[error("Backend '{backend}' does not support {option}")]
    NotImplemented {
        /// Name of the backend.
        backend: String,
        /// The option or capability that was requested.
        option: String,
    },

    /// Backend/API error from the provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Network/connectivity error.
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The call was cancelled by the caller.
    #[error("Request cancelled")]
    Cancelled,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// Create a not-implemented error for a backend/option pair.
    pub fn not_implemented(backend: impl Into<String>, option: impl Into<String>) -> Self {
        Self::NotImplemented {
            backend: backend.into(),
            option: option.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadParameter(_) | Self::Serialization(_) => ErrorKind::BadParameter,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::Backend(_) | Self::Network(_) | Self::Cancelled | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns true if the backend could not be reached at all.
    ///
    /// Model resolution uses this to tell an unreachable backend apart from
    /// one that simply does not serve the requested model.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_implemented_names_backend_and_option() {
        let err = LlmError::not_implemented("openai", "top_k");
        let msg = err.to_string();
        assert!(msg.contains("openai"));
        assert!(msg.contains("top_k"));
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(LlmError::not_found("gpt-x").kind(), ErrorKind::NotFound);
        assert_eq!(
            LlmError::BadParameter("bad".to_string()).kind(),
            ErrorKind::BadParameter
        );
        assert_eq!(
            LlmError::Backend("500".to_string()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(LlmError::Cancelled.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_is_unreachable() {
        assert!(LlmError::Network("connection refused".to_string()).is_unreachable());
        assert!(!LlmError::not_found("model").is_unreachable());
        assert!(!LlmError::Backend("server error".to_string()).is_unreachable());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: LlmError = serde_json::from_str::<serde_json::Value>("{bad")
            .unwrap_err()
            .into();
        assert!(matches!(err, LlmError::Serialization(_)));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::NotImplemented.to_string(), "not_implemented");
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }
}
