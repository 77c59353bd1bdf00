//! Error types for session storage.

use conduit_llm::ErrorKind;

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session with this id.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Malformed id, filter or update.
    #[error("Invalid session request: {0}")]
    BadParameter(String),

    /// Storage I/O failed.
    #[error("Session storage error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be encoded or decoded.
    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadParameter(_) => ErrorKind::BadParameter,
            Self::Io(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, SessionError>;
