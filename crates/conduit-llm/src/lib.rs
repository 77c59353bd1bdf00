//! Backend abstraction for Conduit.
//!
//! This crate defines what a model backend looks like to the gateway: the
//! capability contracts a backend implements, the provider-agnostic message
//! model, and the option translator that turns generic generation options into
//! backend-native ones.
//!
//! # Architecture
//!
//! ```text
//! caller options ──► Translator ──► GenerateOptions ──► Generator
//!   (GenOption)       (Dialect)      (Setting list)     (backend)
//! ```
//!
//! Backends are plain structs implementing [`Client`] plus any of
//! [`Generator`] and [`Embedder`]. Capabilities are discovered at runtime
//! through [`Client::as_generator`] and [`Client::as_embedder`].

pub mod backend;
pub mod embeddings;
pub mod error;
pub mod options;
pub mod types;

pub use backend::{Client, Generation, Generator, SharedClient, StreamCallback, StreamEvent};
pub use embeddings::Embedder;
pub use error::{ErrorKind, LlmError, Result};
pub use options::{
    Deferred, Dialect, Encoding, Feature, GenOption, GenerateOptions, Setting, ThinkingStyle,
    Translator,
};
pub use types::{
    Attachment, ContentBlock, Conversation, FinishReason, Message, Model, Role, ToolCall,
    ToolDefinition, ToolOutcome, ToolResult, Usage, estimate_tokens,
};

#[cfg(any(test, feature = "testing"))]
pub use backend::{MockBackend, MockRequest, MockResponse};
#[cfg(any(test, feature = "testing"))]
pub use embeddings::MockEmbedder;
