//! Capability contracts for model backends.
//!
//! A backend is a plain struct that implements [`Client`] and, optionally,
//! [`Generator`] and/or [`Embedder`]. Callers never downcast: they ask the
//! client for a capability with [`Client::as_generator`] or
//! [`Client::as_embedder`] and get `None` when it is missing.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  Client                      │
//! │  - name / list / get models  │
//! └──────────────────────────────┘
//!          │ as_generator()   │ as_embedder()
//!          ▼                  ▼
//!   ┌─────────────┐    ┌─────────────┐
//!   │  Generator  │    │  Embedder   │
//!   └─────────────┘    └─────────────┘
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::embeddings::Embedder;
use crate::error::{LlmError, Result};
use crate::options::{Dialect, GenerateOptions};
use crate::types::{Message, Model, ToolCall, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Progress events delivered to a stream callback.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of generated text.
    TextDelta(String),
    /// A chunk of model reasoning.
    ThinkingDelta(String),
    /// A tool call is about to be executed.
    ToolCall(ToolCall),
}

/// Callback invoked synchronously for each stream event.
///
/// Implementations must not block; they run on the task driving the call.
pub type StreamCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────────────────────────────────────

/// The output of a single generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// The message produced by the model.
    pub message: Message,
    /// Tokens consumed by this call.
    pub usage: Usage,
}

impl Generation {
    /// Create a generation from a message and its usage.
    pub fn new(message: Message, usage: Usage) -> Self {
        Self { message, usage }
    }

    /// A plain assistant text reply.
    pub fn text(text: impl Into<String>, usage: Usage) -> Self {
        let message = Message::assistant(text).with_tokens(usage.output_tokens);
        Self { message, usage }
    }

    /// An assistant reply requesting tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>, usage: Usage) -> Self {
        let message = Message::tool_calls(calls).with_tokens(usage.output_tokens);
        Self { message, usage }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability Traits
// ─────────────────────────────────────────────────────────────────────────────

/// The base contract every backend implements.
#[async_trait]
pub trait Client: Send + Sync {
    /// Name of this backend; also the provider name of its models.
    fn name(&self) -> &str;

    /// List every model this backend serves.
    async fn list_models(&self) -> Result<Vec<Model>>;

    /// Look up one model by name.
    ///
    /// Default: scans [`Client::list_models`] for an exact match.
    async fn get_model(&self, name: &str) -> Result<Model> {
        self.list_models()
            .await?
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| LlmError::not_found(format!("model '{}' on '{}'", name, self.name())))
    }

    /// Option encodings this backend expects, if it describes its own.
    fn dialect(&self) -> Option<Dialect> {
        None
    }

    /// Generation capability, if supported.
    fn as_generator(&self) -> Option<&dyn Generator> {
        None
    }

    /// Embedding capability, if supported.
    fn as_embedder(&self) -> Option<&dyn Embedder> {
        None
    }
}

/// Text generation, stateless or over a conversation.
#[async_trait]
pub trait Generator: Client {
    /// Generate a reply to a single message with no history.
    async fn without_session(
        &self,
        model: &str,
        message: &Message,
        options: &GenerateOptions,
    ) -> Result<Generation>;

    /// Generate a reply to `message` given the preceding `history`.
    async fn with_session(
        &self,
        model: &str,
        history: &[Message],
        message: &Message,
        options: &GenerateOptions,
    ) -> Result<Generation>;
}

/// A backend that can be shared across threads.
pub type SharedClient = Arc<dyn Client>;

impl std::fmt::Debug for dyn Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("name", &self.name()).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockBackend, MockRequest, MockResponse};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// A scripted reply from [`MockBackend`].
    #[derive(Debug, Clone)]
    pub enum MockResponse {
        /// Return this generation.
        Success(Generation),
        /// Fail with a backend error carrying this message.
        Error(String),
    }

    /// A request observed by [`MockBackend`].
    #[derive(Debug, Clone)]
    pub struct MockRequest {
        /// Model name passed by the caller.
        pub model: String,
        /// History passed alongside the message (empty for stateless calls).
        pub history: Vec<crate::types::Message>,
        /// The message being answered.
        pub message: crate::types::Message,
        /// Options after translation.
        pub options: GenerateOptions,
    }

    /// A mock backend for testing purposes.
    ///
    /// Returns pre-configured responses in order, useful for deterministic
    /// testing of the tool loop and model resolution.
    pub struct MockBackend {
        name: String,
        models: Vec<String>,
        responses: Mutex<VecDeque<MockResponse>>,
        repeat: Option<Generation>,
        requests: Mutex<Vec<MockRequest>>,
        list_error: Option<LlmError>,
        list_delay: Option<Duration>,
        list_calls: Mutex<usize>,
        dialect: Option<Dialect>,
    }

    impl MockBackend {
        /// Create a mock backend with the given name and no models.
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                models: Vec::new(),
                responses: Mutex::new(VecDeque::new()),
                repeat: None,
                requests: Mutex::new(Vec::new()),
                list_error: None,
                list_delay: None,
                list_calls: Mutex::new(0),
                dialect: None,
            }
        }

        /// Advertise these model names.
        pub fn with_models(mut self, models: &[&str]) -> Self {
            self.models = models.iter().map(|m| m.to_string()).collect();
            self
        }

        /// Queue successful generations, returned in order.
        pub fn with_responses(self, responses: Vec<Generation>) -> Self {
            self.with_results(responses.into_iter().map(MockResponse::Success).collect())
        }

        /// Queue scripted results, returned in order.
        pub fn with_results(self, results: Vec<MockResponse>) -> Self {
            self.responses.lock().extend(results);
            self
        }

        /// Return this generation whenever the queue is empty.
        pub fn repeating(mut self, generation: Generation) -> Self {
            self.repeat = Some(generation);
            self
        }

        /// Make model listing fail.
        pub fn with_list_error(mut self, error: LlmError) -> Self {
            self.list_error = Some(error);
            self
        }

        /// Delay model listing.
        pub fn with_list_delay(mut self, delay: Duration) -> Self {
            self.list_delay = Some(delay);
            self
        }

        /// Describe option encodings.
        pub fn with_dialect(mut self, dialect: Dialect) -> Self {
            self.dialect = Some(dialect);
            self
        }

        /// Every generation request received so far.
        pub fn requests(&self) -> Vec<MockRequest> {
            self.requests.lock().clone()
        }

        /// Number of generation requests received.
        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }

        /// Number of times the model list was queried.
        pub fn list_count(&self) -> usize {
            *self.list_calls.lock()
        }

        fn next(&self, request: MockRequest) -> Result<Generation> {
            self.requests.lock().push(request);
            match self.responses.lock().pop_front() {
                Some(MockResponse::Success(generation)) => Ok(generation),
                Some(MockResponse::Error(message)) => Err(LlmError::Backend(message)),
                None => self.repeat.clone().ok_or_else(|| {
                    LlmError::Backend("MockBackend: no more responses available".to_string())
                }),
            }
        }
    }

    impl std::fmt::Debug for MockBackend {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockBackend")
                .field("name", &self.name)
                .field("models", &self.models)
                .finish()
        }
    }

    #[async_trait]
    impl Client for MockBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_models(&self) -> Result<Vec<Model>> {
            *self.list_calls.lock() += 1;
            if let Some(delay) = self.list_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(ref err) = self.list_error {
                return Err(match err {
                    LlmError::Network(msg) => LlmError::Network(msg.clone()),
                    other => LlmError::Backend(other.to_string()),
                });
            }
            Ok(self
                .models
                .iter()
                .map(|m| Model::new(&self.name, m))
                .collect())
        }

        fn dialect(&self) -> Option<Dialect> {
            self.dialect.clone()
        }

        fn as_generator(&self) -> Option<&dyn Generator> {
            Some(self)
        }
    }

    #[async_trait]
    impl Generator for MockBackend {
        async fn without_session(
            &self,
            model: &str,
            message: &crate::types::Message,
            options: &GenerateOptions,
        ) -> Result<Generation> {
            self.next(MockRequest {
                model: model.to_string(),
                history: Vec::new(),
                message: message.clone(),
                options: options.clone(),
            })
        }

        async fn with_session(
            &self,
            model: &str,
            history: &[crate::types::Message],
            message: &crate::types::Message,
            options: &GenerateOptions,
        ) -> Result<Generation> {
            let generation = self.next(MockRequest {
                model: model.to_string(),
                history: history.to_vec(),
                message: message.clone(),
                options: options.clone(),
            })?;
            let text = generation.message.text();
            if !text.is_empty() {
                options.emit(StreamEvent::TextDelta(text));
            }
            Ok(generation)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
