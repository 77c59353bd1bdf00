//! Request and response types for gateway operations.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use conduit_llm::{
    Attachment, ContentBlock, FinishReason, GenOption, Message, Model, Role, Usage,
};
use conduit_session::{GeneratorMeta, NewSession, SessionId};

// ─────────────────────────────────────────────────────────────────────────────
// Ask
// ─────────────────────────────────────────────────────────────────────────────

/// A stateless generation request.
#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub meta: GeneratorMeta,
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Extra options applied after those derived from `meta`.
    pub options: Vec<GenOption>,
    pub cancel: CancellationToken,
}

impl AskRequest {
    pub fn new(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            meta: GeneratorMeta::new(model),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.meta.provider = provider.into();
        self
    }

    pub fn with_meta(mut self, meta: GeneratorMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_option(mut self, option: GenOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The reply to an [`AskRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskResponse {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub result: FinishReason,
    pub usage: Usage,
}

impl AskResponse {
    pub(crate) fn from_message(message: Message, usage: Usage) -> Self {
        Self {
            role: message.role,
            content: message.content,
            result: message.result,
            usage,
        }
    }

    /// Concatenated text content.
    pub fn text(&self) -> String {
        text_of(&self.content)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// The session a chat runs in.
#[derive(Debug, Clone)]
pub enum ChatTarget {
    /// Continue a stored session.
    Existing(SessionId),
    /// Create a session first, then chat in it.
    New(NewSession),
}

impl From<SessionId> for ChatTarget {
    fn from(id: SessionId) -> Self {
        ChatTarget::Existing(id)
    }
}

impl From<NewSession> for ChatTarget {
    fn from(new: NewSession) -> Self {
        ChatTarget::New(new)
    }
}

/// A stateful generation request with tool calling.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub target: ChatTarget,
    /// Overrides merged into the session's settings for this call only.
    pub meta: GeneratorMeta,
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Tool-loop budget; the gateway default when `None`.
    pub max_iterations: Option<u32>,
    /// Restrict the toolkit to these tools.
    pub tools: Option<Vec<String>>,
    pub options: Vec<GenOption>,
    pub cancel: CancellationToken,
}

impl ChatRequest {
    pub fn new(target: impl Into<ChatTarget>, text: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            meta: GeneratorMeta::default(),
            text: text.into(),
            attachments: Vec::new(),
            max_iterations: None,
            tools: None,
            options: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_meta(mut self, meta: GeneratorMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_tools<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.tools = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_option(mut self, option: GenOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The reply to a [`ChatRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub result: FinishReason,
    pub session_id: SessionId,
    /// Summed over every backend call of the tool loop.
    pub usage: Usage,
}

impl ChatResponse {
    pub(crate) fn from_message(message: Message, session_id: SessionId, usage: Usage) -> Self {
        Self {
            role: message.role,
            content: message.content,
            result: message.result,
            session_id,
            usage,
        }
    }

    pub fn text(&self) -> String {
        text_of(&self.content)
    }
}

fn text_of(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Embeddings
// ─────────────────────────────────────────────────────────────────────────────

/// Embed one or more texts.
#[derive(Debug, Clone, Default)]
pub struct EmbedRequest {
    pub provider: Option<String>,
    pub model: String,
    pub texts: Vec<String>,
    pub options: Vec<GenOption>,
    pub cancel: CancellationToken,
}

impl EmbedRequest {
    pub fn new<S: Into<String>>(model: impl Into<String>, texts: impl IntoIterator<Item = S>) -> Self {
        Self {
            model: model.into(),
            texts: texts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Embedding vectors, one per input text in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedResponse {
    pub model: Model,
    pub vectors: Vec<Vec<f64>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Models
// ─────────────────────────────────────────────────────────────────────────────

/// One page of models across backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelPage {
    pub models: Vec<Model>,
    /// Number of models before pagination.
    pub total: usize,
    /// Every registered backend name.
    pub known_providers: Vec<String>,
}
