//! Core types shared by every backend.
//!
//! These types are provider-agnostic: backends translate them into their own
//! wire formats and back.

use serde::{Deserialize, Serialize};

/// Approximate characters per token, used when a backend reports no count.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a piece of text.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() / CHARS_PER_TOKEN) as u32
}

// ─────────────────────────────────────────────────────────────────────────────
// Models
// ─────────────────────────────────────────────────────────────────────────────

/// A model served by a provider.
///
/// Identity is the `(provider, name)` pair; the same name may be served by
/// several providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Model {
    /// Provider (backend) that owns the model.
    pub provider: String,
    /// Model name as the provider knows it.
    pub name: String,
}

impl Model {
    /// Create a new model descriptor.
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles and Results
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// How a generation step finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of response.
    #[default]
    Ok,
    /// Hit a stop sequence or token limit.
    Stop,
    /// The model wants tools executed.
    ToolCall,
    /// The tool loop ran out of iterations.
    MaxIterations,
}

// ─────────────────────────────────────────────────────────────────────────────
// Content Blocks
// ─────────────────────────────────────────────────────────────────────────────

/// A file or media attachment sent alongside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name, usually the file name.
    pub name: String,
    /// MIME type of the payload.
    pub mime_type: String,
    /// Base64-encoded payload.
    pub data: String,
}

impl Attachment {
    /// Create a new attachment.
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call, echoed back in the result.
    pub id: String,
    /// Name of the tool to run.
    pub name: String,
    /// Raw JSON input produced by the model.
    pub input: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Outcome carried by a [`ToolResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool succeeded with this payload.
    Output(serde_json::Value),
    /// The tool failed with this message.
    Error(String),
}

/// The result of running one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the call this answers.
    pub call_id: String,
    /// Name of the tool that ran.
    pub name: String,
    /// Payload or error.
    pub outcome: ToolOutcome,
}

impl ToolResult {
    /// Create a successful result.
    pub fn success(
        call_id: impl Into<String>,
        name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            outcome: ToolOutcome::Output(payload),
        }
    }

    /// Create an error result.
    pub fn error(
        call_id: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            outcome: ToolOutcome::Error(message.into()),
        }
    }

    /// Check if the tool failed.
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    /// Render the outcome as text for backends that only accept strings.
    pub fn to_text(&self) -> String {
        match &self.outcome {
            ToolOutcome::Output(serde_json::Value::String(s)) => s.clone(),
            ToolOutcome::Output(value) => value.to_string(),
            ToolOutcome::Error(message) => format!("Error: {}", message),
        }
    }
}

/// A block of message content. Exactly one kind per block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// An attached file.
    Attachment(Attachment),
    /// A tool invocation from the model.
    ToolCall(ToolCall),
    /// The result of a tool invocation.
    ToolResult(ToolResult),
}

impl ContentBlock {
    /// Create a text block.
    pub fn text(content: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: content.into(),
        }
    }

    /// Rough token estimate for this block.
    pub fn estimated_tokens(&self) -> u32 {
        match self {
            ContentBlock::Text { text } => estimate_tokens(text),
            ContentBlock::Attachment(attachment) => estimate_tokens(&attachment.data),
            ContentBlock::ToolCall(call) => {
                estimate_tokens(&call.name) + estimate_tokens(&call.input.to_string())
            }
            ContentBlock::ToolResult(result) => estimate_tokens(&result.to_text()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
    /// How the step that produced this message finished.
    #[serde(default)]
    pub result: FinishReason,
    /// Tokens attributed to this message.
    #[serde(default)]
    pub tokens: u32,
}

impl Message {
    /// Create a message with the given role and blocks.
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            result: FinishReason::Ok,
            tokens: 0,
        }
    }

    /// Create a user message with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    /// Create a user message with text and attachments.
    pub fn user_with_attachments(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let mut content = vec![ContentBlock::text(text)];
        content.extend(attachments.into_iter().map(ContentBlock::Attachment));
        Self::new(Role::User, content)
    }

    /// Create an assistant message with text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// Create an assistant message that requests tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::new(
            Role::Assistant,
            calls.into_iter().map(ContentBlock::ToolCall).collect(),
        )
        .with_result(FinishReason::ToolCall)
    }

    /// Create a tool message carrying results.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::new(
            Role::Tool,
            results.into_iter().map(ContentBlock::ToolResult).collect(),
        )
    }

    /// Set the finish reason.
    pub fn with_result(mut self, result: FinishReason) -> Self {
        self.result = result;
        self
    }

    /// Set the token count.
    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = tokens;
        self
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// All tool calls in this message, in order.
    pub fn calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolCall(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    /// Check if the message contains tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolCall(_)))
    }

    /// Rough token estimate across all blocks.
    pub fn estimated_tokens(&self) -> u32 {
        self.content.iter().map(ContentBlock::estimated_tokens).sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered, append-only message history.
///
/// The only non-append mutation is [`Conversation::truncate`], used to roll a
/// failed call back to a snapshot length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation(Vec<Message>);

impl Conversation {
    /// Create an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.0.push(message);
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop every message after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Remove and return every message from index `at` on.
    pub fn split_off(&mut self, at: usize) -> Vec<Message> {
        if at >= self.0.len() {
            return Vec::new();
        }
        self.0.split_off(at)
    }

    /// Sum of the token counts of all messages.
    pub fn tokens(&self) -> u32 {
        self.0.iter().fold(0, |sum, m| sum.saturating_add(m.tokens))
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    /// All messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    /// Iterate over messages in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }

    /// Split into history and the most recent message.
    pub fn split_last(&self) -> Option<(&Message, &[Message])> {
        self.0.split_last()
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self(messages)
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

/// Definition of a tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool.
    pub name: String,
    /// Description of what the tool does.
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usage
// ─────────────────────────────────────────────────────────────────────────────

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the input.
    pub input_tokens: u32,
    /// Tokens in the output.
    pub output_tokens: u32,
}

impl Usage {
    /// Create new usage statistics.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
