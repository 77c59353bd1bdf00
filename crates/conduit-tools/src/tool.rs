//! The [`Tool`] trait and its execution context.
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_tools::{Tool, ToolContext, ToolOutput, Toolkit};
//!
//! struct Clock;
//!
//! #[async_trait]
//! impl Tool for Clock {
//!     fn name(&self) -> &str { "clock" }
//!     fn description(&self) -> &str { "Current UTC time" }
//!     fn parameters(&self) -> Value { json!({"type": "object"}) }
//!
//!     async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
//!         Ok(ToolOutput::text("12:00"))
//!     }
//! }
//!
//! let mut toolkit = Toolkit::new();
//! toolkit.register(Clock);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use conduit_llm::ToolResult;

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Tool Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A caller-supplied function the model may invoke.
///
/// Each tool describes its input as a JSON Schema and executes
/// asynchronously. Execution errors are reported back to the model as tool
/// error blocks rather than failing the conversation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call this tool.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the tool's input.
    fn parameters(&self) -> serde_json::Value;

    /// Run the tool.
    ///
    /// `input` is the raw JSON the model produced; it is not validated
    /// against [`Tool::parameters`] before the call.
    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Context
// ─────────────────────────────────────────────────────────────────────────────

/// Context provided to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Session the call belongs to, if any.
    pub session_id: Option<String>,
    /// ID of the tool call being executed.
    pub call_id: Option<String>,
    /// Cancelled when the caller abandons the request.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    /// Create a context with a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that observes the caller's cancellation token.
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            ..Self::default()
        }
    }

    /// Attach the session this call runs in.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Derive the context for one call.
    pub fn for_call(&self, call_id: impl Into<String>) -> Self {
        Self {
            session_id: self.session_id.clone(),
            call_id: Some(call_id.into()),
            cancellation: self.cancellation.clone(),
        }
    }

    /// Check if execution has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Output
// ─────────────────────────────────────────────────────────────────────────────

/// What a tool returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Plain text output.
    Text(String),
    /// Structured output.
    Json(serde_json::Value),
    /// The tool handled the call but reports a failure to the model.
    Error(String),
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn json(content: serde_json::Value) -> Self {
        Self::Json(content)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Check if this output is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Attach the call identity, producing a result block payload.
    pub fn into_result(self, call_id: impl Into<String>, name: impl Into<String>) -> ToolResult {
        match self {
            Self::Text(text) => ToolResult::success(call_id, name, serde_json::Value::String(text)),
            Self::Json(value) => ToolResult::success(call_id, name, value),
            Self::Error(message) => ToolResult::error(call_id, name, message),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Tool
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::MockTool;

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use crate::error::ToolError;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// A tool with a scripted response that records every call.
    #[derive(Debug)]
    pub struct MockTool {
        name: String,
        description: String,
        parameters: serde_json::Value,
        response: Option<ToolOutput>,
        failure: Option<String>,
        delay: Option<Duration>,
        calls: Mutex<Vec<serde_json::Value>>,
    }

    impl MockTool {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                description: "A mock tool for testing".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {}
                }),
                response: None,
                failure: None,
                delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_description(mut self, description: impl Into<String>) -> Self {
            self.description = description.into();
            self
        }

        pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
            self.parameters = parameters;
            self
        }

        /// Return this output on every call.
        pub fn with_response(mut self, response: ToolOutput) -> Self {
            self.response = Some(response);
            self
        }

        /// Fail every call with an execution error.
        pub fn failing(mut self, message: impl Into<String>) -> Self {
            self.failure = Some(message.into());
            self
        }

        /// Sleep before answering.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Inputs received so far.
        pub fn calls(&self) -> Vec<serde_json::Value> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            &self.description
        }

        fn parameters(&self) -> serde_json::Value {
            self.parameters.clone()
        }

        async fn execute(&self, input: serde_json::Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            self.calls.lock().push(input);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(ref message) = self.failure {
                return Err(ToolError::execution(message.clone()));
            }
            Ok(self
                .response
                .clone()
                .unwrap_or_else(|| ToolOutput::text("mock response")))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
