//! Shared fixtures for gateway integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use conduit_domain::Gateway;
use conduit_llm::{Generation, MockBackend, ToolCall, Usage};
use conduit_session::{GeneratorMeta, NewSession, SessionId};
use conduit_tools::Toolkit;
use serde_json::Value;

/// Backend name with a built-in dialect that accepts every standard option.
pub const PROVIDER: &str = "gemini";

pub const MODEL: &str = "test-model";

pub fn call(id: &str, name: &str, input: Value) -> ToolCall {
    ToolCall::new(id, name, input)
}

/// A tool-call reply.
pub fn tool_reply(calls: Vec<ToolCall>) -> Generation {
    Generation::tool_calls(calls, Usage::new(20, 5))
}

/// A plain text reply.
pub fn text_reply(text: &str) -> Generation {
    Generation::text(text, Usage::new(30, 4))
}

pub fn backend() -> MockBackend {
    MockBackend::new(PROVIDER).with_models(&[MODEL])
}

pub fn gateway(backend: Arc<MockBackend>, toolkit: Toolkit) -> Gateway {
    Gateway::builder()
        .with_client(backend)
        .with_toolkit(toolkit)
        .build()
        .unwrap()
}

pub async fn new_session(gateway: &Gateway, meta: GeneratorMeta) -> SessionId {
    gateway
        .create_session(NewSession::new(meta))
        .await
        .unwrap()
        .id
}

pub async fn session_len(gateway: &Gateway, id: &SessionId) -> usize {
    gateway.get_session(id).await.unwrap().messages.len()
}
