//! Session chat and the tool-calling loop.
//!
//! A chat appends the user's message to the session, then alternates model
//! turns with tool execution until the model stops asking for tools or the
//! iteration budget runs out:
//!
//! ```text
//! resolve ─► generate ─┬─► done ─► persist
//!                      │
//!                      └─► tool calls ─► run_all ─► generate ─► ...
//!                                   (budget spent) ─► rollback ─► error
//! ```
//!
//! Nothing is written to the store unless the loop finishes cleanly. Even
//! then only the new messages are appended, so settings changed by a
//! concurrent update survive the chat.
//!
//! # Structured output with tools
//!
//! Some backends cannot honour a response schema while function calling is
//! enabled. When a chat has both, the schema is offered as the input schema
//! of a synthetic [`OUTPUT_TOOL`] instead. The model's call to that tool is
//! the answer: the loop stops and records a plain assistant message holding
//! the call's raw JSON input.

use tracing::{debug, info, warn};

use conduit_llm::{
    Conversation, FinishReason, Generation, GenerateOptions, Generator, Message, Role,
    StreamCallback, ToolDefinition, Usage,
};
use conduit_session::{Session, Turn};
use conduit_tools::{ToolContext, Toolkit};

use crate::error::{GatewayError, Result};
use crate::gateway::{Gateway, cancellable, meta_options, user_message};
use crate::request::{ChatRequest, ChatResponse, ChatTarget};

/// Name of the synthetic tool that carries structured output.
pub const OUTPUT_TOOL: &str = "submit_output";

const OUTPUT_TOOL_DESCRIPTION: &str =
    "Submit the final answer. The input is the answer itself and must match this schema.";

const OUTPUT_INSTRUCTION: &str = "When you have the final answer, call the submit_output tool \
     with the answer as its input. Do not reply with plain text.";

fn output_tool(schema: serde_json::Value) -> ToolDefinition {
    ToolDefinition::new(OUTPUT_TOOL, OUTPUT_TOOL_DESCRIPTION, schema)
}

fn with_output_instruction(system_prompt: &str) -> String {
    if system_prompt.is_empty() {
        OUTPUT_INSTRUCTION.to_string()
    } else {
        format!("{}\n\n{}", system_prompt, OUTPUT_INSTRUCTION)
    }
}

impl Gateway {
    /// Send a message within a session, running tools the model asks for.
    ///
    /// On success every message the chat produced, including intermediate
    /// tool-call and tool-result messages, is appended to the stored
    /// session. When the budget is exhausted the call fails with
    /// [`GatewayError::MaxIterations`] and the stored session is left as it
    /// was; cancellation behaves the same way but reports
    /// [`GatewayError::Cancelled`]. A session created by this call is
    /// removed again if the chat fails.
    pub async fn chat(
        &self,
        request: ChatRequest,
        stream: Option<StreamCallback>,
    ) -> Result<ChatResponse> {
        let (session, created) = match request.target.clone() {
            ChatTarget::Existing(id) => (self.store.get(&id).await?, false),
            ChatTarget::New(new) => (self.create_session(new).await?, true),
        };
        let session_id = session.id;

        let result = self.converse(session, request, stream).await;
        if result.is_err() && created {
            match self.store.delete(&session_id).await {
                Ok(()) => debug!(%session_id, "Discarded session of failed chat"),
                Err(e) => warn!(%session_id, error = %e, "Failed to discard session of failed chat"),
            }
        }
        result
    }

    async fn converse(
        &self,
        mut session: Session,
        request: ChatRequest,
        stream: Option<StreamCallback>,
    ) -> Result<ChatResponse> {
        let ChatRequest {
            target: _,
            meta: overrides,
            text,
            attachments,
            max_iterations,
            tools,
            options: extra,
            cancel,
        } = request;

        let session_id = session.id;
        let mut meta = session.meta.merge(&overrides);

        let (model, client) = self
            .resolver
            .resolve(self.provider_hint(&meta.provider), &meta.model, &cancel)
            .await?;
        let generator = client
            .as_generator()
            .ok_or_else(|| GatewayError::not_implemented(client.name(), "generation"))?;

        let restricted;
        let toolkit: &Toolkit = match tools {
            Some(ref names) => {
                restricted = self.toolkit.restricted_to(names.as_slice())?;
                &restricted
            }
            None => self.toolkit.as_ref(),
        };

        let mut definitions = toolkit.definitions();
        let structured = meta.response_format.is_some() && !definitions.is_empty();
        if structured {
            if let Some(schema) = meta.response_format.take() {
                definitions.push(output_tool(schema));
            }
            meta.system_prompt = with_output_instruction(&meta.system_prompt);
        }

        let options = self.translator.translate(
            &meta_options(&meta, definitions, stream.clone(), &extra),
            client.name(),
        )?;
        let limit = max_iterations.unwrap_or(self.max_iterations);

        info!(
            %session_id,
            provider = %model.provider,
            model = %model.name,
            max_iterations = limit,
            tool_count = toolkit.len(),
            structured,
            "Chat started"
        );

        let snapshot = session.snapshot();
        session.append(user_message(text, attachments));

        let ctx = ToolContext::with_cancellation(cancel.clone()).with_session(session_id.to_string());
        let tool_loop = ToolLoop {
            generator,
            model: &model.name,
            options: &options,
            toolkit,
            ctx: &ctx,
            stream: stream.as_ref(),
            limit,
            structured,
        };

        match tool_loop.run(&mut session).await {
            Ok(finished) => {
                let turn = Turn::new(session.messages.split_off(snapshot), finished.last_input);
                let stored = self.store.append(&session_id, turn).await?;
                debug!(
                    %session_id,
                    messages = stored.messages.len(),
                    overhead = stored.overhead,
                    "Session updated"
                );

                info!(
                    %session_id,
                    iterations = finished.iterations,
                    input_tokens = finished.usage.input_tokens,
                    output_tokens = finished.usage.output_tokens,
                    "Chat completed"
                );
                Ok(ChatResponse::from_message(
                    finished.message,
                    session_id,
                    finished.usage,
                ))
            }
            Err(e) => {
                session.rollback(snapshot);
                warn!(%session_id, error = %e, "Chat failed, conversation rolled back");
                Err(e)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Loop
// ─────────────────────────────────────────────────────────────────────────────

struct Finished {
    message: Message,
    usage: Usage,
    /// Input tokens reported by the final backend call.
    last_input: u32,
    iterations: u32,
}

struct ToolLoop<'a> {
    generator: &'a dyn Generator,
    model: &'a str,
    options: &'a GenerateOptions,
    toolkit: &'a Toolkit,
    ctx: &'a ToolContext,
    stream: Option<&'a StreamCallback>,
    limit: u32,
    structured: bool,
}

impl ToolLoop<'_> {
    /// Drive the conversation until the model stops calling tools.
    ///
    /// Iterations run strictly one after another; only the calls within
    /// one iteration run concurrently.
    async fn run(&self, session: &mut Session) -> Result<Finished> {
        let mut usage = Usage::default();
        let mut iterations = 0u32;

        loop {
            debug!(
                session_id = %session.id,
                iteration = iterations,
                messages = session.messages.len(),
                "Calling backend"
            );
            let generation = self.generate(&session.messages).await?;
            usage += generation.usage;
            let last_input = generation.usage.input_tokens;

            let mut message = generation.message;
            if message.tokens == 0 {
                message.tokens = generation.usage.output_tokens;
            }

            let calls = if message.result == FinishReason::ToolCall {
                message.calls()
            } else {
                Vec::new()
            };

            if calls.is_empty() || self.toolkit.is_empty() {
                session.append(message.clone());
                return Ok(Finished {
                    message,
                    usage,
                    last_input,
                    iterations,
                });
            }

            if self.structured
                && let Some(output) = calls.iter().find(|c| c.name == OUTPUT_TOOL)
            {
                debug!(session_id = %session.id, call_id = %output.id, "Structured output received");
                let answer = Message::assistant(output.input.to_string()).with_tokens(message.tokens);
                session.append(answer.clone());
                return Ok(Finished {
                    message: answer,
                    usage,
                    last_input,
                    iterations,
                });
            }

            if iterations >= self.limit {
                warn!(
                    session_id = %session.id,
                    limit = self.limit,
                    "Max iterations exceeded"
                );
                return Err(GatewayError::MaxIterations {
                    limit: self.limit,
                    message: Box::new(message.with_result(FinishReason::MaxIterations)),
                });
            }
            iterations += 1;

            debug!(
                session_id = %session.id,
                iteration = iterations,
                tool_count = calls.len(),
                "Executing tool calls"
            );
            session.append(message);

            let blocks = self.toolkit.run_all(&calls, self.ctx, self.stream).await;
            if self.ctx.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            let results = Message::new(Role::Tool, blocks);
            let tokens = results.estimated_tokens();
            session.append(results.with_tokens(tokens));
        }
    }

    async fn generate(&self, conversation: &Conversation) -> Result<Generation> {
        let (message, history) = conversation
            .split_last()
            .ok_or_else(|| GatewayError::Internal("conversation is empty".to_string()))?;
        cancellable(
            &self.ctx.cancellation,
            self.generator
                .with_session(self.model, history, message, self.options),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_instruction_appended() {
        assert_eq!(with_output_instruction(""), OUTPUT_INSTRUCTION);
        let prompt = with_output_instruction("Be brief.");
        assert!(prompt.starts_with("Be brief.\n\n"));
        assert!(prompt.ends_with(OUTPUT_INSTRUCTION));
    }

    #[test]
    fn test_output_tool_uses_schema() {
        let schema = serde_json::json!({"type": "object", "required": ["city"]});
        let tool = output_tool(schema.clone());
        assert_eq!(tool.name, OUTPUT_TOOL);
        assert_eq!(tool.input_schema, schema);
    }
}
