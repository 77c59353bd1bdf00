//! The toolkit: registered tools and their concurrent execution.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use conduit_llm::{ContentBlock, StreamCallback, StreamEvent, ToolCall, ToolDefinition, ToolResult};

use crate::error::{Result, ToolError};
use crate::tool::{Tool, ToolContext, ToolOutput};

/// Public description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool's input.
    pub parameters: serde_json::Value,
}

impl ToolInfo {
    fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
        }
    }
}

/// Registry of tools available to a tool loop.
///
/// Cloning is cheap: tools are shared behind `Arc`.
#[derive(Default, Clone)]
pub struct Toolkit {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Toolkit {
    /// Create an empty toolkit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Builder form of [`Toolkit::register_arc`].
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register_arc(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions for the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition::new(tool.name(), tool.description(), tool.parameters()))
            .collect()
    }

    /// Descriptions of all tools, sorted by name.
    pub fn list(&self) -> Vec<ToolInfo> {
        self.names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolInfo::of(tool.as_ref()))
            .collect()
    }

    /// Description of one tool.
    pub fn info(&self, name: &str) -> Result<ToolInfo> {
        self.tools
            .get(name)
            .map(|tool| ToolInfo::of(tool.as_ref()))
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// A toolkit limited to the named tools.
    ///
    /// Every name must be registered; the first unknown name fails with
    /// [`ToolError::NotFound`].
    pub fn restricted_to<S: AsRef<str>>(&self, names: &[S]) -> Result<Toolkit> {
        let mut tools = HashMap::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let tool = self
                .tools
                .get(name)
                .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
            tools.insert(name.to_string(), Arc::clone(tool));
        }
        Ok(Toolkit { tools })
    }

    /// Execute one tool outside any conversation.
    pub async fn call(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(ToolError::Cancelled),
            output = tool.execute(input, ctx) => output,
        }
    }

    /// Execute every call concurrently.
    ///
    /// Returns one tool-result block per call, in the same order as `calls`
    /// regardless of completion order. The stream callback sees each call
    /// before any of them starts. Unknown tools and tool failures become
    /// error blocks so the model can react to them.
    pub async fn run_all(
        &self,
        calls: &[ToolCall],
        ctx: &ToolContext,
        stream: Option<&StreamCallback>,
    ) -> Vec<ContentBlock> {
        if let Some(callback) = stream {
            for call in calls {
                callback(StreamEvent::ToolCall(call.clone()));
            }
        }

        let results = join_all(calls.iter().map(|call| self.run_one(call, ctx))).await;
        results.into_iter().map(ContentBlock::ToolResult).collect()
    }

    async fn run_one(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Model called unknown tool");
            return ToolResult::error(
                &call.id,
                &call.name,
                format!("Tool not found: {}", call.name),
            );
        };

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        let call_ctx = ctx.for_call(&call.id);
        let outcome = tokio::select! {
            biased;
            _ = call_ctx.cancellation.cancelled() => Err(ToolError::Cancelled),
            output = tool.execute(call.input.clone(), &call_ctx) => output,
        };

        match outcome {
            Ok(output) => {
                if output.is_error() {
                    debug!(tool = %call.name, call_id = %call.id, "Tool reported an error");
                }
                output.into_result(&call.id, &call.name)
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
                ToolResult::error(&call.id, &call.name, e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
