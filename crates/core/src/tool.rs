//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world. The core
//! trait covers plain synchronous tools; capability seams (`as_contextual`,
//! `as_async`) let a tool opt into receiving the current channel/chat or
//! into deferred completion, detected at dispatch time rather than through
//! a class hierarchy.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A request to execute a tool.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// What the LLM sees on the next turn
    pub content: String,

    /// A distinct user-facing variant, when it differs from `content`
    pub display: Option<String>,

    /// Suppress user display entirely
    pub silent: bool,

    /// The real result arrives later via the completion callback
    pub is_async: bool,

    /// The tool failed; `content` carries the error text
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            display: None,
            silent: false,
            is_async: false,
            is_error: false,
        }
    }

    /// A successful result that is not shown to the user.
    pub fn silent(content: impl Into<String>) -> Self {
        Self {
            silent: true,
            ..Self::ok(content)
        }
    }

    /// An error result. Tool errors are never fatal to the loop; the model
    /// sees the error text and may self-correct.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::ok(content)
        }
    }

    /// An acknowledgment for an async tool whose real result arrives later.
    pub fn pending(content: impl Into<String>) -> Self {
        Self {
            is_async: true,
            silent: true,
            ..Self::ok(content)
        }
    }

    /// Attach a user-facing display variant.
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// The text to show the user, honoring the silent flag.
    pub fn display_text(&self) -> Option<&str> {
        if self.silent {
            return None;
        }
        Some(self.display.as_deref().unwrap_or(&self.content))
    }
}

/// Ambient context handed to contextual tools at dispatch time.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Channel the triggering message arrived on (e.g., "discord")
    pub channel: String,

    /// Chat/conversation identifier within the channel
    pub chat_id: String,

    /// Cancellation signal; tools are expected to honor it cooperatively
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Sender half of an async tool's completion callback.
pub type CompletionSender = tokio::sync::mpsc::UnboundedSender<ToolResult>;

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "message", "memory_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Contextual capability seam: a tool that needs the current channel and
    /// chat id returns `Some(self)` here.
    fn as_contextual(&self) -> Option<&dyn ContextualTool> {
        None
    }

    /// Async capability seam: a tool that completes later returns `Some(self)`.
    fn as_async(&self) -> Option<&dyn AsyncTool> {
        None
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A tool that receives the current channel/chat context.
#[async_trait]
pub trait ContextualTool: Send + Sync {
    async fn execute_in(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;
}

/// A tool that returns immediately and delivers its result via callback.
#[async_trait]
pub trait AsyncTool: Send + Sync {
    async fn start(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
        done: CompletionSender,
    ) -> std::result::Result<ToolResult, ToolError>;
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up and dispatch tools when the LLM requests them
///
/// Registries are cheap to clone in spirit: tools are shared `Arc`s, so a
/// filtered copy (e.g., for a subagent) reuses the same tool instances.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    default_timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout: None,
        }
    }

    /// Set the default per-tool timeout applied to every dispatch.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// One-line summaries for embedding in the system prompt.
    pub fn summaries(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .tools
            .values()
            .map(|t| format!("- **{}**: {}", t.name(), t.description()))
            .collect();
        lines.sort();
        lines
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A copy of this registry without the named tools. Used to compose
    /// subagent registries that exclude the spawn tools, preventing
    /// unbounded recursion.
    pub fn without(&self, excluded: &[&str]) -> Self {
        let tools = self
            .tools
            .iter()
            .filter(|(name, _)| !excluded.contains(&name.as_str()))
            .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
            .collect();
        Self {
            tools,
            default_timeout: self.default_timeout,
        }
    }

    /// Dispatch a tool call. Never returns `Err`: lookup failures, argument
    /// mismatches, timeouts, and tool failures are all wrapped as
    /// error-results so the loop can continue.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::error(format!("Tool not found: {}", call.name));
        };

        if let Err(reason) = validate_arguments(&tool.parameters_schema(), &call.arguments) {
            return ToolResult::error(format!("Invalid arguments for {}: {reason}", call.name));
        }

        let execution = async {
            match tool.as_contextual() {
                Some(contextual) => contextual.execute_in(ctx, call.arguments.clone()).await,
                None => tool.execute(call.arguments.clone()).await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                return ToolResult::error(format!("Tool cancelled: {}", call.name));
            }
            outcome = self.with_timeout(&call.name, execution) => outcome,
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(format!("Error: {e}"))
            }
        }
    }

    /// Dispatch a tool call that may complete asynchronously. If the tool
    /// implements the async capability, its acknowledgment is returned now
    /// and the delayed result arrives on `done`. Plain tools fall back to
    /// synchronous dispatch.
    pub async fn dispatch_async(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
        done: CompletionSender,
    ) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::error(format!("Tool not found: {}", call.name));
        };

        let Some(async_tool) = tool.as_async() else {
            return self.dispatch(call, ctx).await;
        };

        if let Err(reason) = validate_arguments(&tool.parameters_schema(), &call.arguments) {
            return ToolResult::error(format!("Invalid arguments for {}: {reason}", call.name));
        }

        match async_tool.start(ctx, call.arguments.clone(), done).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Async tool failed to start");
                ToolResult::error(format!("Error: {e}"))
            }
        }
    }

    async fn with_timeout<F>(
        &self,
        tool_name: &str,
        fut: F,
    ) -> std::result::Result<ToolResult, ToolError>
    where
        F: std::future::Future<Output = std::result::Result<ToolResult, ToolError>>,
    {
        match self.default_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ToolError::Timeout {
                    tool_name: tool_name.to_string(),
                    timeout_secs: timeout.as_secs(),
                }),
            },
            None => fut.await,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a JSON argument object against a tool's declared parameter
/// schema. Checks only the shape the catalog promises: the value is an
/// object, required properties are present, and declared property types
/// match. Deeper validation is each tool's own job.
fn validate_arguments(
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> std::result::Result<(), String> {
    let Some(args) = arguments.as_object() else {
        return Err("arguments must be a JSON object".into());
    };

    let properties = schema.get("properties").and_then(|p| p.as_object());

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !args.contains_key(key) {
                return Err(format!("missing required property: {key}"));
            }
        }
    }

    if let Some(properties) = properties {
        for (key, value) in args {
            let Some(declared) = properties.get(key) else {
                continue;
            };
            let Some(expected) = declared.get("type").and_then(|t| t.as_str()) else {
                continue;
            };
            if !json_type_matches(expected, value) {
                return Err(format!("property {key} must be of type {expected}"));
            }
        }
    }

    Ok(())
}

fn json_type_matches(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
