//! Memory tools.
//!
//! `memory_read`, `memory_write`, and `memory_append` operate on the
//! file-based memory store, resolving per-user paths through a
//! [`UserIdProvider`] seam (which keeps this crate independent of the
//! agent loop's user-binding mechanics).

use async_trait::async_trait;
use picoclaw_agent::MemoryStore;
use picoclaw_core::{Tool, ToolError, ToolResult};
use std::sync::Arc;

/// Supplies the user bound to the turn in flight. Empty means shared memory.
pub trait UserIdProvider: Send + Sync {
    fn current_user_id(&self) -> String;
}

/// A fixed user id, mainly for tests and one-shot CLI runs.
impl UserIdProvider for String {
    fn current_user_id(&self) -> String {
        self.clone()
    }
}

fn user_label(user_id: &str) -> String {
    if user_id.is_empty() {
        "shared".to_string()
    } else {
        format!("user {user_id}")
    }
}

/// Reads the current user's long-term memory and recent daily notes.
pub struct MemoryReadTool {
    store: Arc<MemoryStore>,
    users: Arc<dyn UserIdProvider>,
}

impl MemoryReadTool {
    pub fn new(store: Arc<MemoryStore>, users: Arc<dyn UserIdProvider>) -> Self {
        Self { store, users }
    }
}

#[async_trait]
impl Tool for MemoryReadTool {
    fn name(&self) -> &str {
        "memory_read"
    }

    fn description(&self) -> &str {
        "Read the current user's memory (long-term memory and recent daily notes)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let user_id = self.users.current_user_id();
        let context = self.store.memory_context(&user_id);
        if context.is_empty() {
            return Ok(ToolResult::ok("# Memory\n\nNo memory data found for this user."));
        }
        Ok(ToolResult::ok(context))
    }
}

/// Writes (overwrite or append) the current user's long-term MEMORY.md.
pub struct MemoryWriteTool {
    store: Arc<MemoryStore>,
    users: Arc<dyn UserIdProvider>,
}

impl MemoryWriteTool {
    pub fn new(store: Arc<MemoryStore>, users: Arc<dyn UserIdProvider>) -> Self {
        Self { store, users }
    }
}

#[async_trait]
impl Tool for MemoryWriteTool {
    fn name(&self) -> &str {
        "memory_write"
    }

    fn description(&self) -> &str {
        "Write content to the current user's long-term memory file (MEMORY.md). Use overwrite mode to replace the entire file, or append mode to add to the end."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Content to write to MEMORY.md"
                },
                "mode": {
                    "type": "string",
                    "description": "Write mode: 'overwrite' to replace the entire file, 'append' to add to the end (default: 'overwrite')",
                    "enum": ["overwrite", "append"]
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;
        let mode = arguments
            .get("mode")
            .and_then(|v| v.as_str())
            .unwrap_or("overwrite");

        let user_id = self.users.current_user_id();
        let data = if mode == "append" {
            let existing = self.store.read_long_term(&user_id);
            format!("{existing}\n{content}")
        } else {
            content.to_string()
        };

        self.store
            .write_long_term(&user_id, &data)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "memory_write".into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult::silent(format!(
            "Memory updated for {} (mode: {mode})",
            user_label(&user_id)
        )))
    }
}

/// Appends to the current user's today daily note.
pub struct MemoryAppendTool {
    store: Arc<MemoryStore>,
    users: Arc<dyn UserIdProvider>,
}

impl MemoryAppendTool {
    pub fn new(store: Arc<MemoryStore>, users: Arc<dyn UserIdProvider>) -> Self {
        Self { store, users }
    }
}

#[async_trait]
impl Tool for MemoryAppendTool {
    fn name(&self) -> &str {
        "memory_append"
    }

    fn description(&self) -> &str {
        "Append content to the current user's today daily note. Creates a new file with a date header if it doesn't exist."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Content to append to today's daily note"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;

        let user_id = self.users.current_user_id();
        self.store
            .append_today(&user_id, content)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "memory_append".into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult::silent(format!(
            "Daily note updated for {}",
            user_label(&user_id)
        )))
    }
}
