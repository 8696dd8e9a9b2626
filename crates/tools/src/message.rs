//! The `message` tool.
//!
//! Lets the model push a message to the user's channel mid-turn. The tool
//! is contextual: it needs the current channel and chat id to address the
//! delivery. The loop records successful deliveries so a final assistant
//! message with the same content is not emitted twice.

use async_trait::async_trait;
use picoclaw_core::{
    ContextualTool, OutboundMessage, Tool, ToolContext, ToolError, ToolResult,
};
use tokio::sync::mpsc;
use tracing::debug;

pub struct MessageTool {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

impl MessageTool {
    pub fn new(outbound: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user immediately, before your turn finishes. Use this for progress updates during long multi-step work."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The message text to deliver"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        // Only reachable if dispatched without context
        Err(ToolError::ExecutionFailed {
            tool_name: "message".into(),
            reason: "no channel context available".into(),
        })
    }

    fn as_contextual(&self) -> Option<&dyn ContextualTool> {
        Some(self)
    }
}

#[async_trait]
impl ContextualTool for MessageTool {
    async fn execute_in(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;

        if ctx.channel.is_empty() || ctx.chat_id.is_empty() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "message".into(),
                reason: "no channel context available".into(),
            });
        }

        self.outbound
            .send(OutboundMessage {
                channel: ctx.channel.clone(),
                chat_id: ctx.chat_id.clone(),
                content: content.to_string(),
            })
            .map_err(|_| ToolError::ExecutionFailed {
                tool_name: "message".into(),
                reason: "outbound channel closed".into(),
            })?;

        debug!(channel = %ctx.channel, chat_id = %ctx.chat_id, "Message delivered via tool");
        Ok(ToolResult::silent("Message sent"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_context_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tool = MessageTool::new(tx);

        let ctx = ToolContext::new("discord", "chat-7");
        let result = tool
            .execute_in(&ctx, serde_json::json!({"content": "progress: 50%"}))
            .await
            .unwrap();

        assert!(result.silent);
        let out = rx.recv().await.unwrap();
        assert_eq!(out.channel, "discord");
        assert_eq!(out.chat_id, "chat-7");
        assert_eq!(out.content, "progress: 50%");
    }

    #[tokio::test]
    async fn missing_context_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let tool = MessageTool::new(tx);

        let err = tool
            .execute_in(&ToolContext::default(), serde_json::json!({"content": "x"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no channel context"));
    }

    #[tokio::test]
    async fn plain_execute_rejects() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let tool = MessageTool::new(tx);
        assert!(tool.execute(serde_json::json!({"content": "x"})).await.is_err());
    }
}
