//! OpenAI-compatible provider implementation.
//!
//! Works with any endpoint exposing the OpenAI `/v1/chat/completions`
//! dialect, including tool use / function calling.

use async_trait::async_trait;
use picoclaw_core::error::ProviderError;
use picoclaw_core::message::{Message, MessageToolCall, Role};
use picoclaw_core::provider::{
    Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// OpenRouter convenience constructor.
    pub fn openrouter(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Ollama convenience constructor; no real key needed.
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama",
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after_secs: 5 },
        401 | 403 => {
            ProviderError::AuthenticationFailed("provider rejected the configured API key".into())
        }
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

fn decode_error(what: &str, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::ApiError {
        status_code: 200,
        message: format!("{what}: {e}"),
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = ChatRequest::from_domain(&request);
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let http = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = http.status().as_u16();
        if !(200..300).contains(&status) {
            let text = http.text().await.unwrap_or_default();
            warn!(status, body = %text, "Provider returned error");
            return Err(status_error(status, text));
        }

        let chat: ChatResponse = http
            .json()
            .await
            .map_err(|e| decode_error("unreadable completion payload", e))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| decode_error("empty completion", "no choices"))?;

        Ok(ProviderResponse {
            message: choice.message.into_domain(),
            usage: chat.usage.map(WireUsage::into_domain),
            model: chat.model.unwrap_or(request.model),
        })
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

impl ChatRequest {
    fn from_domain(request: &ProviderRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(WireMessage::from_domain).collect(),
            temperature: request.temperature,
            stream: false,
            max_tokens: request.max_tokens,
            tools: request.tools.iter().map(WireTool::from_domain).collect(),
        }
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn from_domain(message: &Message) -> Self {
        Self {
            role: role_name(message.role),
            content: Some(message.content.clone()),
            tool_calls: message.tool_calls.iter().map(WireToolCall::from_domain).collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: FnCall,
}

impl WireToolCall {
    fn from_domain(call: &MessageToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: "function".into(),
            function: FnCall {
                name: call.name.clone(),
                // The wire format carries arguments as a JSON string
                arguments: call.arguments.to_string(),
            },
        }
    }

    fn into_domain(self) -> MessageToolCall {
        MessageToolCall {
            id: self.id,
            name: self.function.name,
            arguments: serde_json::from_str(&self.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({})),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct FnCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FnSchema,
}

impl WireTool {
    fn from_domain(tool: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: FnSchema {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct FnSchema {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

impl ChoiceMessage {
    fn into_domain(self) -> Message {
        Message::assistant_with_tool_calls(
            self.content.unwrap_or_default(),
            self.tool_calls.into_iter().map(WireToolCall::into_domain).collect(),
        )
    }
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl WireUsage {
    fn into_domain(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_maps_to_wire_format() {
        let mut request = ProviderRequest::new(
            "glm-4.7",
            vec![
                Message::system("rules"),
                Message::user("hi"),
                Message::assistant_with_tool_calls(
                    "",
                    vec![MessageToolCall {
                        id: "c1".into(),
                        name: "echo".into(),
                        arguments: serde_json::json!({"text": "ping"}),
                    }],
                ),
                Message::tool_result("c1", "ping"),
            ],
        );
        request.tools = vec![ToolDefinition {
            name: "echo".into(),
            description: "Echoes input".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];

        let wire = ChatRequest::from_domain(&request);
        assert_eq!(wire.model, "glm-4.7");
        assert!(!wire.stream);
        assert_eq!(wire.messages.len(), 4);
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[2].role, "assistant");
        // Arguments are JSON-encoded as a string on the wire
        assert_eq!(wire.messages[2].tool_calls[0].function.arguments, r#"{"text":"ping"}"#);
        assert_eq!(wire.messages[3].role, "tool");
        assert_eq!(wire.messages[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(wire.tools[0].kind, "function");
        assert_eq!(wire.tools[0].function.name, "echo");
    }

    #[test]
    fn request_serialization_omits_empty_fields() {
        let request = ProviderRequest::new("m", vec![Message::user("hi")]);
        let wire = ChatRequest::from_domain(&request);
        let json = serde_json::to_string(&wire).unwrap();
        assert!(!json.contains("max_tokens"));
        assert!(!json.contains("tools"));
        assert!(!json.contains("tool_call_id"));
    }

    #[test]
    fn response_parses_into_domain_message() {
        let raw = serde_json::json!({
            "model": "glm-4.7",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "message", "arguments": "{\"content\": \"hello\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });

        let chat: ChatResponse = serde_json::from_value(raw).unwrap();
        let usage = chat.usage.unwrap().into_domain();
        assert_eq!(usage.total_tokens, 15);

        let message = chat.choices.into_iter().next().unwrap().message.into_domain();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "");
        assert_eq!(message.tool_calls[0].id, "call_9");
        assert_eq!(message.tool_calls[0].arguments["content"], "hello");
    }

    #[test]
    fn malformed_arguments_fall_back_to_empty_object() {
        let call = WireToolCall {
            id: "c".into(),
            kind: "function".into(),
            function: FnCall {
                name: "echo".into(),
                arguments: "not json".into(),
            },
        };
        let domain = call.into_domain();
        assert!(domain.arguments.as_object().unwrap().is_empty());
    }

    #[test]
    fn status_errors_map_to_variants() {
        assert!(matches!(status_error(429, String::new()), ProviderError::RateLimited { .. }));
        assert!(matches!(
            status_error(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(500, "boom".into()),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider =
            OpenAiCompatProvider::new("test", "https://api.example.com/v1/", "key").unwrap();
        assert_eq!(provider.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
