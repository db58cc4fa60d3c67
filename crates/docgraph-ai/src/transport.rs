use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error type surfaced by `LlmTransport` implementations. Transport errors
/// are always recoverable from the orchestrator's point of view — they
/// drive the retry/backoff policy in §7, never a panic.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("transport request failed: {0}")]
    Request(String),
    #[error("transport response could not be parsed: {0}")]
    Response(String),
    #[error("transport rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("context length exceeded")]
    ContextLengthExceeded,
    #[error("request timed out")]
    Timeout,
}

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        write!(f, "{}", s)
    }
}

/// One message in a tool-calling conversation. Modeled as a flat struct
/// (rather than an enum per role) because assistant messages carrying tool
/// calls and tool-result messages both need to round-trip through a single
/// ordered `Vec<Message>` history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

/// Per-request generation parameters. Mirrors the two capability tiers
/// (fast / reasoning) by carrying an optional `reasoning_effort` that
/// reasoning-tier providers may honor and fast-tier providers ignore.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: Option<usize>,
    pub stop: Option<Vec<String>>,
    pub reasoning_effort: Option<String>,
    pub json_mode: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: None,
            max_tokens: None,
            stop: None,
            reasoning_effort: None,
            json_mode: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_final(&self) -> bool {
        !self.has_tool_calls()
    }
}

/// Static capabilities of a provider, used to choose tiers and to decide
/// whether the adaptive tool-calling path is available at all.
#[derive(Debug, Clone)]
pub struct ProviderCharacteristics {
    pub max_tokens: usize,
    pub avg_latency_ms: u64,
    pub supports_tool_calls: bool,
    pub is_reasoning_tier: bool,
}

/// External collaborator for LLM text and tool-call completion. Two
/// concrete tiers (fast / reasoning) are selected at the call site by
/// choosing which `LlmTransport` instance to invoke; this trait doesn't
/// encode tiering itself, mirroring how the module pipeline picks a tier
/// per phase.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Single-turn chat completion, ignoring tool calls even if the
    /// provider supports them.
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse>;

    /// Chat completion with tools advertised. Providers that don't support
    /// native tool calling fall back to `generate_chat` and log a warning;
    /// the caller always gets a response, possibly with an empty
    /// `tool_calls` list.
    async fn generate_chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        if !tools.is_empty() {
            tracing::warn!(
                provider = self.provider_name(),
                "provider does not override generate_chat_with_tools; tools will be ignored"
            );
        }
        self.generate_chat(messages, config).await
    }

    fn provider_name(&self) -> &str;

    fn characteristics(&self) -> ProviderCharacteristics;
}
