use crate::transport::{
    FunctionCall, GenerationConfig, LlmError, LlmResponse, LlmResult, LlmTransport, Message,
    MessageRole, ProviderCharacteristics, ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an OpenAI-Responses-API-compatible provider: the only
/// shape in this crate that supports native tool calling, so it backs
/// adaptive write (§4.2.2) regardless of which tier it's configured for.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub organization: Option<String>,
}

impl Default for OpenAiCompatibleConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            timeout_secs: 120,
            max_retries: 3,
            organization: std::env::var("OPENAI_ORGANIZATION").ok(),
        }
    }
}

pub struct OpenAiCompatibleTransport {
    config: OpenAiCompatibleConfig,
    client: Client,
}

impl OpenAiCompatibleTransport {
    pub fn new(config: OpenAiCompatibleConfig) -> anyhow::Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("OpenAI-compatible API key is required. Set OPENAI_API_KEY.");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(OpenAiCompatibleConfig::default())
    }

    async fn send_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt - 1))).await;
            }
            match self.try_request(messages, tools, config).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt < self.config.max_retries {
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = self.config.max_retries + 1,
                            "OpenAI-compatible request failed, retrying"
                        );
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(LlmError::Request("all retry attempts failed".to_string())))
    }

    async fn try_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        let instructions = messages
            .iter()
            .find(|m| matches!(m.role, MessageRole::System))
            .map(|m| m.content.clone());

        let input = messages
            .iter()
            .filter(|m| !matches!(m.role, MessageRole::System))
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let responses_tools: Option<Vec<ResponsesApiTool>> = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| ResponsesApiTool {
                        tool_type: "function".to_string(),
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            )
        };

        let request = OpenAiRequest {
            model: self.config.model.clone(),
            input,
            instructions,
            max_completion_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            top_p: config.top_p,
            stop: config.stop.clone(),
            text: if config.json_mode {
                Some(TextConfig {
                    format: ResponseFormat {
                        format_type: "json_object".to_string(),
                    },
                })
            } else {
                None
            },
            tools: responses_tools,
        };

        let mut builder = self
            .client
            .post(format!("{}/responses", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(org) = &self.config.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited { retry_after_ms: 1000 });
        }
        let body = response.text().await.map_err(|e| LlmError::Response(e.to_string()))?;
        if !status.is_success() {
            if body.contains("context_length_exceeded") || body.contains("maximum context length") {
                return Err(LlmError::ContextLengthExceeded);
            }
            return Err(LlmError::Request(format!("OpenAI API error ({}): {}", status, body)));
        }

        tracing::debug!(model = %self.config.model, "raw OpenAI-compatible response");

        let parsed: OpenAiResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Response(e.to_string()))?;

        let tool_calls: Vec<ToolCall> = parsed
            .output
            .iter()
            .filter(|item| item.output_type == "function_call")
            .filter_map(|item| {
                Some(ToolCall {
                    id: item.call_id.clone()?,
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: item.name.clone()?,
                        arguments: item.arguments.clone()?,
                    },
                })
            })
            .collect();

        let content = parsed
            .output
            .iter()
            .filter(|item| item.output_type == "message")
            .flat_map(|item| item.content.iter())
            .filter_map(|c| c.text.clone())
            .collect::<Vec<_>>()
            .join("");

        let finish_reason = if !tool_calls.is_empty() {
            Some("tool_calls".to_string())
        } else {
            Some("stop".to_string())
        };

        Ok(LlmResponse {
            content,
            tool_calls,
            finish_reason,
            prompt_tokens: parsed.usage.as_ref().map(|u| u.input_tokens),
            completion_tokens: parsed.usage.as_ref().map(|u| u.output_tokens),
        })
    }
}

#[async_trait]
impl LlmTransport for OpenAiCompatibleTransport {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        self.send_request(messages, &[], config).await
    }

    async fn generate_chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        self.send_request(messages, tools, config).await
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }

    fn characteristics(&self) -> ProviderCharacteristics {
        ProviderCharacteristics {
            max_tokens: 128_000,
            avg_latency_ms: 800,
            supports_tool_calls: true,
            is_reasoning_tier: self.config.model.contains("o1") || self.config.model.contains("o3"),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponsesApiTool {
    #[serde(rename = "type")]
    tool_type: String,
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize)]
struct TextConfig {
    format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ResponsesApiTool>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    output_type: String,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_api_key() {
        let config = OpenAiCompatibleConfig {
            api_key: String::new(),
            ..OpenAiCompatibleConfig::default()
        };
        assert!(OpenAiCompatibleTransport::new(config).is_err());
    }
}
