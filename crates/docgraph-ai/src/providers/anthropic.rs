use crate::transport::{
    GenerationConfig, LlmError, LlmResponse, LlmResult, LlmTransport, Message, MessageRole,
    ProviderCharacteristics,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";

/// Configuration for the Anthropic Claude provider, read from environment
/// variables the way every provider in this crate does.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub context_window: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            context_window: 200_000,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

/// Anthropic Claude transport. Used for the fast, non-tool-calling tier
/// (plan generation, review, folder summaries); adaptive write needs the
/// tool-calling provider instead, since this API surface here doesn't
/// advertise tools.
pub struct AnthropicTransport {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicTransport {
    pub fn new(config: AnthropicConfig) -> anyhow::Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("Anthropic API key is required. Set ANTHROPIC_API_KEY.");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(AnthropicConfig::default())
    }

    async fn send_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LlmResult<AnthropicResponse> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self.try_request(messages, config).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt < self.config.max_retries {
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = self.config.max_retries + 1,
                            "Anthropic request failed, retrying"
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
        config: &GenerationConfig,
    ) -> LlmResult<AnthropicResponse> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .filter(|m| !matches!(m.role, MessageRole::System))
                .map(|m| AnthropicMessage {
                    role: match m.role {
                        MessageRole::User | MessageRole::Tool => "user".to_string(),
                        MessageRole::Assistant => "assistant".to_string(),
                        MessageRole::System => "user".to_string(),
                    },
                    content: m.content.clone(),
                })
                .collect(),
            system: messages
                .iter()
                .find(|m| matches!(m.role, MessageRole::System))
                .map(|m| m.content.clone()),
            max_tokens: config.max_tokens.unwrap_or(4096),
            temperature: Some(config.temperature),
            top_p: config.top_p,
            stop_sequences: config.stop.clone(),
        };

        let response = self
            .client
            .post(format!("{}/messages", ANTHROPIC_API_BASE))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited { retry_after_ms: 1000 });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if text.contains("context_length") || text.contains("too long") {
                return Err(LlmError::ContextLengthExceeded);
            }
            return Err(LlmError::Request(format!("Anthropic API error ({}): {}", status, text)));
        }

        response
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| LlmError::Response(e.to_string()))
    }
}

#[async_trait]
impl LlmTransport for AnthropicTransport {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        let response = self.send_request(messages, config).await?;
        let content = response
            .content
            .iter()
            .filter_map(|c| {
                if c.content_type == "text" {
                    Some(c.text.as_deref().unwrap_or(""))
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            content,
            tool_calls: Vec::new(),
            finish_reason: Some(response.stop_reason),
            prompt_tokens: Some(response.usage.input_tokens),
            completion_tokens: Some(response.usage.output_tokens),
        })
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn characteristics(&self) -> ProviderCharacteristics {
        let max_tokens = match self.config.model.as_str() {
            m if m.contains("opus") || m.contains("sonnet") || m.contains("haiku") => 200_000,
            _ => self.config.context_window,
        };
        ProviderCharacteristics {
            max_tokens,
            avg_latency_ms: 1000,
            supports_tool_calls: false,
            is_reasoning_tier: self.config.model.contains("opus"),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct AnthropicResponse {
    id: String,
    #[serde(rename = "type")]
    response_type: String,
    role: String,
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: String,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_reads_api_key_from_env() {
        std::env::set_var("ANTHROPIC_API_KEY", "test-key");
        let config = AnthropicConfig::default();
        std::env::remove_var("ANTHROPIC_API_KEY");
        assert_eq!(config.api_key, "test-key");
    }

    #[test]
    fn provider_creation_requires_api_key() {
        let config = AnthropicConfig {
            api_key: String::new(),
            ..AnthropicConfig::default()
        };
        assert!(AnthropicTransport::new(config).is_err());
    }
}
