use crate::transport::{
    GenerationConfig, LlmError, LlmResponse, LlmResult, LlmTransport, Message, ProviderCharacteristics,
    ToolDefinition,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Deterministic, network-free `LlmTransport` for tests: returns a fixed
/// sequence of canned responses (optionally with tool calls), one per call,
/// then repeats the last response if the sequence is exhausted. A
/// "recorder-replayer" variant per Design Notes' polymorphism guidance.
pub struct MockTransport {
    responses: Mutex<Vec<LlmResponse>>,
    call_count: AtomicUsize,
    supports_tool_calls: bool,
}

impl MockTransport {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: AtomicUsize::new(0),
            supports_tool_calls: true,
        }
    }

    /// A transport that always returns the same plain-text JSON body, with
    /// no tool-call support — useful for exercising the static write path
    /// or a non-tool-calling provider.
    pub fn fixed_text(content: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(vec![LlmResponse {
                content: content.into(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
                prompt_tokens: Some(0),
                completion_tokens: Some(0),
            }]),
            call_count: AtomicUsize::new(0),
            supports_tool_calls: false,
        }
    }

    pub fn calls_made(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> LlmResponse {
        let responses = self.responses.lock().expect("mock transport poisoned");
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        if responses.is_empty() {
            return LlmResponse {
                content: "{}".to_string(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
                prompt_tokens: Some(0),
                completion_tokens: Some(0),
            };
        }
        responses[idx.min(responses.len() - 1)].clone()
    }
}

#[async_trait]
impl LlmTransport for MockTransport {
    async fn generate_chat(
        &self,
        _messages: &[Message],
        _config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        let mut response = self.next_response();
        response.tool_calls.clear();
        Ok(response)
    }

    async fn generate_chat_with_tools(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        if !self.supports_tool_calls {
            return Err(LlmError::Request(
                "mock transport configured without tool support".to_string(),
            ));
        }
        Ok(self.next_response())
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn characteristics(&self) -> ProviderCharacteristics {
        ProviderCharacteristics {
            max_tokens: 128_000,
            avg_latency_ms: 0,
            supports_tool_calls: self.supports_tool_calls,
            is_reasoning_tier: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_responses_in_order_then_repeats_last() {
        let transport = MockTransport::new(vec![
            LlmResponse {
                content: "first".to_string(),
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
            LlmResponse {
                content: "second".to_string(),
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
        ]);
        let config = GenerationConfig::default();
        let r1 = transport.generate_chat(&[], &config).await.unwrap();
        let r2 = transport.generate_chat(&[], &config).await.unwrap();
        let r3 = transport.generate_chat(&[], &config).await.unwrap();
        assert_eq!(r1.content, "first");
        assert_eq!(r2.content, "second");
        assert_eq!(r3.content, "second");
    }
}
