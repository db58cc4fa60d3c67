use crate::usage_tracker::RagUsageTracker;
use docgraph_ai::schemas::{ModuleDocData, ReviewData};
use docgraph_ai::{
    parse_structured, retrieval_tools, GenerationConfig, LlmTransport, Message, RetrievalToolExecutor,
};
use docgraph_core::{
    DocGraphError, KeyFunction, ModuleArtifact, ModuleId, OrchestratorConfig, Result, SccContext,
};
use docgraph_retrieval::{CodeChunk, RetrievalService};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Transient, single-task-owned state threaded through the module state
/// machine. Created at dispatch, mutated only by the owning task, never
/// aliased across tasks.
#[derive(Debug, Clone)]
pub struct ModuleTaskState {
    pub module_id: ModuleId,
    pub dependencies: Vec<ModuleId>,
    pub dependency_artifacts: Vec<ModuleArtifact>,
    pub scc_context: Option<Arc<SccContext>>,
    pub code_chunks: Vec<CodeChunk>,
    pub rag_context: Option<String>,
    pub draft: Option<ModuleDocData>,
    pub review_passed: bool,
    pub reviewer_feedback: String,
    pub retry_count: u32,
    pub tool_calls_made: u32,
    pub expanded_context: Option<String>,
}

impl ModuleTaskState {
    pub fn new(
        module_id: ModuleId,
        dependencies: Vec<ModuleId>,
        dependency_artifacts: Vec<ModuleArtifact>,
        scc_context: Option<Arc<SccContext>>,
    ) -> Self {
        Self {
            module_id,
            dependencies,
            dependency_artifacts,
            scc_context,
            code_chunks: Vec::new(),
            rag_context: None,
            draft: None,
            review_passed: false,
            reviewer_feedback: String::new(),
            retry_count: 0,
            tool_calls_made: 0,
            expanded_context: None,
        }
    }
}

/// Whether a module is documented via one up-front LLM call (`Static`) or
/// via a multi-turn tool-calling conversation (`Adaptive`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Static,
    Adaptive,
}

/// Per-module state machine: retrieve → write → review → retry.
pub struct ModulePipeline {
    retrieval: Arc<dyn RetrievalService>,
    transport: Arc<dyn LlmTransport>,
    config: Arc<OrchestratorConfig>,
    semaphore: Arc<Semaphore>,
    tracker: Option<Arc<RagUsageTracker>>,
    write_mode: WriteMode,
}

impl ModulePipeline {
    pub fn new(
        retrieval: Arc<dyn RetrievalService>,
        transport: Arc<dyn LlmTransport>,
        config: Arc<OrchestratorConfig>,
        semaphore: Arc<Semaphore>,
        write_mode: WriteMode,
    ) -> Self {
        Self {
            retrieval,
            transport,
            config,
            semaphore,
            tracker: None,
            write_mode,
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<RagUsageTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    fn tool_executor(&self) -> RetrievalToolExecutor {
        let mut executor = RetrievalToolExecutor::new(self.retrieval.clone());
        if let Some(tracker) = &self.tracker {
            executor = executor.with_tracker(tracker.clone());
        }
        executor
    }

    #[tracing::instrument(skip(self, dependency_artifacts, scc_context), fields(module = %module_id))]
    pub async fn run(
        &self,
        module_id: ModuleId,
        dependencies: Vec<ModuleId>,
        dependency_artifacts: Vec<ModuleArtifact>,
        scc_context: Option<Arc<SccContext>>,
    ) -> Result<ModuleArtifact> {
        let mut state = ModuleTaskState::new(module_id.clone(), dependencies, dependency_artifacts, scc_context);

        // RETRIEVING
        self.retrieve(&mut state).await?;

        // WRITING + REVIEWING + RETRY
        let max_attempts = self.config.module_retries + 1;
        for attempt in 0..max_attempts {
            state.retry_count = attempt;
            self.write(&mut state).await?;
            let passed = self.review(&mut state).await?;
            if passed {
                return Ok(self.emit_artifact(&state, false));
            }
            if attempt + 1 >= max_attempts {
                tracing::warn!(module = %module_id, "review retries exhausted; emitting degraded artifact");
                return Ok(self.emit_artifact(&state, true));
            }
        }

        // Unreachable given max_attempts >= 1, but keeps the compiler happy
        // about an exhaustive return.
        Ok(self.emit_artifact(&state, true))
    }

    async fn retrieve(&self, state: &mut ModuleTaskState) -> Result<()> {
        let retrieval = self.retrieval.clone();
        let module_id = state.module_id.clone();
        let fut = async move { retrieval.search_module_top_k(&module_id, 20).await };

        match tokio::time::timeout(self.config.retrieve_timeout, fut).await {
            Ok(chunks) => {
                state.code_chunks = chunks;
                Ok(())
            }
            Err(_) => Err(DocGraphError::RetrieveTimeout {
                module: state.module_id.to_string(),
                timeout_secs: self.config.retrieve_timeout.as_secs(),
            }),
        }
    }

    async fn write(&self, state: &mut ModuleTaskState) -> Result<()> {
        match self.write_mode {
            WriteMode::Static => self.static_write(state).await,
            WriteMode::Adaptive => self.adaptive_write(state).await,
        }
    }

    /// §4.2.1: context assembled up-front, one LLM call.
    async fn static_write(&self, state: &mut ModuleTaskState) -> Result<()> {
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");

        let dependency_context = format_dependency_context(&state.dependency_artifacts, &state.scc_context);
        let code_context: String = state
            .code_chunks
            .iter()
            .map(|c| c.text.clone())
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            "Module: {}\nDependencies: {}\n\n{}\n\nSource:\n{}\n",
            state.module_id,
            state.dependencies.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "),
            dependency_context,
            code_context,
        );
        if !state.reviewer_feedback.is_empty() {
            prompt.push_str(&format!("\nReviewer feedback from the previous attempt: {}\n", state.reviewer_feedback));
        }
        if let Some(expanded) = &state.expanded_context {
            prompt.push_str(&format!("\nAdditional context gathered for revision:\n{}\n", expanded));
        }
        prompt.push_str(
            "\nRespond with JSON: {\"summary\": str, \"responsibility\": str, \
             \"key_functions\": [{\"name\": str, \"purpose\": str}], \
             \"dependency_usage\": str, \"exports\": [str]}",
        );

        let messages = vec![
            Message::system("You document a single source module as structured JSON."),
            Message::user(prompt),
        ];

        let response = self
            .transport
            .generate_chat(&messages, &GenerationConfig { json_mode: true, ..Default::default() })
            .await
            .map_err(|e| DocGraphError::WriteFailed {
                module: state.module_id.to_string(),
                source: Box::new(e),
            })?;

        state.draft = Some(parse_doc_or_wrap(&response.content));
        Ok(())
    }

    /// §4.2.2: minimal initial context, multi-turn tool-calling conversation.
    async fn adaptive_write(&self, state: &mut ModuleTaskState) -> Result<()> {
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");

        let tools = retrieval_tools();
        let executor = self.tool_executor();

        let dependency_context = format_dependency_context(&state.dependency_artifacts, &state.scc_context);
        let entity_names: Vec<String> = state
            .code_chunks
            .iter()
            .filter_map(|c| c.entity_name.clone())
            .collect();
        let docstring = extract_docstring(&state.code_chunks);

        let mut initial_prompt = format!(
            "Module: {}\nDependencies: {}\n{}\n\nDocstring: {}\nKnown entities: {}\n{}\n",
            state.module_id,
            state.dependencies.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "),
            dependency_context,
            docstring.unwrap_or_else(|| "(none)".to_string()),
            entity_names.join(", "),
            state
                .rag_context
                .as_deref()
                .map(|c| format!("Supplementary context:\n{c}\n"))
                .unwrap_or_default(),
        );
        if !state.reviewer_feedback.is_empty() {
            initial_prompt.push_str(&format!("\nReviewer feedback from the previous attempt: {}\n", state.reviewer_feedback));
        }
        if let Some(expanded) = &state.expanded_context {
            initial_prompt.push_str(&format!("\nAdditional context gathered for revision:\n{}\n", expanded));
        }
        initial_prompt.push_str(
            "\nUse the available tools to gather whatever source you need, then respond with \
             JSON: {\"summary\": str, \"responsibility\": str, \
             \"key_functions\": [{\"name\": str, \"purpose\": str}], \
             \"dependency_usage\": str, \"exports\": [str]}",
        );

        let mut messages = vec![Message::user(initial_prompt)];
        let max_turns = self.config.max_turns;

        for turn in 0..max_turns {
            let response = self
                .transport
                .generate_chat_with_tools(&messages, &tools, &GenerationConfig::default())
                .await
                .map_err(|e| DocGraphError::WriteFailed {
                    module: state.module_id.to_string(),
                    source: Box::new(e),
                })?;

            if response.has_tool_calls() {
                let mut assistant_msg = Message::assistant(response.content.clone());
                assistant_msg.tool_calls = response.tool_calls.clone();
                messages.push(assistant_msg);

                for call in &response.tool_calls {
                    let arguments: serde_json::Value =
                        serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null);
                    let result = executor
                        .execute(&state.module_id, turn as usize, &call.function.name, &arguments)
                        .await;
                    messages.push(Message::tool_result(call.id.clone(), result));
                }
                state.tool_calls_made = turn + 1;
                continue;
            }

            state.draft = Some(parse_doc_or_wrap(&response.content));
            state.tool_calls_made = turn + 1;
            return Ok(());
        }

        state.draft = Some(ModuleDocData {
            summary: "(Max tool rounds reached)".to_string(),
            responsibility: String::new(),
            key_functions: Vec::new(),
            dependency_usage: String::new(),
            exports: Vec::new(),
        });
        state.tool_calls_made = max_turns;
        Ok(())
    }

    /// §4.2.3: produce `{ passed, feedback }`, bounded by a hard timeout.
    /// A timeout is treated as a failed review and — per the documented
    /// decision in DESIGN.md — consumes a retry attempt.
    async fn review(&self, state: &mut ModuleTaskState) -> Result<bool> {
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");

        let draft = state.draft.as_ref().expect("write must run before review");
        let code_context: String = state
            .code_chunks
            .iter()
            .map(|c| c.text.clone())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Review this module documentation draft against its source.\n\nDraft:\n{}\n\nSource:\n{}\n\n\
             Respond with JSON: {{\"passed\": bool, \"feedback\": str}}",
            serde_json::to_string(draft).unwrap_or_default(),
            code_context,
        );
        let messages = vec![
            Message::system("You are a meticulous documentation reviewer."),
            Message::user(prompt),
        ];

        let transport = self.transport.clone();
        let config = GenerationConfig { json_mode: true, ..Default::default() };
        let fut = async move { transport.generate_chat(&messages, &config).await };

        match tokio::time::timeout(self.config.review_timeout, fut).await {
            Ok(Ok(response)) => match parse_structured::<ReviewData>(&response.content) {
                Ok(review) => {
                    state.review_passed = review.passed;
                    state.reviewer_feedback = review.feedback;
                    if !review.passed
                        && self.write_mode == WriteMode::Adaptive
                        && self.config.adaptive_auto_expand
                    {
                        self.expand_context(state).await;
                    }
                    Ok(review.passed)
                }
                Err(raw) => {
                    state.review_passed = false;
                    state.reviewer_feedback = raw;
                    Ok(false)
                }
            },
            Ok(Err(e)) => {
                state.review_passed = false;
                state.reviewer_feedback = format!("reviewer transport error: {e}");
                Ok(false)
            }
            Err(_) => {
                state.review_passed = false;
                state.reviewer_feedback = "timed out".to_string();
                Ok(false)
            }
        }
    }

    /// §4.2.3 adaptive auto-expand: pull the entities the reviewer called
    /// out as missing or unexplained via the same tools the adaptive
    /// writer uses, and stash the results for the next write attempt.
    async fn expand_context(&self, state: &mut ModuleTaskState) {
        let entities = extract_missing_entities(&state.reviewer_feedback);
        if entities.is_empty() {
            return;
        }

        let executor = self.tool_executor();
        let turn = state.tool_calls_made as usize;
        let mut blocks = Vec::new();
        for entity in &entities {
            let usages = executor
                .execute(
                    &state.module_id,
                    turn,
                    "find_usage_patterns",
                    &serde_json::json!({"entity_name": entity, "limit": 3}),
                )
                .await;
            blocks.push(usages);

            let details = executor
                .execute(
                    &state.module_id,
                    turn,
                    "get_function_details",
                    &serde_json::json!({"module": state.module_id.to_string(), "function_name": entity}),
                )
                .await;
            blocks.push(details);
        }
        state.tool_calls_made += 1;
        state.expanded_context = Some(blocks.join("\n\n"));
    }

    fn emit_artifact(&self, state: &ModuleTaskState, degraded: bool) -> ModuleArtifact {
        let draft = state.draft.clone().unwrap_or(ModuleDocData {
            summary: String::new(),
            responsibility: String::new(),
            key_functions: Vec::new(),
            dependency_usage: String::new(),
            exports: Vec::new(),
        });
        ModuleArtifact {
            module_id: state.module_id.clone(),
            summary: draft.summary,
            responsibility: draft.responsibility,
            key_functions: draft
                .key_functions
                .into_iter()
                .map(|f| KeyFunction { name: f.name, purpose: f.purpose })
                .collect(),
            dependency_usage: draft.dependency_usage,
            exports: draft.exports,
            degraded,
        }
    }
}

fn format_dependency_context(
    dependency_artifacts: &[ModuleArtifact],
    scc_context: &Option<Arc<SccContext>>,
) -> String {
    let mut blocks = Vec::new();
    if let Some(scc) = scc_context {
        blocks.push(format!("[SCC Architecture Context]\n{}", scc.text));
    }
    if dependency_artifacts.is_empty() {
        blocks.push("[Dependency Documentation]\nNone".to_string());
    } else {
        for artifact in dependency_artifacts {
            blocks.push(format!(
                "[Dependency Documentation]\n{}: {}",
                artifact.module_id, artifact.summary
            ));
        }
    }
    blocks.join("\n\n")
}

static ENTITY_MENTION: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"`([A-Za-z_][A-Za-z0-9_]*)`").unwrap());

/// Extracts entity names the reviewer flagged as missing or unexplained.
/// Reviewer feedback names entities the same way the tool results do
/// (backtick-quoted identifiers, see `tools.rs`), so that convention is
/// reused here rather than inventing a separate format.
fn extract_missing_entities(feedback: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ENTITY_MENTION
        .captures_iter(feedback)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .take(5)
        .collect()
}

fn extract_docstring(chunks: &[CodeChunk]) -> Option<String> {
    let first = chunks.first()?;
    for quote in ["\"\"\"", "'''", "///", "//!"] {
        if let Some(idx) = first.text.find(quote) {
            let rest = &first.text[idx + quote.len()..];
            let candidate = rest.lines().next().unwrap_or("").trim();
            if candidate.len() > 10 {
                return Some(candidate.chars().take(500).collect());
            }
        }
    }
    None
}

/// Parses the draft JSON; on failure, wraps the raw model text so the
/// pipeline still produces something rather than failing the module.
fn parse_doc_or_wrap(raw: &str) -> ModuleDocData {
    match parse_structured::<ModuleDocData>(raw) {
        Ok(data) => data,
        Err(_) => ModuleDocData {
            summary: raw.to_string(),
            responsibility: String::new(),
            key_functions: Vec::new(),
            dependency_usage: String::new(),
            exports: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_ai::providers::mock::MockTransport;
    use docgraph_retrieval::InMemoryRetrievalService;

    fn doc_response() -> String {
        serde_json::json!({
            "summary": "does useful things",
            "responsibility": "core logic",
            "key_functions": [{"name": "run", "purpose": "entry point"}],
            "dependency_usage": "none",
            "exports": ["run"]
        })
        .to_string()
    }

    fn passing_review() -> String {
        serde_json::json!({"passed": true, "feedback": ""}).to_string()
    }

    #[tokio::test]
    async fn static_write_produces_artifact_on_first_pass() {
        let mut retrieval = InMemoryRetrievalService::new();
        retrieval.add_module(ModuleId::new("m"), "fn run() {}\n");
        let transport = Arc::new(MockTransport::new(vec![
            docgraph_ai::LlmResponse {
                content: doc_response(),
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
            docgraph_ai::LlmResponse {
                content: passing_review(),
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
        ]));
        let config = Arc::new(OrchestratorConfig::default());
        let semaphore = Arc::new(Semaphore::new(4));
        let pipeline = ModulePipeline::new(
            Arc::new(retrieval),
            transport,
            config,
            semaphore,
            WriteMode::Static,
        );

        let artifact = pipeline
            .run(ModuleId::new("m"), vec![], vec![], None)
            .await
            .unwrap();
        assert_eq!(artifact.summary, "does useful things");
        assert!(!artifact.degraded);
    }

    #[tokio::test]
    async fn retrieve_timeout_fails_the_module() {
        let retrieval = InMemoryRetrievalService::new();
        let transport = Arc::new(MockTransport::fixed_text(doc_response()));
        let mut config = OrchestratorConfig::default();
        config.retrieve_timeout = std::time::Duration::from_nanos(1);
        let config = Arc::new(config);
        let semaphore = Arc::new(Semaphore::new(4));
        let pipeline = ModulePipeline::new(
            Arc::new(retrieval),
            transport,
            config,
            semaphore,
            WriteMode::Static,
        );

        let result = pipeline.run(ModuleId::new("slow"), vec![], vec![], None).await;
        assert!(matches!(result, Err(DocGraphError::RetrieveTimeout { .. })));
    }

    #[tokio::test]
    async fn exhausted_retries_emit_degraded_artifact() {
        let mut retrieval = InMemoryRetrievalService::new();
        retrieval.add_module(ModuleId::new("m"), "fn run() {}\n");
        let failing_review = serde_json::json!({"passed": false, "feedback": "needs work"}).to_string();
        let transport = Arc::new(MockTransport::new(vec![
            docgraph_ai::LlmResponse {
                content: doc_response(),
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
            docgraph_ai::LlmResponse {
                content: failing_review,
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
        ]));
        let mut config = OrchestratorConfig::default();
        config.module_retries = 1;
        let config = Arc::new(config);
        let semaphore = Arc::new(Semaphore::new(4));
        let pipeline = ModulePipeline::new(
            Arc::new(retrieval),
            transport,
            config,
            semaphore,
            WriteMode::Static,
        );

        let artifact = pipeline.run(ModuleId::new("m"), vec![], vec![], None).await.unwrap();
        assert!(artifact.degraded);
    }

    #[tokio::test]
    async fn adaptive_review_failure_expands_context_and_retries() {
        let mut retrieval = InMemoryRetrievalService::new();
        retrieval.add_module(
            ModuleId::new("m"),
            "fn foo() {}\n\nfn caller() {\n    foo();\n}\n",
        );
        let failing_review =
            serde_json::json!({"passed": false, "feedback": "`foo` is used but never explained"}).to_string();
        let transport = Arc::new(MockTransport::new(vec![
            docgraph_ai::LlmResponse {
                content: doc_response(),
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
            docgraph_ai::LlmResponse {
                content: failing_review,
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
            docgraph_ai::LlmResponse {
                content: doc_response(),
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
            docgraph_ai::LlmResponse {
                content: passing_review(),
                tool_calls: Vec::new(),
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
            },
        ]));
        let mut config = OrchestratorConfig::default();
        config.module_retries = 1;
        config.adaptive_auto_expand = true;
        let config = Arc::new(config);
        let semaphore = Arc::new(Semaphore::new(4));
        let pipeline = ModulePipeline::new(
            Arc::new(retrieval),
            transport,
            config,
            semaphore,
            WriteMode::Adaptive,
        );

        let artifact = pipeline.run(ModuleId::new("m"), vec![], vec![], None).await.unwrap();
        assert!(!artifact.degraded);
        assert_eq!(artifact.summary, "does useful things");
    }

    #[test]
    fn extract_missing_entities_pulls_backtick_names() {
        let feedback = "`foo` is referenced but `Bar` is undocumented; also `foo` again.";
        let entities = extract_missing_entities(feedback);
        assert_eq!(entities, vec!["foo".to_string(), "Bar".to_string()]);
    }
}
