use docgraph_ai::{parse_structured, GenerationConfig, LlmError, LlmTransport, Message};
use docgraph_ai::schemas::SccOverviewData;
use docgraph_core::{truncate_chars, ModuleId, OrchestratorConfig, SccContext, SccId};
use docgraph_retrieval::RetrievalService;
use std::sync::Arc;
use std::time::Duration;

const SIGNATURE_ONLY_THRESHOLD: usize = 15;
const MID_SIZE_THRESHOLD: usize = 10;
const SIGNATURE_ONLY_CAP: usize = 2_000;
const MID_SIZE_CAP: usize = 3_000;
const MIN_BUDGET_CHARS: usize = 500;

/// Produces one shared architectural context string per non-trivial SCC so
/// its members can be documented without each re-deriving the group's
/// collective responsibility.
pub struct CycleContextBuilder {
    retrieval: Arc<dyn RetrievalService>,
    transport: Arc<dyn LlmTransport>,
    config: Arc<OrchestratorConfig>,
}

impl CycleContextBuilder {
    pub fn new(
        retrieval: Arc<dyn RetrievalService>,
        transport: Arc<dyn LlmTransport>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            retrieval,
            transport,
            config,
        }
    }

    /// Returns `None` for singleton "SCCs" and when all retries are
    /// exhausted due to context-length errors; dependent modules then
    /// proceed without SCC context.
    pub async fn build(&self, scc_id: SccId, members: &[ModuleId]) -> Option<SccContext> {
        if members.len() <= 1 {
            return None;
        }

        let sources = self.collect_sources(members).await;
        let mut budget_chars = self.per_member_budget(members.len());

        for attempt in 0..self.config.scc_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }

            let member_blocks = self.render_member_blocks(members, &sources, budget_chars);
            let prompt = build_prompt(members, &member_blocks);
            let messages = vec![
                Message::system(
                    "You analyze a group of mutually-dependent source modules and describe \
                     their collective architecture as JSON.",
                ),
                Message::user(prompt),
            ];

            match self
                .transport
                .generate_chat(&messages, &GenerationConfig {
                    json_mode: true,
                    ..GenerationConfig::default()
                })
                .await
            {
                Ok(response) => {
                    let text = format_scc_context(&response.content);
                    return Some(SccContext {
                        scc_id,
                        member_ids: members.to_vec(),
                        text,
                    });
                }
                Err(LlmError::ContextLengthExceeded) => {
                    budget_chars = (budget_chars / 2).max(MIN_BUDGET_CHARS);
                    tracing::warn!(
                        scc = %scc_id,
                        attempt = attempt + 1,
                        new_budget = budget_chars,
                        "SCC context too long, halving per-member budget and retrying"
                    );
                }
                Err(e) => {
                    tracing::warn!(scc = %scc_id, error = %e, "SCC context generation failed");
                }
            }
        }

        tracing::warn!(scc = %scc_id, "SCC context generation exhausted retries; proceeding without it");
        None
    }

    async fn collect_sources(&self, members: &[ModuleId]) -> Vec<(ModuleId, String)> {
        let mut sources = Vec::with_capacity(members.len());
        for member in members {
            let source = self.retrieval.module_source(member).await.unwrap_or_default();
            sources.push((member.clone(), source));
        }
        sources
    }

    fn per_member_budget(&self, scc_size: usize) -> usize {
        let even_share = self.config.scc_budget_chars / scc_size.max(1);
        if scc_size > SIGNATURE_ONLY_THRESHOLD {
            even_share.min(SIGNATURE_ONLY_CAP)
        } else if scc_size > MID_SIZE_THRESHOLD {
            even_share.min(MID_SIZE_CAP)
        } else {
            even_share
        }
    }

    fn render_member_blocks(
        &self,
        members: &[ModuleId],
        sources: &[(ModuleId, String)],
        budget_chars: usize,
    ) -> String {
        let signature_only = members.len() > SIGNATURE_ONLY_THRESHOLD;
        let mut out = String::new();
        for (module, source) in sources {
            let text = if signature_only {
                extract_signatures(source, budget_chars)
            } else {
                truncate_chars(source, budget_chars)
            };
            out.push_str(&format!("### {}\n```\n{}\n```\n\n", module, text));
        }
        out
    }
}

/// Signature-only extraction for large SCCs: keeps declaration lines,
/// drops bodies, matching the "class/function declarations without
/// bodies" mode for SCCs over the signature-only threshold.
fn extract_signatures(source: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("fn ")
            || trimmed.starts_with("pub fn ")
            || trimmed.starts_with("async fn ")
            || trimmed.starts_with("pub async fn ")
            || trimmed.starts_with("struct ")
            || trimmed.starts_with("pub struct ")
            || trimmed.starts_with("enum ")
            || trimmed.starts_with("trait ")
            || trimmed.starts_with("impl ")
        {
            out.push_str(line);
            out.push('\n');
        }
        if out.chars().count() >= max_chars {
            break;
        }
    }
    truncate_chars(&out, max_chars)
}

fn build_prompt(members: &[ModuleId], member_blocks: &str) -> String {
    format!(
        "The following {} modules form a strongly connected dependency cycle:\n{}\n\n\
         Source of each member:\n\n{}\n\n\
         Respond with JSON: {{\"cycle_pattern\": str, \"collective_responsibility\": str, \
         \"interdependency_explanation\": str, \"key_abstractions\": [str], \
         \"entry_points\": [str], \"utilities\": [str], \"concerns\": [str], \"summary\": str}}",
        members.len(),
        members.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(", "),
        member_blocks
    )
}

/// Formats the parsed SCC overview into a stable human-readable block; on
/// parse failure, degrades to wrapping the raw model text (§7's
/// structured-output-parse-failure policy).
fn format_scc_context(raw_response: &str) -> String {
    match parse_structured::<SccOverviewData>(raw_response) {
        Ok(data) => {
            let abstractions = data.key_abstractions.join(", ");
            let entry_points = data.entry_points.join(", ");
            let utilities = data.utilities.join(", ");
            let concerns = data
                .concerns
                .iter()
                .map(|c| format!("  - {c}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "## Cycle Architecture: {}\n\n\
                 **Pattern:** {}\n\n\
                 **Collective Responsibility:** {}\n\n\
                 **Interdependency Explanation:** {}\n\n\
                 **Key Abstractions:** {}\n\n\
                 **Entry Points:** {}\n\n\
                 **Utilities:** {}\n\n\
                 **Architectural Concerns:**\n{}\n\n\
                 **Summary:** {}\n",
                data.cycle_pattern,
                data.cycle_pattern,
                data.collective_responsibility,
                data.interdependency_explanation,
                if abstractions.is_empty() { "None".to_string() } else { abstractions },
                if entry_points.is_empty() { "None".to_string() } else { entry_points },
                if utilities.is_empty() { "None".to_string() } else { utilities },
                if concerns.is_empty() { "  - None".to_string() } else { concerns },
                data.summary,
            )
        }
        Err(_) => format!("Cycle Architecture Overview:\n{}\n", raw_response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_ai::providers::mock::MockTransport;
    use docgraph_retrieval::InMemoryRetrievalService;

    fn scc_response() -> String {
        serde_json::json!({
            "cycle_pattern": "mutual recursion",
            "collective_responsibility": "parse and evaluate expressions",
            "interdependency_explanation": "x calls y and y calls x",
            "key_abstractions": ["Expr"],
            "entry_points": ["x::eval"],
            "utilities": [],
            "concerns": [],
            "summary": "a tight two-module evaluator"
        })
        .to_string()
    }

    #[tokio::test]
    async fn singleton_scc_returns_none() {
        let retrieval = Arc::new(InMemoryRetrievalService::new());
        let transport = Arc::new(MockTransport::fixed_text(scc_response()));
        let config = Arc::new(OrchestratorConfig::default());
        let builder = CycleContextBuilder::new(retrieval, transport, config);

        let result = builder.build(SccId(0), &[ModuleId::new("solo")]).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn two_cycle_builds_shared_context() {
        let mut service = InMemoryRetrievalService::new();
        service.add_module(ModuleId::new("x"), "fn eval() { y_call(); }\n");
        service.add_module(ModuleId::new("y"), "fn y_call() { }\n");
        let retrieval = Arc::new(service);
        let transport = Arc::new(MockTransport::fixed_text(scc_response()));
        let config = Arc::new(OrchestratorConfig::default());
        let builder = CycleContextBuilder::new(retrieval, transport, config);

        let members = vec![ModuleId::new("x"), ModuleId::new("y")];
        let context = builder.build(SccId(0), &members).await.unwrap();
        assert_eq!(context.member_ids, members);
        assert!(context.text.contains("mutual recursion"));
    }

    #[test]
    fn large_scc_forces_signature_only_budget() {
        let retrieval = Arc::new(InMemoryRetrievalService::new());
        let transport = Arc::new(MockTransport::fixed_text(scc_response()));
        let config = Arc::new(OrchestratorConfig::default());
        let builder = CycleContextBuilder::new(retrieval, transport, config);

        let budget = builder.per_member_budget(20);
        assert!(budget <= SIGNATURE_ONLY_CAP);
    }
}
