use docgraph_ai::schemas::PlanReviewData;
use docgraph_ai::{parse_structured, GenerationConfig, LlmTransport, Message};
use docgraph_core::DocPlan;
use std::sync::Arc;

/// Validates a generated plan: section ordering, presence of expected
/// sections, and that context refs parse. A second LLM call, same tier as
/// plan generation.
pub struct PlanReviewer {
    transport: Arc<dyn LlmTransport>,
}

impl PlanReviewer {
    pub fn new(transport: Arc<dyn LlmTransport>) -> Self {
        Self { transport }
    }

    pub async fn review(&self, plan: &DocPlan) -> PlanReviewData {
        let section_summary: String = plan
            .sections
            .iter()
            .map(|s| format!("- {} (depends on: {})", s.id, s.depends_on.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Review this documentation plan for sane ordering and completeness.\n\n\
             Project type: {}\nSections:\n{}\n\n\
             Respond with JSON: {{\"passed\": bool, \"feedback\": str}}",
            plan.project_type, section_summary,
        );
        let messages = vec![
            Message::system("You review documentation plans for structural soundness."),
            Message::user(prompt),
        ];

        match self
            .transport
            .generate_chat(&messages, &GenerationConfig { json_mode: true, ..Default::default() })
            .await
        {
            Ok(response) => parse_structured::<PlanReviewData>(&response.content).unwrap_or_else(|raw| PlanReviewData {
                passed: false,
                feedback: raw,
            }),
            Err(e) => PlanReviewData {
                passed: false,
                feedback: format!("plan reviewer transport error: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_ai::providers::mock::MockTransport;
    use docgraph_core::Section;

    fn plan() -> DocPlan {
        DocPlan {
            project_type: "library".to_string(),
            audience: String::new(),
            primary_use_case: String::new(),
            architecture_pattern: String::new(),
            sections: vec![Section {
                id: "overview".to_string(),
                title: "Overview".to_string(),
                purpose: String::new(),
                style: "narrative".to_string(),
                max_tokens: 500,
                context_refs: vec![],
                depends_on: vec![],
            }],
            glossary: vec![],
        }
    }

    #[tokio::test]
    async fn review_passes_through_parsed_response() {
        let response = serde_json::json!({"passed": true, "feedback": ""}).to_string();
        let reviewer = PlanReviewer::new(Arc::new(MockTransport::fixed_text(response)));
        let review = reviewer.review(&plan()).await;
        assert!(review.passed);
    }

    #[tokio::test]
    async fn unparseable_response_counts_as_failed_review() {
        let reviewer = PlanReviewer::new(Arc::new(MockTransport::fixed_text("not json")));
        let review = reviewer.review(&plan()).await;
        assert!(!review.passed);
        assert!(review.feedback.contains("not json"));
    }
}
