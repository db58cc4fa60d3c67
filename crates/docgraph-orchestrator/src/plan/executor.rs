use crate::context_resolver::ContextResolver;
use crate::plan::planner::{generate_default_plan, PlanGenerator};
use crate::plan::reviewer::PlanReviewer;
use docgraph_ai::{GenerationConfig, LlmTransport, Message};
use docgraph_core::{DocGraphError, DocPlan, FolderArtifact, GeneratedSection, OrchestratorConfig, Section};
use docgraph_graph::organize_wavefronts;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of running the full plan pipeline: the accepted plan, the
/// assembled document, and any non-fatal sufficiency warnings collected
/// during section execution.
pub struct PlanOutput {
    pub plan: DocPlan,
    pub document: String,
    pub sections: Vec<GeneratedSection>,
    pub warnings: Vec<String>,
}

/// Plan generation → review → section execution → assembly (§4.4).
pub struct PlanPipeline {
    planner: PlanGenerator,
    reviewer: PlanReviewer,
    resolver: Arc<ContextResolver>,
    section_transport: Arc<dyn LlmTransport>,
    config: Arc<OrchestratorConfig>,
    generated_sections: Arc<Mutex<HashMap<String, GeneratedSection>>>,
}

impl PlanPipeline {
    pub fn new(
        plan_transport: Arc<dyn LlmTransport>,
        section_transport: Arc<dyn LlmTransport>,
        resolver: Arc<ContextResolver>,
        generated_sections: Arc<Mutex<HashMap<String, GeneratedSection>>>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            planner: PlanGenerator::new(plan_transport.clone()),
            reviewer: PlanReviewer::new(plan_transport),
            resolver,
            section_transport,
            config,
            generated_sections,
        }
    }

    pub async fn run(&self, folder_artifacts: &HashMap<String, FolderArtifact>, module_count: usize) -> PlanOutput {
        let mut warnings = Vec::new();
        let plan = self.settle_plan(folder_artifacts, module_count, &mut warnings).await;

        let plan = match validate_acyclic(&plan) {
            Ok(()) => plan,
            Err(e) => {
                tracing::error!(error = %e, "generated plan contains a cycle, falling back to default plan");
                warnings.push(format!("plan cycle detected, reverted to default plan: {e}"));
                generate_default_plan()
            }
        };

        self.execute_sections(&plan, &mut warnings).await;

        let sections: Vec<GeneratedSection> = {
            let generated = self.generated_sections.lock().await;
            plan.sections
                .iter()
                .map(|s| {
                    generated
                        .get(&s.id)
                        .cloned()
                        .unwrap_or_else(|| GeneratedSection { id: s.id.clone(), content: String::new() })
                })
                .collect()
        };

        let document = assemble_document(&plan, &sections);

        PlanOutput {
            plan,
            document,
            sections,
            warnings,
        }
    }

    async fn settle_plan(
        &self,
        folder_artifacts: &HashMap<String, FolderArtifact>,
        module_count: usize,
        warnings: &mut Vec<String>,
    ) -> DocPlan {
        let mut feedback: Option<String> = None;
        let max_attempts = self.config.plan_retries + 1;

        for attempt in 0..max_attempts {
            match self.planner.generate(folder_artifacts, module_count, feedback.as_deref()).await {
                Ok(candidate) => {
                    let review = self.reviewer.review(&candidate).await;
                    if review.passed || attempt + 1 >= max_attempts {
                        return candidate;
                    }
                    feedback = Some(review.feedback);
                }
                Err(raw) => {
                    tracing::warn!(attempt, "plan generation failed to parse, falling back to default plan");
                    warnings.push(format!("plan parse failure: {raw}"));
                    return generate_default_plan();
                }
            }
        }

        generate_default_plan()
    }

    async fn execute_sections(&self, plan: &DocPlan, warnings: &mut Vec<String>) {
        let section_ids: Vec<String> = plan.sections.iter().map(|s| s.id.clone()).collect();
        let by_id: HashMap<&str, &Section> = plan.sections.iter().map(|s| (s.id.as_str(), s)).collect();

        let wavefronts = organize_wavefronts(&section_ids, |id| {
            by_id.get(id.as_str()).map(|s| s.depends_on.clone()).unwrap_or_default()
        });

        for layer in wavefronts {
            let tasks = layer.into_iter().map(|id| {
                let section = (*by_id.get(id.as_str()).expect("section in DAG must exist in plan")).clone();
                let resolver = self.resolver.clone();
                let transport = self.section_transport.clone();
                let generated_sections = self.generated_sections.clone();
                async move {
                    let tutorial = is_tutorial_style(&section);
                    let context = resolver.resolve(&section.context_refs, &section.depends_on, tutorial).await;

                    let mut local_warnings = Vec::new();
                    if tutorial && !context.has_source() {
                        local_warnings.push(format!(
                            "section `{}` is tutorial-style but resolved no source code context",
                            section.id
                        ));
                    }

                    let prompt = format!(
                        "Section: {}\nPurpose: {}\nStyle: {}\n\n{}\n\nWrite this section's content (no surrounding headers).",
                        section.title, section.purpose, section.style, context.text,
                    );
                    let messages = vec![
                        Message::system("You write one section of a generated project document."),
                        Message::user(prompt),
                    ];
                    let gen_config = GenerationConfig {
                        max_tokens: Some(section.max_tokens as usize),
                        ..Default::default()
                    };

                    let content = match transport.generate_chat(&messages, &gen_config).await {
                        Ok(response) => response.content,
                        Err(e) => {
                            tracing::warn!(section = %section.id, error = %e, "section generation failed, leaving content empty");
                            local_warnings.push(format!("section `{}` generation failed: {e}", section.id));
                            String::new()
                        }
                    };

                    generated_sections
                        .lock()
                        .await
                        .insert(section.id.clone(), GeneratedSection { id: section.id.clone(), content });

                    local_warnings
                }
            });

            let layer_warnings = futures::future::join_all(tasks).await;
            warnings.extend(layer_warnings.into_iter().flatten());
        }
    }
}

fn is_tutorial_style(section: &Section) -> bool {
    let haystack = format!("{} {}", section.id, section.title).to_lowercase();
    haystack.contains("tutorial") || haystack.contains("quickstart") || haystack.contains("getting started")
}

fn assemble_document(plan: &DocPlan, sections: &[GeneratedSection]) -> String {
    let mut out = format!("# {}\n\n", plan.project_type);
    for section in &plan.sections {
        let content = sections
            .iter()
            .find(|s| s.id == section.id)
            .map(|s| s.content.as_str())
            .unwrap_or("");
        out.push_str(&format!("## {}\n\n{}\n\n", section.title, content));
    }
    if !plan.glossary.is_empty() {
        out.push_str("## Glossary\n\n");
        for term in &plan.glossary {
            out.push_str(&format!("- {}\n", term));
        }
    }
    out
}

fn validate_acyclic(plan: &DocPlan) -> Result<(), DocGraphError> {
    let ids: HashSet<&str> = plan.sections.iter().map(|s| s.id.as_str()).collect();
    let mut in_degree: HashMap<&str, usize> = plan.sections.iter().map(|s| (s.id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for section in &plan.sections {
        for dep in &section.depends_on {
            if !ids.contains(dep.as_str()) {
                continue;
            }
            *in_degree.get_mut(section.id.as_str()).unwrap() += 1;
            dependents.entry(dep.as_str()).or_default().push(section.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(&id, _)| id).collect();
    let mut visited = 0;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        if let Some(next) = dependents.get(id) {
            for &dep in next {
                let entry = in_degree.get_mut(dep).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push_back(dep);
                }
            }
        }
    }

    if visited == plan.sections.len() {
        Ok(())
    } else {
        Err(DocGraphError::PlanCycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_ai::providers::mock::MockTransport;
    use docgraph_core::ContextRef;
    use docgraph_retrieval::InMemoryRetrievalService;

    fn section(id: &str, depends_on: Vec<&str>) -> Section {
        Section {
            id: id.to_string(),
            title: id.to_string(),
            purpose: String::new(),
            style: "narrative".to_string(),
            max_tokens: 300,
            context_refs: vec![ContextRef::Tree],
            depends_on: depends_on.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn acyclic_plan_validates() {
        let plan = DocPlan {
            project_type: "x".to_string(),
            audience: String::new(),
            primary_use_case: String::new(),
            architecture_pattern: String::new(),
            sections: vec![section("a", vec![]), section("b", vec!["a"])],
            glossary: vec![],
        };
        assert!(validate_acyclic(&plan).is_ok());
    }

    #[test]
    fn cyclic_plan_is_rejected() {
        let plan = DocPlan {
            project_type: "x".to_string(),
            audience: String::new(),
            primary_use_case: String::new(),
            architecture_pattern: String::new(),
            sections: vec![section("a", vec!["b"]), section("b", vec!["a"])],
            glossary: vec![],
        };
        assert!(matches!(validate_acyclic(&plan), Err(DocGraphError::PlanCycle)));
    }

    #[tokio::test]
    async fn run_falls_back_to_default_plan_on_parse_failure_and_generates_sections() {
        let plan_transport = Arc::new(MockTransport::fixed_text("not json"));
        let section_transport = Arc::new(MockTransport::fixed_text("some section body"));
        let retrieval = Arc::new(InMemoryRetrievalService::new());
        let generated_sections = Arc::new(Mutex::new(HashMap::new()));
        let resolver = Arc::new(ContextResolver::new(
            retrieval,
            HashMap::new(),
            HashMap::new(),
            generated_sections.clone(),
            crate::context_resolver::ProjectMetadata::default(),
        ));
        let config = Arc::new(OrchestratorConfig::default());

        let pipeline = PlanPipeline::new(plan_transport, section_transport, resolver, generated_sections, config);
        let output = pipeline.run(&HashMap::new(), 5).await;

        assert_eq!(output.plan.sections.len(), 4);
        assert_eq!(output.sections.len(), 4);
        assert!(output.document.contains("Overview"));
        assert!(output.sections.iter().all(|s| s.content == "some section body"));
    }
}
