use crate::batch_scheduler::BatchScheduler;
use crate::context_resolver::{ContextResolver, ProjectMetadata};
use crate::cycle_context::CycleContextBuilder;
use crate::folder_summarizer::FolderSummarizer;
use crate::generation_log::GenerationLog;
use crate::module_pipeline::{ModulePipeline, WriteMode};
use crate::output_assembler::OutputAssembler;
use crate::plan::PlanPipeline;
use crate::usage_tracker::RagUsageTracker;
use docgraph_ai::LlmTransport;
use docgraph_core::{ModuleId, OrchestratorConfig, Result, RunSummary};
use docgraph_graph::{DependencyGraph, GraphAnalyzer};
use docgraph_retrieval::RetrievalService;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};

/// The two LLM capability tiers named throughout the pipeline. Fast backs
/// module writes/reviews, folder summaries, and plan generation; reasoning
/// is reserved for callers that want a stronger model on section execution.
pub struct Transports {
    pub fast: Arc<dyn LlmTransport>,
    pub reasoning: Arc<dyn LlmTransport>,
}

/// Top-level wiring: GraphAnalyzer -> DependencyGraph -> CycleContextBuilder
/// -> BatchScheduler -> FolderSummarizer -> PlanPipeline -> OutputAssembler.
/// Produces the final `RunSummary` and flushes the generation log.
pub async fn run(
    analyzer: &dyn GraphAnalyzer,
    retrieval: Arc<dyn RetrievalService>,
    transports: Transports,
    metadata: ProjectMetadata,
    config: Arc<OrchestratorConfig>,
) -> Result<RunSummary> {
    let started = Instant::now();
    let graph = Arc::new(DependencyGraph::build(analyzer));

    let cycle_builder = Arc::new(CycleContextBuilder::new(
        retrieval.clone(),
        transports.fast.clone(),
        config.clone(),
    ));

    let tracker = Arc::new(RagUsageTracker::new());
    let write_mode = if config.adaptive_write { WriteMode::Adaptive } else { WriteMode::Static };
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let module_pipeline = Arc::new(
        ModulePipeline::new(
            retrieval.clone(),
            transports.fast.clone(),
            config.clone(),
            semaphore,
            write_mode,
        )
        .with_tracker(tracker.clone()),
    );

    let scheduler = BatchScheduler::new(graph.clone(), cycle_builder, module_pipeline);
    let batch = scheduler.run().await;

    let folder_summarizer = FolderSummarizer::new(transports.fast.clone());
    let folder_artifacts = folder_summarizer.build(&batch.artifacts).await;
    let folder_artifacts_by_path: HashMap<String, docgraph_core::FolderArtifact> = folder_artifacts
        .iter()
        .cloned()
        .map(|f| (f.folder_path.clone(), f))
        .collect();

    let generated_sections = Arc::new(Mutex::new(HashMap::new()));
    let resolver = Arc::new(ContextResolver::new(
        retrieval,
        batch.artifacts.clone(),
        folder_artifacts_by_path.clone(),
        generated_sections.clone(),
        metadata,
    ));

    let plan_pipeline = PlanPipeline::new(
        transports.fast.clone(),
        transports.reasoning.clone(),
        resolver,
        generated_sections,
        config.clone(),
    );
    let plan_output = plan_pipeline.run(&folder_artifacts_by_path, batch.artifacts.len()).await;

    let generation_log = GenerationLog::new(config.output_dir.clone(), config.generation_log);
    generation_log
        .record(format!(
            "documented {} modules, {} failed, {} SCC contexts",
            batch.artifacts.len(),
            batch.failed.len(),
            batch.scc_contexts.len()
        ))
        .await;
    for (module, reason) in &batch.failed {
        generation_log.record(format!("module {module} failed: {reason}")).await;
    }
    for warning in &plan_output.warnings {
        generation_log.record(format!("plan warning: {warning}")).await;
    }
    generation_log.flush().await?;

    let assembler = OutputAssembler::new(config.output_dir.clone());
    assembler
        .write_all(&batch, &folder_artifacts, &plan_output, started.elapsed().as_millis())
        .await
}

/// Entry-point heuristic: modules nothing else in the graph imports.
pub fn infer_entry_points(graph: &DependencyGraph) -> Vec<ModuleId> {
    let imported: std::collections::HashSet<ModuleId> = graph
        .modules()
        .iter()
        .flat_map(|m| graph.deps(m))
        .collect();
    graph
        .modules()
        .iter()
        .filter(|m| !imported.contains(m))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_ai::providers::mock::MockTransport;
    use docgraph_graph::InMemoryGraphAnalyzer;
    use docgraph_retrieval::InMemoryRetrievalService;

    fn m(s: &str) -> ModuleId {
        ModuleId::new(s)
    }

    fn doc_response() -> String {
        serde_json::json!({
            "summary": "does useful things",
            "responsibility": "core logic",
            "key_functions": [],
            "dependency_usage": "",
            "exports": []
        })
        .to_string()
    }

    fn passing_review() -> String {
        serde_json::json!({"passed": true, "feedback": ""}).to_string()
    }

    fn default_plan_json(module_count: usize) -> String {
        serde_json::json!({
            "project_type": "library",
            "audience": "developers",
            "primary_use_case": "understand the codebase",
            "architecture_pattern": "layered",
            "sections": [{
                "section_id": "overview",
                "title": "Overview",
                "purpose": "introduce the project",
                "required_context": ["tree"],
                "style": "narrative",
                "max_tokens": 300,
                "dependencies": []
            }],
            "glossary": []
        })
        .to_string()
        .replace("library", &format!("library with {module_count} modules"))
    }

    #[tokio::test]
    async fn infer_entry_points_finds_unimported_modules() {
        let mut analyzer = InMemoryGraphAnalyzer::new();
        analyzer.add_module(m("a"), vec![]);
        analyzer.add_module(m("b"), vec![m("a")]);
        let graph = DependencyGraph::build(&analyzer);
        let entry_points = infer_entry_points(&graph);
        assert_eq!(entry_points, vec![m("b")]);
    }

    #[tokio::test]
    async fn full_run_produces_summary_and_writes_outputs() {
        let mut analyzer = InMemoryGraphAnalyzer::new();
        analyzer.add_module(m("a"), vec![]);
        analyzer.add_module(m("b"), vec![m("a")]);

        let mut retrieval = InMemoryRetrievalService::new();
        retrieval.add_module(m("a"), "fn a() {}\n");
        retrieval.add_module(m("b"), "fn b() {}\n");

        let fast = Arc::new(MockTransport::new(vec![
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
        let reasoning = Arc::new(MockTransport::fixed_text("some section body"));
        let _ = default_plan_json(2);

        let dir = tempfile::tempdir().unwrap();
        let mut config = OrchestratorConfig::default();
        config.output_dir = dir.path().to_string_lossy().to_string();
        config.adaptive_write = false;

        let summary = run(
            &analyzer,
            Arc::new(retrieval),
            Transports { fast, reasoning },
            ProjectMetadata::default(),
            Arc::new(config),
        )
        .await
        .unwrap();

        assert_eq!(summary.documented.len(), 2);
        assert!(dir.path().join("final.md").exists());
        assert!(dir.path().join("modules.txt").exists());
    }
}
