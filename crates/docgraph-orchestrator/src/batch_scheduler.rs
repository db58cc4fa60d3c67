use crate::cycle_context::CycleContextBuilder;
use crate::module_pipeline::ModulePipeline;
use docgraph_core::{ModuleArtifact, ModuleId, SccContext, SccId};
use docgraph_graph::{organize_wavefronts, DependencyGraph};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of dispatching every module in the dependency graph through a
/// `ModulePipeline`, in wavefront order.
pub struct BatchResult {
    pub artifacts: HashMap<ModuleId, ModuleArtifact>,
    pub failed: Vec<(ModuleId, String)>,
    pub scc_contexts: HashMap<SccId, Arc<SccContext>>,
}

/// Drives every module in `graph` through a `ModulePipeline`, dispatching in
/// dependency-respecting wavefronts. A failed module is recorded and
/// excluded from its dependents' context rather than aborting the batch.
pub struct BatchScheduler {
    graph: Arc<DependencyGraph>,
    cycle_builder: Arc<CycleContextBuilder>,
    pipeline: Arc<ModulePipeline>,
}

impl BatchScheduler {
    pub fn new(
        graph: Arc<DependencyGraph>,
        cycle_builder: Arc<CycleContextBuilder>,
        pipeline: Arc<ModulePipeline>,
    ) -> Self {
        Self {
            graph,
            cycle_builder,
            pipeline,
        }
    }

    pub async fn run(&self) -> BatchResult {
        let scc_contexts = self.build_scc_contexts().await;
        let tie_break = self.tie_break_keys();

        let wavefronts = organize_wavefronts(self.graph.modules(), |m| self.graph.deps_outside_scc(m));

        let artifacts: Arc<Mutex<HashMap<ModuleId, ModuleArtifact>>> = Arc::new(Mutex::new(HashMap::new()));
        let failed: Arc<Mutex<Vec<(ModuleId, String)>>> = Arc::new(Mutex::new(Vec::new()));

        for mut wave in wavefronts {
            wave.sort_by_key(|m| tie_break.get(m).cloned().unwrap_or((0, 0, m.as_str().to_string())));

            let tasks = wave.into_iter().map(|module_id| {
                let artifacts = artifacts.clone();
                let failed = failed.clone();
                let deps = self.graph.deps_outside_scc(&module_id);
                let scc_context = self.graph.scc_of(&module_id).and_then(|id| scc_contexts.get(&id).cloned());
                let pipeline = self.pipeline.clone();
                async move {
                    let dependency_artifacts = {
                        let guard = artifacts.lock().await;
                        deps.iter().filter_map(|d| guard.get(d).cloned()).collect::<Vec<_>>()
                    };

                    match pipeline
                        .run(module_id.clone(), deps, dependency_artifacts, scc_context)
                        .await
                    {
                        Ok(artifact) => {
                            artifacts.lock().await.insert(module_id, artifact);
                        }
                        Err(e) => {
                            tracing::warn!(module = %module_id, error = %e, "module documentation failed");
                            failed.lock().await.push((module_id, e.to_string()));
                        }
                    }
                }
            });

            futures::future::join_all(tasks).await;
        }

        BatchResult {
            artifacts: Arc::try_unwrap(artifacts).unwrap().into_inner(),
            failed: Arc::try_unwrap(failed).unwrap().into_inner(),
            scc_contexts,
        }
    }

    async fn build_scc_contexts(&self) -> HashMap<SccId, Arc<SccContext>> {
        let mut out = HashMap::new();
        for members in self.graph.all_sccs() {
            if members.len() <= 1 {
                continue;
            }
            let scc_id = match self.graph.scc_of(&members[0]) {
                Some(id) => id,
                None => continue,
            };
            if let Some(context) = self.cycle_builder.build(scc_id, &members).await {
                out.insert(scc_id, Arc::new(context));
            }
        }
        out
    }

    /// (ascending import count, descending importer count, lexicographic id)
    /// — a deterministic dispatch order within a wavefront, matching the
    /// "document the most-depended-on modules first" tie-break.
    fn tie_break_keys(&self) -> HashMap<ModuleId, (usize, i64, String)> {
        let mut importer_counts: HashMap<ModuleId, usize> = HashMap::new();
        for module in self.graph.modules() {
            for dep in self.graph.deps(module) {
                *importer_counts.entry(dep).or_insert(0) += 1;
            }
        }

        self.graph
            .modules()
            .iter()
            .map(|m| {
                let import_count = self.graph.deps(m).len();
                let importer_count = *importer_counts.get(m).unwrap_or(&0) as i64;
                (m.clone(), (import_count, -importer_count, m.as_str().to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_ai::providers::mock::MockTransport;
    use docgraph_core::OrchestratorConfig;
    use docgraph_graph::InMemoryGraphAnalyzer;
    use docgraph_retrieval::InMemoryRetrievalService;
    use tokio::sync::Semaphore;

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

    fn always_passing_transport() -> Arc<MockTransport> {
        // generate_chat alternates write/review calls; both accept the same
        // JSON-shaped canned text since the reviewer only looks for
        // `passed`/`feedback` and the writer only looks for the doc fields,
        // each parse ignoring unknown/missing fields via #[serde(default)].
        Arc::new(MockTransport::new(vec![
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
        ]))
    }

    #[tokio::test]
    async fn linear_chain_documents_every_module() {
        let mut analyzer = InMemoryGraphAnalyzer::new();
        analyzer.add_module(m("a"), vec![]);
        analyzer.add_module(m("b"), vec![m("a")]);
        analyzer.add_module(m("c"), vec![m("b")]);
        let graph = Arc::new(DependencyGraph::build(&analyzer));

        let mut retrieval = InMemoryRetrievalService::new();
        retrieval.add_module(m("a"), "fn a() {}\n");
        retrieval.add_module(m("b"), "fn b() {}\n");
        retrieval.add_module(m("c"), "fn c() {}\n");
        let retrieval = Arc::new(retrieval);

        let config = Arc::new(OrchestratorConfig::default());
        let transport = always_passing_transport();
        let cycle_builder = Arc::new(CycleContextBuilder::new(
            retrieval.clone(),
            transport.clone(),
            config.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(4));
        let pipeline = Arc::new(ModulePipeline::new(
            retrieval,
            transport,
            config,
            semaphore,
            crate::module_pipeline::WriteMode::Static,
        ));

        let scheduler = BatchScheduler::new(graph, cycle_builder, pipeline);
        let result = scheduler.run().await;

        assert_eq!(result.artifacts.len(), 3);
        assert!(result.failed.is_empty());
        assert!(result.artifacts.contains_key(&m("c")));
    }

    #[tokio::test]
    async fn two_cycle_gets_shared_scc_context_and_both_documented() {
        let mut analyzer = InMemoryGraphAnalyzer::new();
        analyzer.add_module(m("x"), vec![m("y")]);
        analyzer.add_module(m("y"), vec![m("x")]);
        let graph = Arc::new(DependencyGraph::build(&analyzer));

        let mut retrieval = InMemoryRetrievalService::new();
        retrieval.add_module(m("x"), "fn x() { y(); }\n");
        retrieval.add_module(m("y"), "fn y() { x(); }\n");
        let retrieval = Arc::new(retrieval);

        let config = Arc::new(OrchestratorConfig::default());
        let scc_response = serde_json::json!({
            "cycle_pattern": "mutual recursion",
            "collective_responsibility": "evaluate expressions",
            "interdependency_explanation": "x and y call each other",
            "key_abstractions": [],
            "entry_points": [],
            "utilities": [],
            "concerns": [],
            "summary": "tight pair"
        })
        .to_string();

        let transport = Arc::new(MockTransport::new(vec![
            docgraph_ai::LlmResponse {
                content: scc_response,
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

        let cycle_builder = Arc::new(CycleContextBuilder::new(
            retrieval.clone(),
            transport.clone(),
            config.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(4));
        let pipeline = Arc::new(ModulePipeline::new(
            retrieval,
            transport,
            config,
            semaphore,
            crate::module_pipeline::WriteMode::Static,
        ));

        let scheduler = BatchScheduler::new(graph, cycle_builder, pipeline);
        let result = scheduler.run().await;

        assert_eq!(result.scc_contexts.len(), 1);
        assert_eq!(result.artifacts.len(), 2);
    }
}
