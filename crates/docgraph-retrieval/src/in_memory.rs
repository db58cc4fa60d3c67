use crate::chunk::{CodeChunk, EntityKind};
use crate::chunker::{chunk_module, whole_module_chunk};
use crate::service::RetrievalService;
use async_trait::async_trait;
use docgraph_core::ModuleId;
use std::collections::HashMap;

/// Reference `RetrievalService` backed by in-process term-frequency
/// vectors rather than a real embedding model — sufficient to exercise the
/// orchestrator's control flow and the five tool contracts without a
/// network dependency or a vector database.
pub struct InMemoryRetrievalService {
    sources: HashMap<ModuleId, String>,
    chunks: HashMap<ModuleId, Vec<CodeChunk>>,
}

impl InMemoryRetrievalService {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            chunks: HashMap::new(),
        }
    }

    pub fn add_module(&mut self, module: ModuleId, source: impl Into<String>) -> &mut Self {
        let source = source.into();
        let chunks = chunk_module(&module, &source);
        self.sources.insert(module.clone(), source);
        self.chunks.insert(module, chunks);
        self
    }

    fn all_chunks(&self) -> impl Iterator<Item = &CodeChunk> {
        self.chunks.values().flatten()
    }

    fn term_vector(text: &str) -> HashMap<String, f32> {
        let mut counts: HashMap<String, f32> = HashMap::new();
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            *counts.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
        }
        counts
    }

    fn cosine(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
        let mut dot = 0.0;
        for (term, a_count) in a {
            if let Some(b_count) = b.get(term) {
                dot += a_count * b_count;
            }
        }
        let norm_a: f32 = a.values().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b: f32 = b.values().map(|v| v * v).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

impl Default for InMemoryRetrievalService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetrievalService for InMemoryRetrievalService {
    async fn search_semantic(&self, query: &str, k: usize) -> Vec<CodeChunk> {
        let query_vec = Self::term_vector(query);
        let mut scored: Vec<(f32, &CodeChunk)> = self
            .all_chunks()
            .map(|chunk| (Self::cosine(&query_vec, &Self::term_vector(&chunk.text)), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, c)| c.clone()).collect()
    }

    async fn search_by_entity(&self, module: &ModuleId, entity: &str) -> Option<CodeChunk> {
        self.chunks
            .get(module)?
            .iter()
            .find(|c| c.entity_name.as_deref() == Some(entity))
            .cloned()
    }

    async fn search_usages(&self, entity: &str, limit: usize) -> Vec<CodeChunk> {
        self.all_chunks()
            .filter(|c| c.entity_name.as_deref() != Some(entity) && c.text.contains(entity))
            .take(limit)
            .cloned()
            .collect()
    }

    async fn search_module_top_k(&self, module: &ModuleId, k: usize) -> Vec<CodeChunk> {
        match self.chunks.get(module) {
            Some(chunks) if !chunks.is_empty() => chunks.iter().take(k).cloned().collect(),
            _ => {
                tracing::debug!(%module, "no chunks for module, falling back to whole-module chunk");
                self.sources
                    .get(module)
                    .map(|src| vec![whole_module_chunk(module, src)])
                    .unwrap_or_default()
            }
        }
    }

    async fn search_exports(&self, module: &ModuleId, limit: usize) -> Vec<String> {
        self.chunks
            .get(module)
            .map(|chunks| {
                chunks
                    .iter()
                    .filter(|c| matches!(c.kind, EntityKind::Function | EntityKind::Class))
                    .filter_map(|c| c.entity_name.clone())
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn module_source(&self, module: &ModuleId) -> Option<String> {
        self.sources.get(module).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_by_entity_finds_function() {
        let mut service = InMemoryRetrievalService::new();
        service.add_module(
            ModuleId::new("m"),
            "fn greet() {\n    println!(\"hi\");\n}\n",
        );
        let found = service.search_by_entity(&ModuleId::new("m"), "greet").await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn search_usages_excludes_definition() {
        let mut service = InMemoryRetrievalService::new();
        service.add_module(
            ModuleId::new("m"),
            "fn helper() {}\n\nfn caller() {\n    helper();\n}\n",
        );
        let usages = service.search_usages("helper", 10).await;
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].entity_name.as_deref(), Some("caller"));
    }

    #[tokio::test]
    async fn search_exports_returns_entity_names() {
        let mut service = InMemoryRetrievalService::new();
        service.add_module(ModuleId::new("m"), "fn a() {}\nfn b() {}\nfn c() {}\n");
        let exports = service.search_exports(&ModuleId::new("m"), 2).await;
        assert_eq!(exports.len(), 2);
    }
}
