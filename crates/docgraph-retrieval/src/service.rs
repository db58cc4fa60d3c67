use crate::chunk::CodeChunk;
use async_trait::async_trait;
use docgraph_core::ModuleId;

/// External collaborator providing retrieval over the source tree. Five
/// capabilities back the five adaptive-mode tools (§4.2.2) and the static
/// write's top-k neighbor lookup; a production implementation would sit on
/// a real embedding index, a mock/recorder variant drives deterministic
/// tests.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// Semantic nearest-neighbor search over all chunks.
    async fn search_semantic(&self, query: &str, k: usize) -> Vec<CodeChunk>;

    /// A single named entity (function or class) within a module.
    async fn search_by_entity(&self, module: &ModuleId, entity: &str) -> Option<CodeChunk>;

    /// Chunks referencing `entity`, across modules, excluding its own
    /// definition.
    async fn search_usages(&self, entity: &str, limit: usize) -> Vec<CodeChunk>;

    /// Top-k chunks belonging to one module (its own entities).
    async fn search_module_top_k(&self, module: &ModuleId, k: usize) -> Vec<CodeChunk>;

    /// Up to `limit` exported names of a module (its public entities).
    async fn search_exports(&self, module: &ModuleId, limit: usize) -> Vec<String>;

    /// Full source text of a module, if available.
    async fn module_source(&self, module: &ModuleId) -> Option<String>;
}
