use docgraph_core::ModuleId;
use std::path::PathBuf;

/// External collaborator that supplies the raw module set and per-module
/// import lists. Only this contract matters; how it parses the source tree
/// (tree-sitter, regex, a real compiler frontend) is not this crate's
/// concern. `InMemoryGraphAnalyzer` below is a reference implementation
/// used by tests and the CLI's simplest path.
pub trait GraphAnalyzer: Send + Sync {
    /// Every module discovered in the source tree.
    fn modules(&self) -> Vec<ModuleId>;

    /// The modules `module` imports, in source order. May include modules
    /// outside the returned module set (external/package dependencies);
    /// those are dropped when building the local dependency graph.
    fn dependencies(&self, module: &ModuleId) -> Vec<ModuleId>;

    /// Filesystem path backing a module, if known.
    fn module_source_path(&self, module: &ModuleId) -> Option<PathBuf>;
}

/// A simple in-process `GraphAnalyzer` backed by explicit module/dependency
/// tables, the reference implementation exercising the contract above.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGraphAnalyzer {
    modules: Vec<ModuleId>,
    dependencies: std::collections::HashMap<ModuleId, Vec<ModuleId>>,
    source_paths: std::collections::HashMap<ModuleId, PathBuf>,
}

impl InMemoryGraphAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, module: ModuleId, deps: Vec<ModuleId>) -> &mut Self {
        self.dependencies.insert(module.clone(), deps);
        self.modules.push(module);
        self
    }

    pub fn with_source_path(&mut self, module: ModuleId, path: PathBuf) -> &mut Self {
        self.source_paths.insert(module, path);
        self
    }
}

impl GraphAnalyzer for InMemoryGraphAnalyzer {
    fn modules(&self) -> Vec<ModuleId> {
        self.modules.clone()
    }

    fn dependencies(&self, module: &ModuleId) -> Vec<ModuleId> {
        self.dependencies.get(module).cloned().unwrap_or_default()
    }

    fn module_source_path(&self, module: &ModuleId) -> Option<PathBuf> {
        self.source_paths.get(module).cloned()
    }
}
