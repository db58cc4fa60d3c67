use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Stable identifier for a module, derived from its source path.
///
/// Totally ordered by lexicographic comparison of the underlying path so
/// that tie-breaking rules (see `docgraph-graph`) are deterministic across
/// runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub String);

impl ModuleId {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for ModuleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Identifier for a strongly connected component. Every module belongs to
/// exactly one `SccId`, including singleton SCCs for acyclic modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SccId(pub usize);

impl fmt::Display for SccId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scc-{}", self.0)
    }
}

/// One documented function or class within a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFunction {
    pub name: String,
    pub purpose: String,
}

/// The structured documentation record produced for a single module.
///
/// Produced exactly once per module and immutable thereafter; absence from
/// the result map means the module failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleArtifact {
    pub module_id: ModuleId,
    pub summary: String,
    pub responsibility: String,
    pub key_functions: Vec<KeyFunction>,
    pub dependency_usage: String,
    pub exports: Vec<String>,
    /// Set when the artifact came from a parse-failure fallback (raw model
    /// text wrapped rather than a fully structured document).
    pub degraded: bool,
}

/// Shared architectural context for one non-trivial strongly connected
/// component, produced once and read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SccContext {
    pub scc_id: SccId,
    pub member_ids: Vec<ModuleId>,
    pub text: String,
}

/// A bottom-up folder-level summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderArtifact {
    pub folder_path: String,
    pub summary: String,
    pub member_module_ids: Vec<ModuleId>,
    pub child_folder_paths: Vec<String>,
}

/// A symbolic reference to context a section or module prompt needs,
/// resolved by `ContextResolver` into bounded text. Never raw code at the
/// plan stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextRef {
    Folder(String),
    Module(String),
    Source(String),
    Api(String),
    Config(String),
    Section(String),
    Tree,
    AllFolders,
    EntryPoints,
    Configs,
    Deps,
    /// Legacy unprefixed reference (bare filename or path fragment),
    /// resolved best-effort: exact match, then suffix, then basename.
    Legacy(String),
}

impl ContextRef {
    /// Parse the `prefix:value` vocabulary from §6, falling back to
    /// `Legacy` for anything unprefixed or unrecognized.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "tree" => return ContextRef::Tree,
            "all_folders" => return ContextRef::AllFolders,
            "entry_points" => return ContextRef::EntryPoints,
            "configs" => return ContextRef::Configs,
            "deps" => return ContextRef::Deps,
            _ => {}
        }
        if let Some((prefix, value)) = raw.split_once(':') {
            match prefix {
                "folder" => return ContextRef::Folder(value.to_string()),
                "module" => return ContextRef::Module(value.to_string()),
                "source" => return ContextRef::Source(value.to_string()),
                "api" => return ContextRef::Api(value.to_string()),
                "config" => return ContextRef::Config(value.to_string()),
                "section" => return ContextRef::Section(value.to_string()),
                _ => {}
            }
        }
        ContextRef::Legacy(raw.to_string())
    }
}

/// One node in the final document's section DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub purpose: String,
    pub style: String,
    pub max_tokens: u32,
    pub context_refs: Vec<ContextRef>,
    pub depends_on: Vec<String>,
}

/// The plan for the final document: an ordered list of sections forming a
/// DAG via `Section::depends_on`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocPlan {
    pub project_type: String,
    pub audience: String,
    pub primary_use_case: String,
    pub architecture_pattern: String,
    pub sections: Vec<Section>,
    pub glossary: Vec<String>,
}

/// Output of executing one section of the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub id: String,
    pub content: String,
}

/// End-of-run report: what got documented, what failed and why, and how
/// long the run took. Logged and printed, never a required output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique per-invocation identifier, useful for correlating this
    /// summary with its `generation.log` lines.
    pub run_id: String,
    pub documented: Vec<ModuleId>,
    pub failed: Vec<(ModuleId, String)>,
    pub scc_count: usize,
    pub wall_clock_ms: u128,
}
