use docgraph_core::{truncate_chars, ContextRef, FolderArtifact, GeneratedSection, ModuleArtifact, ModuleId};
use docgraph_retrieval::RetrievalService;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

const SOURCE_LIMIT_CHARS: usize = 6_000;
const API_LIMIT_CHARS: usize = 3_000;
const FOLDER_LIMIT_CHARS: usize = 4_000;
const CONFIG_LIMIT_CHARS: usize = 2_000;

/// The four categories named in the auto-generated summary header (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextCategory {
    SourceCode,
    ApiSignatures,
    ConfigFiles,
    FolderDocs,
}

impl ContextCategory {
    fn label(self) -> &'static str {
        match self {
            ContextCategory::SourceCode => "SOURCE CODE",
            ContextCategory::ApiSignatures => "API SIGNATURES",
            ContextCategory::ConfigFiles => "CONFIG FILES",
            ContextCategory::FolderDocs => "FOLDER DOCS",
        }
    }
}

/// Text resolved for one section or module prompt, plus which named
/// categories it ended up containing — used by the context sufficiency
/// check before a section's LLM call.
pub struct ResolvedContext {
    pub text: String,
    pub categories: HashSet<ContextCategory>,
}

impl ResolvedContext {
    pub fn has_source(&self) -> bool {
        self.categories.contains(&ContextCategory::SourceCode)
    }
}

/// Project-level metadata the ContextResolver can't derive from the
/// dependency graph alone: config/dependency manifest contents and which
/// modules count as entry points. Left empty by callers that have no such
/// discovery mechanism; `tree`/`all_folders`/source refs still work.
#[derive(Debug, Clone, Default)]
pub struct ProjectMetadata {
    pub entry_points: Vec<ModuleId>,
    pub configs: Vec<(String, String)>,
    pub deps: Vec<(String, String)>,
    pub tree_outline: String,
}

/// Translates symbolic `ContextRef`s into bounded text, per §4.5 and the
/// vocabulary table in §6.
pub struct ContextResolver {
    retrieval: Arc<dyn RetrievalService>,
    module_artifacts: HashMap<ModuleId, ModuleArtifact>,
    folder_artifacts: HashMap<String, FolderArtifact>,
    generated_sections: Arc<Mutex<HashMap<String, GeneratedSection>>>,
    metadata: ProjectMetadata,
}

impl ContextResolver {
    pub fn new(
        retrieval: Arc<dyn RetrievalService>,
        module_artifacts: HashMap<ModuleId, ModuleArtifact>,
        folder_artifacts: HashMap<String, FolderArtifact>,
        generated_sections: Arc<Mutex<HashMap<String, GeneratedSection>>>,
        metadata: ProjectMetadata,
    ) -> Self {
        Self {
            retrieval,
            module_artifacts,
            folder_artifacts,
            generated_sections,
            metadata,
        }
    }

    /// Resolves `refs` plus the automatic inclusion of `depends_on` section
    /// content, concatenating blocks in reference order behind a summary
    /// header.
    pub async fn resolve(&self, refs: &[ContextRef], depends_on: &[String], is_tutorial_style: bool) -> ResolvedContext {
        let mut categories = HashSet::new();
        let mut blocks = Vec::new();

        for r in refs {
            if let Some((label, text, category)) = self.resolve_one(r).await {
                if let Some(c) = category {
                    categories.insert(c);
                }
                blocks.push(format!("## {}\n{}", label, text));
            }
        }

        for section_id in depends_on {
            let sections = self.generated_sections.lock().await;
            if let Some(section) = sections.get(section_id) {
                blocks.push(format!("## Section: {}\n{}", section_id, section.content));
            }
        }

        if is_tutorial_style && !categories.contains(&ContextCategory::SourceCode) {
            if let Some((label, text)) = self.entry_point_sources().await {
                categories.insert(ContextCategory::SourceCode);
                blocks.push(format!("## {}\n{}", label, text));
            }
        }

        let header = if categories.is_empty() {
            "Context includes: (none)".to_string()
        } else {
            let mut labels: Vec<&str> = categories.iter().map(|c| c.label()).collect();
            labels.sort();
            format!("Context includes: {}", labels.join(", "))
        };

        let text = format!("{}\n\n{}", header, blocks.join("\n\n"));
        ResolvedContext { text, categories }
    }

    async fn resolve_one(&self, r: &ContextRef) -> Option<(String, String, Option<ContextCategory>)> {
        match r {
            ContextRef::Folder(path) => {
                let artifact = self.folder_artifacts.get(path)?;
                Some((
                    format!("Folder: {}", display_folder(path)),
                    truncate_chars(&artifact.summary, FOLDER_LIMIT_CHARS),
                    Some(ContextCategory::FolderDocs),
                ))
            }
            ContextRef::AllFolders => {
                let mut folders: Vec<&FolderArtifact> = self.folder_artifacts.values().collect();
                folders.sort_by(|a, b| a.folder_path.cmp(&b.folder_path));
                let text = folders
                    .iter()
                    .map(|f| format!("- {}: {}", display_folder(&f.folder_path), f.summary))
                    .collect::<Vec<_>>()
                    .join("\n");
                Some((
                    "All folder summaries".to_string(),
                    truncate_chars(&text, FOLDER_LIMIT_CHARS),
                    Some(ContextCategory::FolderDocs),
                ))
            }
            ContextRef::Module(id) => {
                let artifact = self.module_artifacts.get(&ModuleId::new(id.clone()))?;
                Some((
                    format!("Module: {}", id),
                    truncate_chars(&artifact.summary, FOLDER_LIMIT_CHARS),
                    None,
                ))
            }
            ContextRef::Source(id) => {
                let source = self.retrieval.module_source(&ModuleId::new(id.clone())).await?;
                Some((
                    format!("Source: {}", id),
                    truncate_chars(&source, SOURCE_LIMIT_CHARS),
                    Some(ContextCategory::SourceCode),
                ))
            }
            ContextRef::Api(id) => {
                let source = self.retrieval.module_source(&ModuleId::new(id.clone())).await?;
                let signatures = extract_signature_lines(&source);
                Some((
                    format!("API: {}", id),
                    truncate_chars(&signatures, API_LIMIT_CHARS),
                    Some(ContextCategory::ApiSignatures),
                ))
            }
            ContextRef::Config(name) => {
                let (_, content) = self.metadata.configs.iter().find(|(n, _)| n == name)?;
                Some((
                    format!("Config: {}", name),
                    truncate_chars(content, CONFIG_LIMIT_CHARS),
                    Some(ContextCategory::ConfigFiles),
                ))
            }
            ContextRef::Configs => {
                if self.metadata.configs.is_empty() {
                    return None;
                }
                let text = self
                    .metadata
                    .configs
                    .iter()
                    .map(|(n, c)| format!("### {}\n{}", n, c))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Some((
                    "Config files".to_string(),
                    truncate_chars(&text, CONFIG_LIMIT_CHARS),
                    Some(ContextCategory::ConfigFiles),
                ))
            }
            ContextRef::Deps => {
                if self.metadata.deps.is_empty() {
                    return None;
                }
                let text = self
                    .metadata
                    .deps
                    .iter()
                    .map(|(n, c)| format!("### {}\n{}", n, c))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Some((
                    "Dependency manifests".to_string(),
                    truncate_chars(&text, CONFIG_LIMIT_CHARS),
                    Some(ContextCategory::ConfigFiles),
                ))
            }
            ContextRef::Section(id) => {
                let sections = self.generated_sections.lock().await;
                let section = sections.get(id)?;
                Some((format!("Section: {}", id), section.content.clone(), None))
            }
            ContextRef::Tree => {
                if self.metadata.tree_outline.is_empty() {
                    return None;
                }
                Some((
                    "Project structure".to_string(),
                    truncate_chars(&self.metadata.tree_outline, FOLDER_LIMIT_CHARS),
                    None,
                ))
            }
            ContextRef::EntryPoints => self.entry_point_sources().await,
            ContextRef::Legacy(raw) => self.resolve_legacy(raw).await,
        }
    }

    async fn entry_point_sources(&self) -> Option<(String, String, Option<ContextCategory>)> {
        if self.metadata.entry_points.is_empty() {
            return None;
        }
        let mut out = String::new();
        for entry in &self.metadata.entry_points {
            if let Some(source) = self.retrieval.module_source(entry).await {
                out.push_str(&format!("### {}\n{}\n\n", entry, truncate_chars(&source, SOURCE_LIMIT_CHARS)));
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(("Entry points".to_string(), out, Some(ContextCategory::SourceCode)))
        }
    }

    /// Best-effort legacy resolution: exact module id match, then suffix
    /// match, then basename match, else silently absent.
    async fn resolve_legacy(&self, raw: &str) -> Option<(String, String, Option<ContextCategory>)> {
        if let Some(artifact) = self.module_artifacts.get(&ModuleId::new(raw.to_string())) {
            return Some((
                format!("Module: {}", raw),
                truncate_chars(&artifact.summary, FOLDER_LIMIT_CHARS),
                None,
            ));
        }
        if let Some((id, artifact)) = self
            .module_artifacts
            .iter()
            .find(|(id, _)| id.as_str().ends_with(raw))
        {
            return Some((
                format!("Module: {}", id),
                truncate_chars(&artifact.summary, FOLDER_LIMIT_CHARS),
                None,
            ));
        }
        let basename = raw.rsplit('/').next().unwrap_or(raw);
        self.module_artifacts
            .iter()
            .find(|(id, _)| id.as_str().rsplit('/').next() == Some(basename))
            .map(|(id, artifact)| {
                (
                    format!("Module: {}", id),
                    truncate_chars(&artifact.summary, FOLDER_LIMIT_CHARS),
                    None,
                )
            })
    }
}

fn display_folder(folder: &str) -> &str {
    if folder.is_empty() {
        "."
    } else {
        folder
    }
}

fn extract_signature_lines(source: &str) -> String {
    source
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            t.starts_with("pub fn ")
                || t.starts_with("pub async fn ")
                || t.starts_with("pub struct ")
                || t.starts_with("pub enum ")
                || t.starts_with("pub trait ")
                || t.starts_with("fn ")
                || t.starts_with("struct ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_core::KeyFunction;
    use docgraph_retrieval::InMemoryRetrievalService;

    fn module_artifact(id: &str) -> ModuleArtifact {
        ModuleArtifact {
            module_id: ModuleId::new(id),
            summary: format!("summary of {id}"),
            responsibility: String::new(),
            key_functions: Vec::<KeyFunction>::new(),
            dependency_usage: String::new(),
            exports: Vec::new(),
            degraded: false,
        }
    }

    fn resolver_with(
        module_artifacts: HashMap<ModuleId, ModuleArtifact>,
        folder_artifacts: HashMap<String, FolderArtifact>,
        metadata: ProjectMetadata,
    ) -> ContextResolver {
        let mut retrieval = InMemoryRetrievalService::new();
        retrieval.add_module(ModuleId::new("src/main.rs"), "pub fn main() {}\n");
        ContextResolver::new(
            Arc::new(retrieval),
            module_artifacts,
            folder_artifacts,
            Arc::new(Mutex::new(HashMap::new())),
            metadata,
        )
    }

    #[tokio::test]
    async fn resolves_source_ref_and_reports_category() {
        let resolver = resolver_with(HashMap::new(), HashMap::new(), ProjectMetadata::default());
        let refs = vec![ContextRef::Source("src/main.rs".to_string())];
        let resolved = resolver.resolve(&refs, &[], false).await;
        assert!(resolved.has_source());
        assert!(resolved.text.contains("SOURCE CODE"));
        assert!(resolved.text.contains("pub fn main"));
    }

    #[tokio::test]
    async fn tutorial_section_without_source_gets_entry_point_injected() {
        let metadata = ProjectMetadata {
            entry_points: vec![ModuleId::new("src/main.rs")],
            ..Default::default()
        };
        let resolver = resolver_with(HashMap::new(), HashMap::new(), metadata);
        let refs = vec![ContextRef::Tree];
        let resolved = resolver.resolve(&refs, &[], true).await;
        assert!(resolved.has_source());
        assert!(resolved.text.contains("Entry points"));
    }

    #[tokio::test]
    async fn legacy_ref_falls_back_to_basename_match() {
        let mut modules = HashMap::new();
        modules.insert(ModuleId::new("src/core/util.rs"), module_artifact("src/core/util.rs"));
        let resolver = resolver_with(modules, HashMap::new(), ProjectMetadata::default());
        let refs = vec![ContextRef::Legacy("util.rs".to_string())];
        let resolved = resolver.resolve(&refs, &[], false).await;
        assert!(resolved.text.contains("src/core/util.rs"));
    }

    #[tokio::test]
    async fn depends_on_sections_are_always_included() {
        let resolver = resolver_with(HashMap::new(), HashMap::new(), ProjectMetadata::default());
        resolver
            .generated_sections
            .lock()
            .await
            .insert("overview".to_string(), GeneratedSection { id: "overview".to_string(), content: "intro text".to_string() });
        let resolved = resolver.resolve(&[], &["overview".to_string()], false).await;
        assert!(resolved.text.contains("intro text"));
    }
}
