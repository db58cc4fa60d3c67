use docgraph_ai::schemas::PlanData;
use docgraph_ai::{parse_structured, GenerationConfig, LlmTransport, Message};
use docgraph_core::{ContextRef, DocPlan, FolderArtifact, Section};
use std::collections::HashMap;
use std::sync::Arc;

/// Generates a `DocPlan` from the project's folder summaries via the
/// fast-tier transport. Parse failures are surfaced to the caller, which
/// decides between retrying and falling back to `generate_default_plan`.
pub struct PlanGenerator {
    transport: Arc<dyn LlmTransport>,
}

impl PlanGenerator {
    pub fn new(transport: Arc<dyn LlmTransport>) -> Self {
        Self { transport }
    }

    pub async fn generate(
        &self,
        folder_artifacts: &HashMap<String, FolderArtifact>,
        module_count: usize,
        prior_feedback: Option<&str>,
    ) -> Result<DocPlan, String> {
        let mut folders: Vec<&FolderArtifact> = folder_artifacts.values().collect();
        folders.sort_by(|a, b| a.folder_path.cmp(&b.folder_path));
        let folder_lines: String = folders
            .iter()
            .map(|f| format!("- {}: {}", if f.folder_path.is_empty() { "." } else { &f.folder_path }, f.summary))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            "Project has {} documented modules across these folders:\n{}\n\n\
             Produce a documentation plan as JSON: {{\"project_type\": str, \"audience\": str, \
             \"primary_use_case\": str, \"architecture_pattern\": str, \
             \"sections\": [{{\"section_id\": str, \"title\": str, \"purpose\": str, \
             \"required_context\": [str], \"style\": str, \"max_tokens\": int, \
             \"dependencies\": [str]}}], \"glossary\": [str]}}\n\n\
             `required_context` entries must use the vocabulary: folder:{{path}}, module:{{id}}, \
             source:{{id}}, api:{{id}}, config:{{name}}, section:{{id}}, tree, all_folders, \
             entry_points, configs, deps.",
            module_count, folder_lines,
        );
        if let Some(feedback) = prior_feedback {
            prompt.push_str(&format!("\n\nThe previous plan was rejected with this feedback: {}\n", feedback));
        }

        let messages = vec![
            Message::system("You design the structure of a project's generated documentation."),
            Message::user(prompt),
        ];

        let response = self
            .transport
            .generate_chat(&messages, &GenerationConfig { json_mode: true, ..Default::default() })
            .await
            .map_err(|e| e.to_string())?;

        parse_structured::<PlanData>(&response.content).map(plan_from_data)
    }
}

fn plan_from_data(data: PlanData) -> DocPlan {
    DocPlan {
        project_type: data.project_type,
        audience: data.audience,
        primary_use_case: data.primary_use_case,
        architecture_pattern: data.architecture_pattern,
        sections: data
            .sections
            .into_iter()
            .map(|s| Section {
                id: s.section_id,
                title: s.title,
                purpose: s.purpose,
                style: s.style,
                max_tokens: s.max_tokens,
                context_refs: s.required_context.iter().map(|c| ContextRef::parse(c)).collect(),
                depends_on: s.dependencies,
            })
            .collect(),
        glossary: data.glossary,
    }
}

/// Built-in fallback plan, used when the LLM-produced plan can't be parsed
/// after plan-review retries are exhausted.
pub fn generate_default_plan() -> DocPlan {
    DocPlan {
        project_type: "library".to_string(),
        audience: "developers integrating or contributing to this project".to_string(),
        primary_use_case: "understand and use the project's public surface".to_string(),
        architecture_pattern: "modular".to_string(),
        sections: vec![
            Section {
                id: "overview".to_string(),
                title: "Overview".to_string(),
                purpose: "Introduce the project and what it does.".to_string(),
                style: "narrative".to_string(),
                max_tokens: 600,
                context_refs: vec![ContextRef::Tree],
                depends_on: vec![],
            },
            Section {
                id: "installation".to_string(),
                title: "Installation".to_string(),
                purpose: "Explain how to build or install the project.".to_string(),
                style: "procedural".to_string(),
                max_tokens: 500,
                context_refs: vec![ContextRef::Deps, ContextRef::Configs],
                depends_on: vec![],
            },
            Section {
                id: "architecture".to_string(),
                title: "Architecture".to_string(),
                purpose: "Describe how the modules and folders fit together.".to_string(),
                style: "narrative".to_string(),
                max_tokens: 900,
                context_refs: vec![ContextRef::Tree, ContextRef::AllFolders],
                depends_on: vec!["overview".to_string()],
            },
            Section {
                id: "api-reference".to_string(),
                title: "API Reference".to_string(),
                purpose: "Document the public entry points.".to_string(),
                style: "reference".to_string(),
                max_tokens: 1200,
                context_refs: vec![ContextRef::EntryPoints],
                depends_on: vec!["architecture".to_string()],
            },
        ],
        glossary: Vec::new(),
    }
}
