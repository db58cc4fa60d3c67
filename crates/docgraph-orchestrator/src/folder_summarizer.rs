use docgraph_ai::{GenerationConfig, LlmTransport, Message};
use docgraph_core::{FolderArtifact, ModuleArtifact, ModuleId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builds a bottom-up `FolderArtifact` per folder in the source tree: leaf
/// folders first, then folders whose only summarizable content is their
/// already-summarized subfolders. A folder with no modules and no
/// subfolders never appears (it can't arise from `ModuleArtifact` paths).
pub struct FolderSummarizer {
    transport: Arc<dyn LlmTransport>,
}

impl FolderSummarizer {
    pub fn new(transport: Arc<dyn LlmTransport>) -> Self {
        Self { transport }
    }

    /// Returns artifacts sorted by folder path, deepest folders summarized
    /// first internally but the returned order is stable and alphabetical
    /// regardless of processing order or map iteration.
    pub async fn build(&self, artifacts: &HashMap<ModuleId, ModuleArtifact>) -> Vec<FolderArtifact> {
        let mut folder_members: HashMap<String, Vec<ModuleId>> = HashMap::new();
        let mut all_folders: HashSet<String> = HashSet::new();

        for module in artifacts.keys() {
            let folder = module_folder(module);
            folder_members.entry(folder.clone()).or_default().push(module.clone());
            let mut cur = folder;
            all_folders.insert(cur.clone());
            while let Some(parent) = folder_parent(&cur) {
                all_folders.insert(parent.clone());
                cur = parent;
            }
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for folder in &all_folders {
            if let Some(parent) = folder_parent(folder) {
                children.entry(parent).or_default().push(folder.clone());
            }
        }
        for list in children.values_mut() {
            list.sort();
        }
        for list in folder_members.values_mut() {
            list.sort();
        }

        let mut order: Vec<String> = all_folders.into_iter().collect();
        order.sort_by_key(|f| std::cmp::Reverse(folder_depth(f)));

        let mut results: HashMap<String, FolderArtifact> = HashMap::new();
        for folder in &order {
            let member_ids = folder_members.get(folder).cloned().unwrap_or_default();
            let child_paths = children.get(folder).cloned().unwrap_or_default();

            let member_summaries: Vec<(String, String)> = member_ids
                .iter()
                .filter_map(|m| artifacts.get(m).map(|a| (m.to_string(), a.summary.clone())))
                .collect();
            let child_summaries: Vec<(String, String)> = child_paths
                .iter()
                .filter_map(|c| results.get(c).map(|a| (c.clone(), a.summary.clone())))
                .collect();

            let summary = self.summarize_folder(folder, &member_summaries, &child_summaries).await;

            results.insert(
                folder.clone(),
                FolderArtifact {
                    folder_path: folder.clone(),
                    summary,
                    member_module_ids: member_ids,
                    child_folder_paths: child_paths,
                },
            );
        }

        let mut out: Vec<FolderArtifact> = results.into_values().collect();
        out.sort_by(|a, b| a.folder_path.cmp(&b.folder_path));
        out
    }

    async fn summarize_folder(
        &self,
        folder: &str,
        member_summaries: &[(String, String)],
        child_summaries: &[(String, String)],
    ) -> String {
        if member_summaries.is_empty() && child_summaries.is_empty() {
            return format!("`{}` contains no documented modules.", display_folder(folder));
        }

        let prompt = build_prompt(folder, member_summaries, child_summaries);
        let messages = vec![
            Message::system(
                "You summarize a source folder in two or three sentences, given the summaries \
                 of its modules and subfolders.",
            ),
            Message::user(prompt),
        ];

        match self.transport.generate_chat(&messages, &GenerationConfig::default()).await {
            Ok(response) => response.content.trim().to_string(),
            Err(e) => {
                tracing::warn!(folder = %display_folder(folder), error = %e, "folder summary failed, using fallback");
                fallback_summary(folder, member_summaries, child_summaries)
            }
        }
    }
}

fn module_folder(module: &ModuleId) -> String {
    match module.as_str().rfind('/') {
        Some(idx) => module.as_str()[..idx].to_string(),
        None => String::new(),
    }
}

fn folder_parent(folder: &str) -> Option<String> {
    if folder.is_empty() {
        return None;
    }
    match folder.rfind('/') {
        Some(idx) => Some(folder[..idx].to_string()),
        None => Some(String::new()),
    }
}

fn folder_depth(folder: &str) -> usize {
    if folder.is_empty() {
        0
    } else {
        folder.matches('/').count() + 1
    }
}

fn display_folder(folder: &str) -> &str {
    if folder.is_empty() {
        "."
    } else {
        folder
    }
}

fn build_prompt(folder: &str, members: &[(String, String)], children: &[(String, String)]) -> String {
    let mut out = format!("Folder: {}\n\n", display_folder(folder));
    if !members.is_empty() {
        out.push_str("Modules:\n");
        for (name, summary) in members {
            out.push_str(&format!("- {}: {}\n", name, summary));
        }
    }
    if !children.is_empty() {
        out.push_str("\nSubfolders:\n");
        for (path, summary) in children {
            out.push_str(&format!("- {}: {}\n", display_folder(path), summary));
        }
    }
    out
}

fn fallback_summary(folder: &str, members: &[(String, String)], children: &[(String, String)]) -> String {
    let member_names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
    let child_names: Vec<&str> = children.iter().map(|(n, _)| n.as_str()).collect();
    let mut parts = Vec::new();
    if !member_names.is_empty() {
        parts.push(format!("modules: {}", member_names.join(", ")));
    }
    if !child_names.is_empty() {
        parts.push(format!("subfolders: {}", child_names.join(", ")));
    }
    format!("`{}` contains {}.", display_folder(folder), parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_ai::providers::mock::MockTransport;
    use docgraph_core::KeyFunction;

    fn artifact(id: &str, summary: &str) -> ModuleArtifact {
        ModuleArtifact {
            module_id: ModuleId::new(id),
            summary: summary.to_string(),
            responsibility: String::new(),
            key_functions: Vec::<KeyFunction>::new(),
            dependency_usage: String::new(),
            exports: Vec::new(),
            degraded: false,
        }
    }

    #[tokio::test]
    async fn nested_folders_summarized_deepest_first() {
        let mut artifacts = HashMap::new();
        artifacts.insert(ModuleId::new("src/core/parser.rs"), artifact("src/core/parser.rs", "parses input"));
        artifacts.insert(ModuleId::new("src/core/lexer.rs"), artifact("src/core/lexer.rs", "lexes input"));
        artifacts.insert(ModuleId::new("src/main.rs"), artifact("src/main.rs", "entry point"));

        let transport = Arc::new(MockTransport::fixed_text("a tidy folder"));
        let summarizer = FolderSummarizer::new(transport);

        let folders = summarizer.build(&artifacts).await;
        let paths: Vec<&str> = folders.iter().map(|f| f.folder_path.as_str()).collect();
        assert_eq!(paths, vec!["src", "src/core"]);

        let src = folders.iter().find(|f| f.folder_path == "src").unwrap();
        assert_eq!(src.child_folder_paths, vec!["src/core".to_string()]);
        assert_eq!(src.member_module_ids, vec![ModuleId::new("src/main.rs")]);
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_deterministic_summary() {
        let mut artifacts = HashMap::new();
        artifacts.insert(ModuleId::new("lib.rs"), artifact("lib.rs", "root module"));

        let transport = Arc::new(MockTransport::new(vec![])); // empty -> mock returns "{}" placeholder, not an error
        let summarizer = FolderSummarizer::new(transport);
        let folders = summarizer.build(&artifacts).await;
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].folder_path, "");
    }
}
