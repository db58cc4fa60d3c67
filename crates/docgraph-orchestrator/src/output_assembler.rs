use crate::batch_scheduler::BatchResult;
use crate::plan::PlanOutput;
use docgraph_core::{DocGraphError, FolderArtifact, ModuleArtifact, Result, RunSummary};
use std::path::PathBuf;

/// Writes the four deliverables plus the `RunSummary`, and (when enabled)
/// flushes the `generation.log` debug sink.
pub struct OutputAssembler {
    output_dir: PathBuf,
}

impl OutputAssembler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub async fn write_all(
        &self,
        batch: &BatchResult,
        folders: &[FolderArtifact],
        plan_output: &PlanOutput,
        wall_clock_ms: u128,
    ) -> Result<RunSummary> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| DocGraphError::OutputDirectory(e.to_string()))?;

        self.write_file("modules.txt", &render_modules(batch)).await?;
        self.write_file("folders.txt", &render_folders(folders)).await?;
        self.write_file("scc_contexts.txt", &render_scc_contexts(batch)).await?;
        self.write_file("final.md", &plan_output.document).await?;

        let mut documented: Vec<_> = batch.artifacts.keys().cloned().collect();
        documented.sort();

        let summary = RunSummary {
            run_id: uuid::Uuid::new_v4().to_string(),
            documented,
            failed: batch.failed.clone(),
            scc_count: batch.scc_contexts.len(),
            wall_clock_ms,
        };

        tracing::info!(
            run_id = %summary.run_id,
            documented = summary.documented.len(),
            failed = summary.failed.len(),
            scc_count = summary.scc_count,
            wall_clock_ms = summary.wall_clock_ms,
            "documentation run complete"
        );
        for warning in &plan_output.warnings {
            tracing::warn!(%warning, "plan pipeline warning");
        }

        Ok(summary)
    }

    async fn write_file(&self, name: &str, content: &str) -> Result<()> {
        let path = self.output_dir.join(name);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| DocGraphError::OutputDirectory(format!("{}: {e}", path.display())))
    }
}

fn render_modules(batch: &BatchResult) -> String {
    let mut ids: Vec<_> = batch.artifacts.keys().cloned().collect();
    ids.sort();

    let mut out = String::new();
    for id in &ids {
        let artifact = &batch.artifacts[id];
        out.push_str(&render_module_artifact(artifact));
        out.push_str("\n---\n\n");
    }
    if !batch.failed.is_empty() {
        out.push_str("# Failed modules\n\n");
        let mut failed = batch.failed.clone();
        failed.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, reason) in &failed {
            out.push_str(&format!("- {}: {}\n", id, reason));
        }
    }
    out
}

fn render_module_artifact(artifact: &ModuleArtifact) -> String {
    let mut out = format!("# {}\n\n{}\n\n**Responsibility:** {}\n", artifact.module_id, artifact.summary, artifact.responsibility);
    if !artifact.key_functions.is_empty() {
        out.push_str("\n**Key functions:**\n");
        for f in &artifact.key_functions {
            out.push_str(&format!("- `{}`: {}\n", f.name, f.purpose));
        }
    }
    if !artifact.dependency_usage.is_empty() {
        out.push_str(&format!("\n**Dependency usage:** {}\n", artifact.dependency_usage));
    }
    if !artifact.exports.is_empty() {
        out.push_str(&format!("\n**Exports:** {}\n", artifact.exports.join(", ")));
    }
    if artifact.degraded {
        out.push_str("\n_(degraded: produced from unstructured model output)_\n");
    }
    out
}

fn render_folders(folders: &[FolderArtifact]) -> String {
    folders
        .iter()
        .map(|f| {
            format!(
                "# {}\n\n{}\n",
                if f.folder_path.is_empty() { "." } else { &f.folder_path },
                f.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

fn render_scc_contexts(batch: &BatchResult) -> String {
    let mut ids: Vec<_> = batch.scc_contexts.keys().cloned().collect();
    ids.sort();
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let context = &batch.scc_contexts[id];
            let members = context
                .member_ids
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("# SCC #{} ({})\n\n{}\n", i + 1, members, context.text)
        })
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_core::{KeyFunction, ModuleId, SccContext, SccId};
    use std::collections::HashMap;

    fn sample_artifact() -> ModuleArtifact {
        ModuleArtifact {
            module_id: ModuleId::new("src/lib.rs"),
            summary: "top-level glue".to_string(),
            responsibility: "wires the crate together".to_string(),
            key_functions: vec![KeyFunction { name: "run".to_string(), purpose: "entry point".to_string() }],
            dependency_usage: String::new(),
            exports: vec!["run".to_string()],
            degraded: false,
        }
    }

    #[tokio::test]
    async fn writes_four_deliverables() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifacts = HashMap::new();
        artifacts.insert(ModuleId::new("src/lib.rs"), sample_artifact());
        let mut scc_contexts = HashMap::new();
        scc_contexts.insert(
            SccId(0),
            std::sync::Arc::new(SccContext {
                scc_id: SccId(0),
                member_ids: vec![ModuleId::new("a"), ModuleId::new("b")],
                text: "a tight pair".to_string(),
            }),
        );
        let batch = BatchResult {
            artifacts,
            failed: vec![(ModuleId::new("broken"), "retrieve timed out".to_string())],
            scc_contexts,
        };
        let folders = vec![FolderArtifact {
            folder_path: "src".to_string(),
            summary: "core source".to_string(),
            member_module_ids: vec![ModuleId::new("src/lib.rs")],
            child_folder_paths: vec![],
        }];
        let plan_output = PlanOutput {
            plan: crate::plan::generate_default_plan(),
            document: "# Docs\n\n## Overview\n\nhello\n".to_string(),
            sections: vec![],
            warnings: vec!["a warning".to_string()],
        };

        let assembler = OutputAssembler::new(dir.path());
        let summary = assembler.write_all(&batch, &folders, &plan_output, 1234).await.unwrap();

        assert_eq!(summary.documented, vec![ModuleId::new("src/lib.rs")]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.scc_count, 1);

        for name in ["modules.txt", "folders.txt", "scc_contexts.txt", "final.md"] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
        let modules_txt = tokio::fs::read_to_string(dir.path().join("modules.txt")).await.unwrap();
        assert!(modules_txt.contains("top-level glue"));
        assert!(modules_txt.contains("broken"));
    }
}
