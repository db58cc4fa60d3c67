use chrono::Utc;
use docgraph_core::{DocGraphError, Result};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Supplemented debug sink: when `DOCGRAPH_GENERATION_LOG` is enabled,
/// records every notable orchestration event (tool calls, retries, degraded
/// artifacts, plan fallbacks) to `generation.log` in the output directory.
/// Disabled by default; never read back by the pipeline itself.
pub struct GenerationLog {
    enabled: bool,
    path: PathBuf,
    lines: Mutex<Vec<String>>,
}

impl GenerationLog {
    pub fn new(output_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        let mut path = output_dir.into();
        path.push("generation.log");
        Self {
            enabled,
            path,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub async fn record(&self, message: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let mut lines = self.lines.lock().await;
        lines.push(format!("[{}] {}", Utc::now().to_rfc3339(), message.into()));
    }

    pub async fn flush(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let lines = self.lines.lock().await;
        if lines.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DocGraphError::OutputDirectory(e.to_string()))?;
        }
        tokio::fs::write(&self.path, lines.join("\n"))
            .await
            .map_err(|e| DocGraphError::OutputDirectory(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_log_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let log = GenerationLog::new(dir.path(), false);
        log.record("hello").await;
        log.flush().await.unwrap();
        assert!(!dir.path().join("generation.log").exists());
    }

    #[tokio::test]
    async fn enabled_log_writes_recorded_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = GenerationLog::new(dir.path(), true);
        log.record("module a retried").await;
        log.flush().await.unwrap();
        let content = tokio::fs::read_to_string(dir.path().join("generation.log")).await.unwrap();
        assert!(content.contains("module a retried"));
    }
}
