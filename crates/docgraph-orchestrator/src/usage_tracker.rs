use async_trait::async_trait;
use docgraph_ai::UsageTracker;
use docgraph_core::ModuleId;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// One recorded adaptive-write tool invocation, kept for the ambient RAG
/// usage report (supplementary, never consulted by the pipeline itself).
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: String,
    pub turn: usize,
    pub result_chars: usize,
}

/// Accumulates tool-call usage across a run so the final output assembly
/// can report how much retrieval the adaptive path actually did.
#[derive(Default)]
pub struct RagUsageTracker {
    calls: Mutex<HashMap<ModuleId, Vec<ToolInvocation>>>,
}

impl RagUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> HashMap<ModuleId, Vec<ToolInvocation>> {
        self.calls.lock().await.clone()
    }

    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().map(|v| v.len()).sum()
    }
}

#[async_trait]
impl UsageTracker for RagUsageTracker {
    async fn record(&self, module: &ModuleId, tool: &str, turn: usize, result_chars: usize) {
        let mut calls = self.calls.lock().await;
        calls.entry(module.clone()).or_default().push(ToolInvocation {
            tool: tool.to_string(),
            turn,
            result_chars,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_per_module() {
        let tracker = RagUsageTracker::new();
        tracker.record(&ModuleId::new("m"), "get_module_overview", 0, 120).await;
        tracker.record(&ModuleId::new("m"), "find_usage_patterns", 1, 80).await;
        assert_eq!(tracker.total_calls().await, 2);
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.get(&ModuleId::new("m")).unwrap().len(), 2);
    }
}
