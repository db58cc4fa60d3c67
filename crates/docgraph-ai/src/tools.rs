use crate::transport::ToolDefinition;
use async_trait::async_trait;
use docgraph_core::ModuleId;
use docgraph_retrieval::RetrievalService;
use serde_json::json;
use std::sync::Arc;

/// The five adaptive-mode tools (§4.2.2), fixed JSON schemas matching the
/// argument names a tool-calling-capable transport is told to advertise.
pub fn retrieval_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "get_function_details",
            "Get the full source and metadata for a specific function in a module.",
            json!({
                "type": "object",
                "properties": {
                    "module": {"type": "string", "description": "Module name"},
                    "function_name": {"type": "string", "description": "Function name"},
                },
                "required": ["module", "function_name"],
            }),
        ),
        ToolDefinition::function(
            "get_class_details",
            "Get the full source and method list for a specific class in a module.",
            json!({
                "type": "object",
                "properties": {
                    "module": {"type": "string", "description": "Module name"},
                    "class_name": {"type": "string", "description": "Class name"},
                },
                "required": ["module", "class_name"],
            }),
        ),
        ToolDefinition::function(
            "get_module_overview",
            "Get the top-k most representative chunks of a module.",
            json!({
                "type": "object",
                "properties": {
                    "module": {"type": "string", "description": "Module name"},
                    "k": {"type": "integer", "description": "Number of chunks to return", "default": 5},
                },
                "required": ["module"],
            }),
        ),
        ToolDefinition::function(
            "find_usage_patterns",
            "Find chunks that reference a given entity, excluding its own definition.",
            json!({
                "type": "object",
                "properties": {
                    "entity_name": {"type": "string", "description": "Function or class name"},
                    "limit": {"type": "integer", "description": "Maximum results", "default": 5},
                },
                "required": ["entity_name"],
            }),
        ),
        ToolDefinition::function(
            "get_dependency_exports",
            "Get the top exported names of a dependency module.",
            json!({
                "type": "object",
                "properties": {
                    "module": {"type": "string", "description": "Dependency module name"},
                },
                "required": ["module"],
            }),
        ),
    ]
}

/// Dispatches tool-call invocations to a `RetrievalService` and formats the
/// results as the plain text the conversation history expects, matching
/// the markdown conventions and truncation lengths of the tools above.
pub struct RetrievalToolExecutor {
    retrieval: Arc<dyn RetrievalService>,
    tracker: Option<Arc<dyn UsageTracker>>,
}

/// Observes tool-call invocations for the ambient RAG usage report; never
/// allowed to fail the pipeline.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    async fn record(&self, module: &ModuleId, tool: &str, turn: usize, result_chars: usize);
}

impl RetrievalToolExecutor {
    pub fn new(retrieval: Arc<dyn RetrievalService>) -> Self {
        Self {
            retrieval,
            tracker: None,
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn UsageTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub async fn execute(
        &self,
        module: &ModuleId,
        turn: usize,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> String {
        let result = match tool_name {
            "get_function_details" => self.get_function_details(arguments).await,
            "get_class_details" => self.get_class_details(arguments).await,
            "get_module_overview" => self.get_module_overview(arguments).await,
            "find_usage_patterns" => self.find_usage_patterns(arguments).await,
            "get_dependency_exports" => self.get_dependency_exports(arguments).await,
            other => format!("Error: unknown tool `{}`", other),
        };

        if let Some(tracker) = &self.tracker {
            tracker.record(module, tool_name, turn, result.len()).await;
        }
        result
    }

    async fn get_function_details(&self, args: &serde_json::Value) -> String {
        let module = ModuleId::new(args["module"].as_str().unwrap_or_default());
        let name = args["function_name"].as_str().unwrap_or_default();
        match self.retrieval.search_by_entity(&module, name).await {
            Some(chunk) => format!(
                "## Function `{}` in `{}`\n\n```\n{}\n```\n",
                name,
                module,
                chunk.preview(400)
            ),
            None => format!("No function named `{}` found in `{}`.", name, module),
        }
    }

    async fn get_class_details(&self, args: &serde_json::Value) -> String {
        let module = ModuleId::new(args["module"].as_str().unwrap_or_default());
        let name = args["class_name"].as_str().unwrap_or_default();
        match self.retrieval.search_by_entity(&module, name).await {
            Some(chunk) => format!(
                "## Class `{}` in `{}`\n\n```\n{}\n```\n",
                name,
                module,
                chunk.preview(400)
            ),
            None => format!("No class named `{}` found in `{}`.", name, module),
        }
    }

    async fn get_module_overview(&self, args: &serde_json::Value) -> String {
        let module = ModuleId::new(args["module"].as_str().unwrap_or_default());
        let k = args["k"].as_u64().unwrap_or(5) as usize;
        let chunks = self.retrieval.search_module_top_k(&module, k).await;
        if chunks.is_empty() {
            return format!("No overview chunks available for `{}`.", module);
        }
        let mut out = format!("## Overview of `{}`\n\n", module);
        for chunk in chunks {
            out.push_str(&format!(
                "- `{}`:\n```\n{}\n```\n",
                chunk.entity_name.unwrap_or_else(|| "(module)".to_string()),
                chunk.preview(300)
            ));
        }
        out
    }

    async fn find_usage_patterns(&self, args: &serde_json::Value) -> String {
        let entity = args["entity_name"].as_str().unwrap_or_default();
        let limit = args["limit"].as_u64().unwrap_or(5) as usize;
        let usages = self.retrieval.search_usages(entity, limit).await;
        if usages.is_empty() {
            return format!("No usages found for `{}`.", entity);
        }
        let mut out = format!("## Usages of `{}`\n\n", entity);
        for chunk in usages {
            out.push_str(&format!(
                "- in `{}`:\n```\n{}\n```\n",
                chunk.module_id,
                chunk.preview(200)
            ));
        }
        out
    }

    async fn get_dependency_exports(&self, args: &serde_json::Value) -> String {
        let module = ModuleId::new(args["module"].as_str().unwrap_or_default());
        let exports = self.retrieval.search_exports(&module, 3).await;
        if exports.is_empty() {
            format!("`{}` has no discoverable exports.", module)
        } else {
            format!(
                "## Exports of `{}`\n\n{}",
                module,
                exports
                    .iter()
                    .map(|e| format!("- `{}`", e))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_retrieval::InMemoryRetrievalService;
    use serde_json::json;

    #[tokio::test]
    async fn get_function_details_formats_found_entity() {
        let mut service = InMemoryRetrievalService::new();
        service.add_module(ModuleId::new("m"), "fn helper() {\n    1\n}\n");
        let executor = RetrievalToolExecutor::new(Arc::new(service));
        let result = executor
            .execute(
                &ModuleId::new("m"),
                0,
                "get_function_details",
                &json!({"module": "m", "function_name": "helper"}),
            )
            .await;
        assert!(result.contains("helper"));
    }

    #[tokio::test]
    async fn unknown_tool_reports_error() {
        let service = InMemoryRetrievalService::new();
        let executor = RetrievalToolExecutor::new(Arc::new(service));
        let result = executor
            .execute(&ModuleId::new("m"), 0, "nonexistent_tool", &json!({}))
            .await;
        assert!(result.starts_with("Error:"));
    }
}
