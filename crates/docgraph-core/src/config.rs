use std::env;
use std::time::Duration;

/// Orchestrator-wide configuration, assembled once at startup from
/// environment variables. Never mutated after construction; read freely
/// from any task.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the global LLM-call semaphore.
    pub concurrency: usize,
    /// Max retry attempts per module after the first review failure.
    pub module_retries: u32,
    /// Max plan-review iterations.
    pub plan_retries: u32,
    /// Max SCC-context-length-exceeded retry attempts.
    pub scc_retries: u32,
    /// Retrieve-phase hard timeout.
    pub retrieve_timeout: Duration,
    /// Review-phase hard timeout.
    pub review_timeout: Duration,
    /// Total per-SCC character budget.
    pub scc_budget_chars: usize,
    /// Adaptive write max tool-call turns.
    pub max_turns: u32,
    /// Use the multi-turn tool-calling write path instead of the
    /// up-front-context static path.
    pub adaptive_write: bool,
    /// In adaptive mode, on review failure extract missing-entity names
    /// from reviewer feedback and fetch them via tool calls before retry.
    pub adaptive_auto_expand: bool,
    /// Output directory for the four deliverables.
    pub output_dir: String,
    /// Enable the `generation.log` debug sink.
    pub generation_log: bool,
    /// Model identifier for the fast transport tier.
    pub fast_model: String,
    /// Model identifier for the reasoning transport tier.
    pub reasoning_model: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: env_or("DOCGRAPH_CONCURRENCY", 20),
            module_retries: env_or("DOCGRAPH_MODULE_RETRIES", 1),
            plan_retries: env_or("DOCGRAPH_PLAN_RETRIES", 2),
            scc_retries: env_or("DOCGRAPH_SCC_RETRIES", 3),
            retrieve_timeout: Duration::from_secs(env_or("DOCGRAPH_RETRIEVE_TIMEOUT_SECS", 10)),
            review_timeout: Duration::from_secs(env_or("DOCGRAPH_REVIEW_TIMEOUT_SECS", 60)),
            scc_budget_chars: env_or("DOCGRAPH_SCC_BUDGET_CHARS", 60_000),
            max_turns: env_or("DOCGRAPH_MAX_TURNS", 3),
            adaptive_write: env_bool("DOCGRAPH_ADAPTIVE_WRITE", true),
            adaptive_auto_expand: env_bool("DOCGRAPH_ADAPTIVE_AUTO_EXPAND", true),
            output_dir: env::var("DOCGRAPH_OUTPUT_DIR").unwrap_or_else(|_| "./output".to_string()),
            generation_log: env_bool("DOCGRAPH_GENERATION_LOG", false),
            fast_model: env::var("DOCGRAPH_FAST_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            reasoning_model: env::var("DOCGRAPH_REASONING_MODEL")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
        }
    }
}

impl OrchestratorConfig {
    /// Construct from the environment, mirroring `AnthropicConfig::from_env`
    /// style used by the LLM provider layer: read once, validate eagerly.
    pub fn from_env() -> crate::error::Result<Self> {
        let config = Self::default();
        if config.concurrency == 0 {
            return Err(crate::error::DocGraphError::Configuration(
                "DOCGRAPH_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if config.output_dir.trim().is_empty() {
            return Err(crate::error::DocGraphError::Configuration(
                "DOCGRAPH_OUTPUT_DIR must not be empty".to_string(),
            ));
        }
        Ok(config)
    }
}
