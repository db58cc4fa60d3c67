use thiserror::Error;

/// Error taxonomy for the documentation orchestrator.
///
/// Variants map onto the error-handling policy table: most are recoverable
/// at a specific phase and never cancel the batch. Only a handful are fatal
/// for the whole run (see `DocGraphError::is_fatal`).
#[derive(Error, Debug)]
pub enum DocGraphError {
    #[error("module {module} failed during retrieve: {source}")]
    RetrieveFailed {
        module: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("retrieve timed out for module {module} after {timeout_secs}s")]
    RetrieveTimeout { module: String, timeout_secs: u64 },

    #[error("write failed for module {module}: {source}")]
    WriteFailed {
        module: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("review timed out for module {module} after {timeout_secs}s")]
    ReviewTimeout { module: String, timeout_secs: u64 },

    #[error("structured output parse failure: {0}")]
    ParseFailure(String),

    #[error("tool call {tool} failed: {message}")]
    ToolCallFailed { tool: String, message: String },

    #[error("plan generation failed: {0}")]
    PlanGenerationFailed(String),

    #[error("plan DAG contains a cycle")]
    PlanCycle,

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("analyzer failed to start: {0}")]
    AnalyzerUnavailable(String),

    #[error("output directory error: {0}")]
    OutputDirectory(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DocGraphError {
    /// Fatal errors abort the whole run; everything else degrades a single
    /// module, section, or SCC and is collected for the run summary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DocGraphError::AnalyzerUnavailable(_)
                | DocGraphError::OutputDirectory(_)
                | DocGraphError::Configuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DocGraphError>;
