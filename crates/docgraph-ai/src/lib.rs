pub mod parsing;
pub mod providers;
pub mod schemas;
pub mod tools;
pub mod transport;

pub use parsing::parse_structured;
pub use tools::{retrieval_tools, RetrievalToolExecutor, UsageTracker};
pub use transport::{
    GenerationConfig, LlmError, LlmResponse, LlmResult, LlmTransport, Message, MessageRole,
    ProviderCharacteristics, ToolCall, ToolDefinition,
};
