pub mod anthropic;
pub mod mock;
pub mod openai_compatible;

pub use anthropic::{AnthropicConfig, AnthropicTransport};
pub use mock::MockTransport;
pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleTransport};
