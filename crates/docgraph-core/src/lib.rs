pub mod config;
pub mod error;
pub mod types;
pub mod util;

pub use config::OrchestratorConfig;
pub use error::{DocGraphError, Result};
pub use types::*;
pub use util::truncate_chars;
