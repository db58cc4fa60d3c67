use docgraph_core::ModuleId;
use serde::{Deserialize, Serialize};

/// What kind of source entity a `CodeChunk` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Module,
    Function,
    Class,
}

/// One retrievable unit of source: a whole-module chunk, or a single
/// function/class definition with its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChunk {
    pub module_id: ModuleId,
    pub entity_name: Option<String>,
    pub kind: EntityKind,
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl CodeChunk {
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            self.text.clone()
        } else {
            let mut truncated: String = self.text.chars().take(max_chars).collect();
            truncated.push_str("\n# ... (truncated)");
            truncated
        }
    }
}
