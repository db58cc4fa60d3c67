use crate::chunk::{CodeChunk, EntityKind};
use docgraph_core::ModuleId;
use once_cell::sync::Lazy;
use regex::Regex;

static FUNCTION_DEF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(?:pub\s+)?(?:async\s+)?fn\s+(\w+)\s*[\(<]").unwrap());
static CLASS_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(?:pub\s+)?(?:struct|class|enum|trait|impl)\s+(\w+)").unwrap()
});

/// Splits module source into function/class chunks by indentation-delimited
/// blocks, the reference AST chunker standing in for a real parser: only
/// the chunk boundaries and entity names matter to the orchestrator, not
/// how they were derived.
pub fn chunk_module(module_id: &ModuleId, source: &str) -> Vec<CodeChunk> {
    let lines: Vec<&str> = source.lines().collect();
    let mut boundaries: Vec<(usize, usize, EntityKind, String)> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if let Some(caps) = FUNCTION_DEF.captures(line) {
            let indent = caps[1].len();
            let name = caps[2].to_string();
            boundaries.push((i, indent, EntityKind::Function, name));
        } else if let Some(caps) = CLASS_DEF.captures(line) {
            let indent = caps[1].len();
            let name = caps[2].to_string();
            boundaries.push((i, indent, EntityKind::Class, name));
        }
    }

    let mut chunks = Vec::with_capacity(boundaries.len());
    for (idx, (start, indent, kind, name)) in boundaries.iter().enumerate() {
        let end = boundaries
            .iter()
            .skip(idx + 1)
            .find(|(_, other_indent, _, _)| other_indent <= indent)
            .map(|(other_start, ..)| *other_start)
            .unwrap_or(lines.len());

        let text = lines[*start..end].join("\n");
        chunks.push(CodeChunk {
            module_id: module_id.clone(),
            entity_name: Some(name.clone()),
            kind: *kind,
            text,
            start_line: start + 1,
            end_line: end,
        });
    }
    chunks
}

/// The module chunk covering the full source, used as the top-k fallback
/// when no entity-level chunks were extracted.
pub fn whole_module_chunk(module_id: &ModuleId, source: &str) -> CodeChunk {
    CodeChunk {
        module_id: module_id.clone(),
        entity_name: None,
        kind: EntityKind::Module,
        text: source.to_string(),
        start_line: 1,
        end_line: source.lines().count(),
    }
}
