use docgraph_core::ModuleId;
use docgraph_graph::InMemoryGraphAnalyzer;
use docgraph_retrieval::InMemoryRetrievalService;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SOURCE_EXTENSIONS: &[&str] = &["rs", "py", "js", "ts", "go"];
const SKIP_DIRS: &[&str] = &["target", "node_modules", ".git", "dist", "build", "__pycache__", "venv"];

static RUST_USE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*use\s+(?:crate::|self::|super::)?([\w:]+)").unwrap());
static PY_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:from\s+([\w\.]+)\s+import|import\s+([\w\.]+))").unwrap());
static JS_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:import\s+.*from\s+|require\()\s*['"](\.[^'"]+)['"]"#).unwrap());
static GO_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^\s*"([\w\./\-]+)"\s*$"#).unwrap());

/// Walks `root` for recognized source files and builds an `InMemoryGraphAnalyzer`
/// plus an `InMemoryRetrievalService` backed by real file contents, the
/// filesystem-facing reference implementation of the import-parser interface.
pub struct Discovered {
    pub analyzer: InMemoryGraphAnalyzer,
    pub retrieval: InMemoryRetrievalService,
    pub configs: Vec<(String, String)>,
    pub tree_outline: String,
}

pub fn discover(root: &Path) -> anyhow::Result<Discovered> {
    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort();

    let mut sources: HashMap<ModuleId, String> = HashMap::new();
    for rel in &files {
        let content = std::fs::read_to_string(root.join(rel)).unwrap_or_default();
        sources.insert(ModuleId::new(rel.to_string_lossy().replace('\\', "/")), content);
    }

    let module_ids: Vec<ModuleId> = sources.keys().cloned().collect();

    let mut analyzer = InMemoryGraphAnalyzer::new();
    let mut retrieval = InMemoryRetrievalService::new();
    for module in &module_ids {
        let source = &sources[module];
        let deps = parse_imports(module, source, &module_ids);
        analyzer.add_module(module.clone(), deps);
        analyzer.with_source_path(module.clone(), root.join(module.as_str()));
        retrieval.add_module(module.clone(), source.clone());
    }

    let configs = discover_configs(root);
    let tree_outline = render_tree(&module_ids);

    Ok(Discovered { analyzer, retrieval, configs, tree_outline })
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if SKIP_DIRS.contains(&name.as_ref()) || name.starts_with('.') {
                continue;
            }
            walk(root, &path, out)?;
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if SOURCE_EXTENSIONS.contains(&ext) {
                if let Ok(rel) = path.strip_prefix(root) {
                    out.push(rel.to_path_buf());
                }
            }
        }
    }
    Ok(())
}

/// Best-effort import resolution: regex-extracts the raw import target per
/// language, then keeps only the ones that resolve to another discovered
/// module (suffix match on path components); everything else is treated
/// as an external dependency and silently dropped, matching `GraphAnalyzer`'s
/// documented contract.
fn parse_imports(module: &ModuleId, source: &str, all_modules: &[ModuleId]) -> Vec<ModuleId> {
    let mut targets = Vec::new();
    let is_rust = module.as_str().ends_with(".rs");
    let is_python = module.as_str().ends_with(".py");
    let is_go = module.as_str().ends_with(".go");

    for line in source.lines() {
        if is_rust {
            if let Some(caps) = RUST_USE.captures(line) {
                targets.push(caps[1].replace("::", "/"));
            }
        } else if is_python {
            if let Some(caps) = PY_IMPORT.captures(line) {
                let raw = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
                targets.push(raw.replace('.', "/"));
            }
        } else if is_go {
            if let Some(caps) = GO_IMPORT.captures(line) {
                targets.push(caps[1].to_string());
            }
        } else if let Some(caps) = JS_IMPORT.captures(line) {
            targets.push(caps[1].to_string());
        }
    }

    let mut resolved = Vec::new();
    for target in targets {
        let stem = target.trim_start_matches("./").trim_end_matches(".rs").trim_end_matches(".py");
        if let Some(found) = all_modules.iter().find(|m| {
            m.as_str() != module.as_str() && (m.as_str().ends_with(&format!("{stem}.rs"))
                || m.as_str().ends_with(&format!("{stem}.py"))
                || m.as_str().contains(stem))
        }) {
            if !resolved.contains(found) {
                resolved.push(found.clone());
            }
        }
    }
    resolved
}

fn discover_configs(root: &Path) -> Vec<(String, String)> {
    const CANDIDATES: &[&str] = &["Cargo.toml", "package.json", "pyproject.toml", "go.mod", "requirements.txt"];
    CANDIDATES
        .iter()
        .filter_map(|name| {
            let content = std::fs::read_to_string(root.join(name)).ok()?;
            Some((name.to_string(), content))
        })
        .collect()
}

fn render_tree(modules: &[ModuleId]) -> String {
    let mut sorted: Vec<&ModuleId> = modules.iter().collect();
    sorted.sort();
    sorted.iter().map(|m| format!("- {m}")).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_rust_files_and_local_use_edges() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub mod util;\nuse crate::util::helper;\n").unwrap();
        std::fs::write(dir.path().join("src/util.rs"), "pub fn helper() {}\n").unwrap();

        let discovered = discover(dir.path()).unwrap();
        let modules = discovered.analyzer.modules();
        assert_eq!(modules.len(), 2);
        let deps = discovered.analyzer.dependencies(&ModuleId::new("src/lib.rs"));
        assert_eq!(deps, vec![ModuleId::new("src/util.rs")]);
    }

    #[test]
    fn skips_target_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        std::fs::write(dir.path().join("target/debug/generated.rs"), "fn x() {}\n").unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();

        let discovered = discover(dir.path()).unwrap();
        assert_eq!(discovered.analyzer.modules().len(), 1);
    }
}
