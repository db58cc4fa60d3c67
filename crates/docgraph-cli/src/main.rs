mod fs_analyzer;

use clap::Parser;
use docgraph_ai::providers::{AnthropicTransport, MockTransport, OpenAiCompatibleTransport};
use docgraph_ai::LlmTransport;
use docgraph_core::OrchestratorConfig;
use docgraph_graph::DependencyGraph;
use docgraph_orchestrator::{infer_entry_points, run, ProjectMetadata, Transports};
use std::path::PathBuf;
use std::sync::Arc;

/// Generates structured documentation for a source tree by orchestrating an
/// LLM over its dependency graph.
#[derive(Debug, Parser)]
#[command(name = "docgraph", about = "Documentation orchestrator CLI")]
struct Cli {
    /// Root directory of the source tree to document.
    root: PathBuf,

    /// LLM provider backing both transport tiers: anthropic, openai, or mock.
    #[arg(long, env = "DOCGRAPH_PROVIDER", default_value = "anthropic")]
    provider: String,

    /// Directory to write modules.txt, folders.txt, scc_contexts.txt, final.md into.
    #[arg(long, env = "DOCGRAPH_OUTPUT_DIR")]
    output_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = OrchestratorConfig::from_env()?;
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }
    let config = Arc::new(config);

    let discovered = fs_analyzer::discover(&cli.root)?;
    let graph = DependencyGraph::build(&discovered.analyzer);
    let entry_points = infer_entry_points(&graph);
    let metadata = ProjectMetadata {
        entry_points,
        configs: discovered.configs,
        deps: Vec::new(),
        tree_outline: discovered.tree_outline,
    };

    let transports = build_transports(&cli.provider, &config)?;

    let summary = run(
        &discovered.analyzer,
        Arc::new(discovered.retrieval),
        transports,
        metadata,
        config.clone(),
    )
    .await?;

    tracing::info!(
        documented = summary.documented.len(),
        failed = summary.failed.len(),
        scc_count = summary.scc_count,
        wall_clock_ms = summary.wall_clock_ms,
        "run complete"
    );
    println!(
        "Documented {} modules ({} failed) across {} SCCs in {}ms. Output: {}",
        summary.documented.len(),
        summary.failed.len(),
        summary.scc_count,
        summary.wall_clock_ms,
        config.output_dir,
    );
    if !summary.failed.is_empty() {
        for (module, reason) in &summary.failed {
            eprintln!("  failed: {module}: {reason}");
        }
    }

    Ok(())
}

fn build_transports(provider: &str, config: &OrchestratorConfig) -> anyhow::Result<Transports> {
    match provider {
        "anthropic" => {
            let transport: Arc<dyn LlmTransport> = Arc::new(AnthropicTransport::from_env()?);
            Ok(Transports { fast: transport.clone(), reasoning: transport })
        }
        "openai" => {
            let transport: Arc<dyn LlmTransport> = Arc::new(OpenAiCompatibleTransport::from_env()?);
            Ok(Transports { fast: transport.clone(), reasoning: transport })
        }
        "mock" => {
            let _ = config;
            let transport: Arc<dyn LlmTransport> =
                Arc::new(MockTransport::fixed_text("{\"summary\": \"mock\", \"responsibility\": \"mock\"}"));
            Ok(Transports { fast: transport.clone(), reasoning: transport })
        }
        other => anyhow::bail!("unknown provider `{other}`; expected anthropic, openai, or mock"),
    }
}
