pub mod batch_scheduler;
pub mod context_resolver;
pub mod cycle_context;
pub mod folder_summarizer;
pub mod generation_log;
pub mod module_pipeline;
pub mod output_assembler;
pub mod plan;
pub mod run;
pub mod usage_tracker;

pub use batch_scheduler::{BatchResult, BatchScheduler};
pub use context_resolver::{ContextCategory, ContextResolver, ProjectMetadata, ResolvedContext};
pub use cycle_context::CycleContextBuilder;
pub use folder_summarizer::FolderSummarizer;
pub use generation_log::GenerationLog;
pub use module_pipeline::{ModulePipeline, ModuleTaskState, WriteMode};
pub use output_assembler::OutputAssembler;
pub use plan::{PlanOutput, PlanPipeline};
pub use run::{infer_entry_points, run, Transports};
pub use usage_tracker::RagUsageTracker;
