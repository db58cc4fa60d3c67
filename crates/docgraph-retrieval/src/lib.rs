pub mod chunk;
pub mod chunker;
pub mod in_memory;
pub mod service;

pub use chunk::{CodeChunk, EntityKind};
pub use in_memory::InMemoryRetrievalService;
pub use service::RetrievalService;
