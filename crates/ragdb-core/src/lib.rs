//! ragdb-core
//!
//! Passage model, chunking, the passage store, shared traits for embedding and
//! reranking models, the typed error and configuration loading.

pub mod chunker;
pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use chunker::{chunk, Chunker, ChunkingConfig};
pub use error::{Error, Result};
pub use store::PassageStore;
pub use types::{Meta, Passage, PassageId, SearchHit, SourceKind, SourceText};
