//! ragdb-hybrid
//!
//! Hybrid passage retrieval: BM25 and dense similarity fused into one ranking,
//! optionally reranked by a cross-encoder, with a versioned on-disk cache.
//!
//! ```no_run
//! use ragdb_core::SourceText;
//! use ragdb_hybrid::{EngineConfig, HybridEngine, SearchRequest};
//!
//! # fn main() -> ragdb_core::Result<()> {
//! let mut engine = HybridEngine::new(EngineConfig::load()?)?;
//! if !engine.load() {
//!     engine.ingest(&[SourceText::new("notes/bio.txt", "Photosynthesis converts light into chemical energy.")])?;
//! }
//! let hits = engine.search("how do plants make energy", &SearchRequest::top(3))?;
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod filters;
pub mod fusion;
pub mod persist;

pub use config::EngineConfig;
pub use engine::{Capabilities, EngineStatistics, HybridEngine, Retrieval, ScoredPassage, SearchEngine, SearchRequest};
pub use filters::SearchFilters;
