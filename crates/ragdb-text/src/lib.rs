//! ragdb-text
//!
//! Lexical (BM25) passage index on tantivy. See `sparse` for the capability
//! wrapper used by the hybrid engine.
#[cfg(feature = "tantivy")]
pub mod tantivy_utils;
#[cfg(feature = "tantivy")]
pub mod index;
pub mod sparse;

#[cfg(feature = "tantivy")]
pub use index::Bm25Index;
pub use sparse::{SparseIndex, SparseSnapshot, BACKEND_NAME};
