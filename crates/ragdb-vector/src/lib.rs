//! ragdb-vector
//!
//! Dense (embedding) passage index: embedding backfill, an always-available
//! brute-force backend on candle, and an optional LanceDB backend (`lance`).
pub mod backfill;
pub mod dense;
pub mod flat;
#[cfg(feature = "lance")]
pub mod index_build;
#[cfg(feature = "lance")]
pub mod lance;
#[cfg(feature = "lance")]
pub mod schema;
#[cfg(feature = "lance")]
pub mod table;

pub use backfill::{backfill_embeddings, BackfillOptions};
pub use dense::{DenseIndex, DenseOptions, DenseSnapshot};
pub use flat::FlatIndex;
