//! Lexical side of hybrid retrieval.
//!
//! `SparseIndex` wraps the BM25 backend behind a capability flag: the backend
//! exists only with the `tantivy` feature and when enabled in configuration.
//! An unavailable index answers every query with an empty result.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use ragdb_core::types::{Passage, SearchHit};

#[cfg(feature = "tantivy")]
use crate::index::Bm25Index;

pub const BACKEND_NAME: &str = "tantivy-bm25";

/// Persisted description of a built sparse index. The index itself is
/// rebuilt from the passages on load and checked against this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseSnapshot {
	pub backend: String,
	pub analyzer: String,
	pub passage_count: usize,
	pub fingerprint: String,
}

pub use ragdb_core::types::ids_fingerprint as fingerprint;

pub struct SparseIndex {
	enabled: bool,
	#[cfg(feature = "tantivy")]
	backend: Option<Bm25Index>,
	fingerprint: Option<String>,
}

impl SparseIndex {
	pub fn new(enabled: bool) -> Self {
		let enabled = enabled && cfg!(feature = "tantivy");
		if !enabled {
			info!("sparse index unavailable");
		}
		Self {
			enabled,
			#[cfg(feature = "tantivy")]
			backend: None,
			fingerprint: None,
		}
	}

	pub fn is_available(&self) -> bool { self.enabled }

	pub fn is_built(&self) -> bool { self.fingerprint.is_some() }

	/// Replace the index contents with `passages` (store order).
	#[instrument(skip_all, fields(passages = passages.len()))]
	pub fn build(&mut self, passages: &[Passage]) -> Result<()> {
		if !self.enabled {
			return Ok(());
		}
		#[cfg(feature = "tantivy")]
		{
			self.backend = Some(Bm25Index::build(passages)?);
		}
		self.fingerprint = Some(fingerprint(passages));
		debug!("sparse index ready");
		Ok(())
	}

	/// Ranked `(store ordinal, hit)` pairs, best first.
	pub fn query(&self, text: &str, k: usize) -> Result<Vec<(usize, SearchHit)>> {
		#[cfg(feature = "tantivy")]
		{
			if let Some(backend) = &self.backend {
				return backend.search(text, k);
			}
		}
		let _ = (text, k);
		Ok(Vec::new())
	}

	pub fn clear(&mut self) {
		#[cfg(feature = "tantivy")]
		{
			self.backend = None;
		}
		self.fingerprint = None;
	}

	pub fn snapshot(&self) -> Option<SparseSnapshot> {
		let fingerprint = self.fingerprint.clone()?;
		Some(SparseSnapshot {
			backend: BACKEND_NAME.to_string(),
			analyzer: analyzer_name().to_string(),
			passage_count: self.len(),
			fingerprint,
		})
	}

	/// Check a rebuilt index against the snapshot recorded at save time.
	pub fn verify(&self, snapshot: &SparseSnapshot) -> Result<()> {
		let current = self.snapshot().ok_or_else(|| anyhow::anyhow!("sparse index not built"))?;
		anyhow::ensure!(
			current == *snapshot,
			"sparse snapshot mismatch: cached {} passages ({}), rebuilt {} passages ({})",
			snapshot.passage_count,
			snapshot.fingerprint,
			current.passage_count,
			current.fingerprint
		);
		Ok(())
	}

	fn len(&self) -> usize {
		#[cfg(feature = "tantivy")]
		{
			if let Some(backend) = &self.backend {
				return backend.len();
			}
		}
		0
	}
}

fn analyzer_name() -> &'static str {
	#[cfg(feature = "tantivy")]
	{
		crate::tantivy_utils::ANALYZER
	}
	#[cfg(not(feature = "tantivy"))]
	{
		"none"
	}
}
