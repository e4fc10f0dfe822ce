//! Semantic side of hybrid retrieval.
//!
//! `DenseIndex` ranks passages by cosine similarity between L2-normalized
//! embeddings. The backend is chosen once at construction: the LanceDB table
//! when built with `lance` and acceleration is requested, the in-memory
//! candle matrix otherwise. Both return the same contract: top `k` by cosine,
//! ties by store order.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use ragdb_core::traits::Embedder;
use ragdb_core::types::{ids_fingerprint, Passage, SearchHit};
use ragdb_embed::l2_normalize;

use crate::flat::FlatIndex;
#[cfg(feature = "lance")]
use crate::lance::LanceIndex;

pub const FLAT_BACKEND: &str = "candle-flat";
pub const LANCE_BACKEND: &str = "lancedb";
/// Directory of the native LanceDB table under the cache directory.
pub const LANCE_DIR: &str = "lancedb";

#[derive(Debug, Clone)]
pub struct DenseOptions {
    pub enabled: bool,
    pub use_accel: bool,
    pub flat_threshold: usize,
}

impl Default for DenseOptions {
    fn default() -> Self { Self { enabled: true, use_accel: true, flat_threshold: 10_000 } }
}

/// Persisted description of the dense side; vectors travel with the passages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseSnapshot {
    pub backend: String,
    pub dim: usize,
    pub passage_count: usize,
    /// Passage ids the index was built over, see `ids_fingerprint`.
    #[serde(default)]
    pub fingerprint: String,
}

enum Backend {
    Flat(FlatIndex),
    #[cfg(feature = "lance")]
    Lance(LanceIndex),
}

pub struct DenseIndex {
    enabled: bool,
    accel: bool,
    flat_threshold: usize,
    lance_dir: PathBuf,
    backend: Option<Backend>,
    dim: usize,
    rows: usize,
    fingerprint: String,
}

impl DenseIndex {
    pub fn new(opts: &DenseOptions, cache_dir: &Path) -> Self {
        let accel = opts.enabled && opts.use_accel && cfg!(feature = "lance");
        info!(enabled = opts.enabled, accel, "dense index");
        Self {
            enabled: opts.enabled,
            accel,
            flat_threshold: opts.flat_threshold,
            lance_dir: cache_dir.join(LANCE_DIR),
            backend: None,
            dim: 0,
            rows: 0,
            fingerprint: String::new(),
        }
    }

    pub fn is_available(&self) -> bool { self.enabled }

    pub fn has_accel(&self) -> bool { self.accel }

    pub fn backend_name(&self) -> &'static str {
        if self.accel { LANCE_BACKEND } else { FLAT_BACKEND }
    }

    /// Build from passages that already carry normalized embeddings.
    #[instrument(skip_all, fields(passages = passages.len()))]
    pub fn build(&mut self, passages: &[Passage]) -> Result<()> {
        self.install(passages, false)
    }

    /// Like `build`, but reuses a native on-disk table when it matches.
    pub fn restore(&mut self, passages: &[Passage]) -> Result<()> {
        self.install(passages, true)
    }

    fn install(&mut self, passages: &[Passage], reuse: bool) -> Result<()> {
        if !self.enabled { return Ok(()); }
        let dim = passages.first().and_then(|p| p.embedding.as_ref()).map_or(0, Vec::len);
        let backend = if passages.is_empty() {
            None
        } else if self.accel {
            Some(self.lance_backend(passages, dim, reuse)?)
        } else {
            Some(Backend::Flat(FlatIndex::build(passages)?))
        };
        self.backend = backend;
        self.dim = dim;
        self.rows = passages.len();
        self.fingerprint = ids_fingerprint(passages);
        debug!(backend = self.backend_name(), dim, rows = self.rows, "dense index ready");
        Ok(())
    }

    #[cfg(feature = "lance")]
    fn lance_backend(&self, passages: &[Passage], dim: usize, reuse: bool) -> Result<Backend> {
        let index = if reuse {
            LanceIndex::open_or_build(&self.lance_dir, passages, dim, self.flat_threshold)?
        } else {
            LanceIndex::build(&self.lance_dir, passages, dim, self.flat_threshold)?
        };
        Ok(Backend::Lance(index))
    }

    #[cfg(not(feature = "lance"))]
    fn lance_backend(&self, passages: &[Passage], _dim: usize, _reuse: bool) -> Result<Backend> {
        Ok(Backend::Flat(FlatIndex::build(passages)?))
    }

    /// Embed `text` once, normalize it and return ranked `(ordinal, hit)` pairs.
    pub fn query(&self, text: &str, k: usize, embedder: &dyn Embedder) -> Result<Vec<(usize, SearchHit)>> {
        let Some(backend) = &self.backend else { return Ok(Vec::new()) };
        if k == 0 { return Ok(Vec::new()); }
        let mut embs = embedder.embed_batch(&[text.to_string()])?;
        ensure!(embs.len() == 1, "embedder returned {} vectors for one query", embs.len());
        let mut q = embs.swap_remove(0);
        l2_normalize(&mut q);
        self.query_vector(backend, &q, k)
    }

    fn query_vector(&self, backend: &Backend, q: &[f32], k: usize) -> Result<Vec<(usize, SearchHit)>> {
        match backend {
            Backend::Flat(flat) => flat.search(q, k),
            #[cfg(feature = "lance")]
            Backend::Lance(lance) => lance.search(q, k),
        }
    }

    pub fn clear(&mut self) {
        self.backend = None;
        self.dim = 0;
        self.rows = 0;
        self.fingerprint.clear();
    }

    pub fn snapshot(&self) -> Option<DenseSnapshot> {
        self.backend.as_ref()?;
        Some(DenseSnapshot {
            backend: self.backend_name().to_string(),
            dim: self.dim,
            passage_count: self.rows,
            fingerprint: self.fingerprint.clone(),
        })
    }

    pub fn lance_dir(&self) -> &Path { &self.lance_dir }
}
