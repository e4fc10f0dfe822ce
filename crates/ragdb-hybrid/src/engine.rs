//! Hybrid retrieval engine: ingestion, fused search, reranking and the cache.
//!
//! Lifecycle: construct, then `ingest` or `load`, then serve `search` /
//! `retrieve` from any number of threads. Mutating calls take `&mut self`;
//! a rebuild happens on copies and is swapped in only when it succeeds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use ragdb_core::traits::{Embedder, Reranker};
use ragdb_core::types::{ids_fingerprint, Meta, Passage, SourceText};
use ragdb_core::{Chunker, Error, PassageStore, Result};
use ragdb_embed::{get_default_embedder, get_default_reranker};
use ragdb_text::SparseIndex;
use ragdb_vector::{backfill_embeddings, DenseIndex};

use crate::config::EngineConfig;
use crate::filters::SearchFilters;
use crate::fusion::{apply_rerank, fuse, Candidate};
use crate::persist::{self, CacheHeader, CACHE_FILE};

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub k: usize,
    pub rerank: bool,
    pub filters: SearchFilters,
    /// Dense weight in `[0, 1]`; `None` uses the configured default.
    pub alpha: Option<f32>,
}

impl SearchRequest {
    pub fn top(k: usize) -> Self { Self { k, rerank: true, ..Self::default() } }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn rerank(mut self, rerank: bool) -> Self {
        self.rerank = rerank;
        self
    }

    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
    pub dense_score: Option<f32>,
    pub sparse_score: Option<f32>,
    pub rerank_score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    pub context: String,
    pub citations: Vec<String>,
    pub passages: Vec<ScoredPassage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub total_passages: usize,
    pub total_sources: usize,
    pub index_backend_name: String,
    pub sparse_available: bool,
    pub reranker_available: bool,
    /// Keyed by source file name.
    pub per_source_chunk_counts: BTreeMap<String, usize>,
}

/// What this engine instance can do; fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_sparse: bool,
    pub has_dense: bool,
    pub has_dense_accel: bool,
    pub has_reranker: bool,
}

/// The retrieval contract consumed by the question-answering layer.
pub trait SearchEngine: Send + Sync {
    fn search(&self, query: &str, request: &SearchRequest) -> Result<Vec<ScoredPassage>>;
    fn retrieve(&self, query: &str, request: &SearchRequest) -> Result<Retrieval>;
}

pub struct HybridEngine {
    config: EngineConfig,
    chunker: Chunker,
    store: PassageStore,
    sparse: SparseIndex,
    dense: DenseIndex,
    embedder: Option<Box<dyn Embedder>>,
    reranker: Option<Box<dyn Reranker>>,
    capabilities: Capabilities,
}

impl HybridEngine {
    /// Build an engine with the default models: the embedder from
    /// `APP_MODEL_DIR` (or the hashing embedder under
    /// `APP_USE_FAKE_EMBEDDINGS`) and the reranker from `APP_RERANK_MODEL_DIR`
    /// when present. A model that fails to load is a `BuildFailure`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let embedder = if config.dense.enabled {
            Some(get_default_embedder(config.dense.use_accel).map_err(|e| Error::build("embedding model", e))?)
        } else {
            None
        };
        let reranker = get_default_reranker(config.dense.use_accel).map_err(|e| Error::build("reranker", e))?;
        Self::with_models(config, embedder, reranker)
    }

    /// Build an engine around caller-provided models. Without an embedder the
    /// dense index is unavailable.
    pub fn with_models(
        config: EngineConfig,
        embedder: Option<Box<dyn Embedder>>,
        reranker: Option<Box<dyn Reranker>>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.chunking)?;
        let embedder = if config.dense.enabled { embedder } else { None };
        let sparse = SparseIndex::new(config.sparse.enabled);
        let mut dense_opts = config.dense.index_options();
        dense_opts.enabled = embedder.is_some();
        let dense = DenseIndex::new(&dense_opts, &config.cache_dir);
        let capabilities = Capabilities {
            has_sparse: sparse.is_available(),
            has_dense: dense.is_available(),
            has_dense_accel: dense.has_accel(),
            has_reranker: reranker.is_some(),
        };
        info!(?capabilities, cache_dir = %config.cache_dir.display(), "hybrid engine ready");
        Ok(Self { config, chunker, store: PassageStore::new(), sparse, dense, embedder, reranker, capabilities })
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn capabilities(&self) -> Capabilities { self.capabilities }

    pub fn store(&self) -> &PassageStore { &self.store }

    pub fn len(&self) -> usize { self.store.len() }

    pub fn is_empty(&self) -> bool { self.store.is_empty() }

    pub fn cache_path(&self) -> PathBuf { self.config.cache_dir.join(CACHE_FILE) }

    /// Chunk already-extracted texts into passages and add them. Returns the
    /// number of new passages.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub fn ingest(&mut self, sources: &[SourceText]) -> Result<usize> {
        let passages = self.passages_from(sources);
        debug!(passages = passages.len(), "chunked sources");
        self.add_passages(passages)
    }

    fn passages_from(&self, sources: &[SourceText]) -> Vec<Passage> {
        let mut pages: HashMap<&str, BTreeSet<u32>> = HashMap::new();
        for s in sources {
            if let Some(page) = s.page {
                pages.entry(s.source.as_str()).or_default().insert(page);
            }
        }

        let mut next_index: HashMap<&str, usize> = HashMap::new();
        let mut out = Vec::new();
        for s in sources {
            let file_type = Path::new(&s.source).extension().map(|e| e.to_string_lossy().to_lowercase());
            for text in self.chunker.chunks(&s.text) {
                let slot = next_index.entry(s.source.as_str()).or_insert(0);
                let chunk_index = *slot;
                *slot += 1;

                let mut metadata = Meta::new();
                if let Some(ft) = &file_type {
                    metadata.insert("file_type".into(), ft.clone().into());
                }
                metadata.insert("chunk_size".into(), text.chars().count().into());
                if let Some(set) = pages.get(s.source.as_str()) {
                    metadata.insert("page_count".into(), set.len().into());
                }
                metadata.extend(s.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));

                out.push(Passage::new(s.source.clone(), s.page, chunk_index, text).with_metadata(metadata));
            }
        }
        out
    }

    /// Add pre-built passages and rebuild both indices. All or nothing: on
    /// error the engine keeps its previous state.
    #[instrument(skip_all, fields(passages = passages.len()))]
    pub fn add_passages(&mut self, passages: Vec<Passage>) -> Result<usize> {
        let mut store = self.store.clone();
        let inserted = store.add(passages);
        if inserted == 0 {
            debug!("no new passages");
            return Ok(0);
        }
        self.rebuild(store)?;
        info!(inserted, total = self.store.len(), "passages indexed");
        if self.config.persist_on_ingest {
            if let Err(e) = self.save() {
                warn!(error = %e, "failed to persist cache after ingestion");
            }
        }
        Ok(inserted)
    }

    /// Embed what is missing, build fresh indices over `store` and swap them in.
    fn rebuild(&mut self, mut store: PassageStore) -> Result<()> {
        if let Some(embedder) = &self.embedder {
            backfill_embeddings(&mut store, embedder.as_ref(), &self.config.dense.backfill_options())
                .map_err(|e| Error::build("embedding passages", e))?;
        }
        let mut sparse = SparseIndex::new(self.config.sparse.enabled);
        sparse.build(store.all()).map_err(|e| Error::build("sparse index", e))?;
        let mut dense = self.fresh_dense();
        dense.build(store.all()).map_err(|e| Error::build("dense index", e))?;

        self.store = store;
        self.sparse = sparse;
        self.dense = dense;
        Ok(())
    }

    fn fresh_dense(&self) -> DenseIndex {
        let mut opts = self.config.dense.index_options();
        opts.enabled = self.capabilities.has_dense;
        DenseIndex::new(&opts, &self.config.cache_dir)
    }

    /// Fused top-`k` passages for `query`, best first.
    ///
    /// Blocking. With the `lance` backend, async callers on a current-thread
    /// tokio runtime must go through `spawn_blocking`; inside a multi-thread
    /// runtime the call blocks in place.
    #[instrument(skip(self, request), fields(k = request.k, rerank = request.rerank))]
    pub fn search(&self, query: &str, request: &SearchRequest) -> Result<Vec<ScoredPassage>> {
        let alpha = request.alpha.unwrap_or(self.config.fusion.default_alpha);
        self.search_with_alpha(query, request, alpha)
    }

    fn search_with_alpha(&self, query: &str, request: &SearchRequest, alpha: f32) -> Result<Vec<ScoredPassage>> {
        let k = request.k;
        if k == 0 {
            return Err(Error::InvalidArgument("k must be at least 1".into()));
        }
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            return Err(Error::InvalidArgument(format!("alpha must be within [0, 1], got {alpha}")));
        }
        if self.store.is_empty() {
            return Ok(Vec::new());
        }

        let fusion = &self.config.fusion;
        let fetch = k.saturating_mul(fusion.overfetch_factor).max(k);
        let sparse_hits = if alpha < 1.0 && self.sparse.is_available() {
            self.sparse.query(query, fetch).map_err(|e| Error::operation("sparse query", e))?
        } else {
            Vec::new()
        };
        let dense_hits = match &self.embedder {
            Some(embedder) if alpha > 0.0 => {
                self.dense.query(query, fetch, embedder.as_ref()).map_err(|e| Error::operation("dense query", e))?
            }
            _ => Vec::new(),
        };
        debug!(sparse = sparse_hits.len(), dense = dense_hits.len(), "index hits");

        let mut candidates = fuse(&dense_hits, &sparse_hits, alpha);
        candidates.truncate(k.saturating_mul(fusion.rerank_pool_factor));

        if request.rerank {
            if let Some(reranker) = &self.reranker {
                self.rerank(query, reranker.as_ref(), &mut candidates)?;
            }
        }

        let mut out = Vec::with_capacity(k);
        for c in candidates {
            let Some(passage) = self.store.by_ordinal(c.ord) else { continue };
            if !request.filters.matches(passage, c.score) {
                continue;
            }
            out.push(ScoredPassage {
                passage: passage.detached(),
                score: c.score,
                dense_score: c.dense,
                sparse_score: c.sparse,
                rerank_score: c.rerank,
            });
            if out.len() == k {
                break;
            }
        }
        Ok(out)
    }

    fn rerank(&self, query: &str, reranker: &dyn Reranker, candidates: &mut [Candidate]) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }
        let texts: Vec<&str> = candidates
            .iter()
            .map(|c| self.store.by_ordinal(c.ord).map_or("", |p| p.text.as_str()))
            .collect();
        let raw = reranker.score_pairs(query, &texts).map_err(|e| Error::operation("rerank", e))?;
        if raw.len() != candidates.len() {
            return Err(Error::Operation(format!("reranker returned {} scores for {} passages", raw.len(), candidates.len())));
        }
        let fusion = &self.config.fusion;
        apply_rerank(candidates, &raw, fusion.retrieval_weight, fusion.rerank_weight);
        Ok(())
    }

    /// Search, then render a context block and de-duplicated citations.
    pub fn retrieve(&self, query: &str, request: &SearchRequest) -> Result<Retrieval> {
        let alpha = request.alpha.unwrap_or(self.config.fusion.retrieve_alpha);
        let passages = self.search_with_alpha(query, request, alpha)?;
        let context = passages
            .iter()
            .map(|sp| format!("[Relevance: {:.2}]\n{}", sp.score, sp.passage.text))
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        let mut seen = BTreeSet::new();
        let citations = passages
            .iter()
            .map(|sp| sp.passage.citation())
            .filter(|c| seen.insert(c.clone()))
            .collect();
        Ok(Retrieval { context, citations, passages })
    }

    pub fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            total_passages: self.store.len(),
            total_sources: self.store.sources().len(),
            index_backend_name: self.dense.backend_name().to_string(),
            sparse_available: self.capabilities.has_sparse,
            reranker_available: self.capabilities.has_reranker,
            per_source_chunk_counts: self.store.source_chunk_counts(),
        }
    }

    /// Drop all passages and indices. The cache on disk is left alone.
    pub fn clear(&mut self) {
        self.store.clear();
        self.sparse.clear();
        self.dense.clear();
    }

    /// Write the cache file under the configured cache directory.
    #[instrument(skip(self))]
    pub fn save(&self) -> Result<()> {
        let header = CacheHeader {
            created_at: chrono::Utc::now().to_rfc3339(),
            passages: self.store.all().iter().map(Passage::detached).collect(),
            sparse: self.sparse.snapshot(),
            dense: self.dense.snapshot(),
        };
        let vectors: Vec<Option<&[f32]>> = self.store.all().iter().map(|p| p.embedding.as_deref()).collect();
        let bytes = persist::encode(&header, &vectors)?;
        persist::write_file(&self.cache_path(), &bytes)?;
        info!(passages = header.passages.len(), "cache saved");
        Ok(())
    }

    /// Restore from the cache file. Any failure leaves the engine empty and
    /// returns `false`.
    #[instrument(skip(self))]
    pub fn load(&mut self) -> bool {
        match self.try_load() {
            Ok(n) => {
                info!(passages = n, "cache loaded");
                true
            }
            Err(e) => {
                match &e {
                    Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => debug!("no cache file"),
                    _ => warn!(error = %e, "cache rejected"),
                }
                self.clear();
                false
            }
        }
    }

    fn try_load(&mut self) -> Result<usize> {
        let (header, passages) = persist::read_file(&self.cache_path())?;
        let mut store = PassageStore::new();
        let count = passages.len();
        if store.add(passages) != count {
            return Err(Error::CacheCorrupt("duplicate passage ids".into()));
        }
        let mut dims = store.all().iter().filter_map(|p| p.embedding.as_ref().map(Vec::len));
        if let Some(first) = dims.next() {
            if dims.any(|d| d != first) {
                return Err(Error::CacheCorrupt("inconsistent embedding dimensions".into()));
            }
        }

        if let Some(embedder) = &self.embedder {
            if let Some(dim) = store.embedding_dim() {
                if dim != embedder.dim() {
                    return Err(Error::CacheCorrupt(format!("cached dim {dim} does not match embedder dim {}", embedder.dim())));
                }
            }
            if let Some(snap) = &header.dense {
                let stale_ids = !snap.fingerprint.is_empty() && snap.fingerprint != ids_fingerprint(store.all());
                if stale_ids || snap.passage_count != count || (count > 0 && snap.dim != embedder.dim()) {
                    return Err(Error::CacheCorrupt("dense snapshot does not match cached passages".into()));
                }
            }
            backfill_embeddings(&mut store, embedder.as_ref(), &self.config.dense.backfill_options())
                .map_err(|e| Error::build("embedding passages", e))?;
        }

        let mut sparse = SparseIndex::new(self.config.sparse.enabled);
        sparse.build(store.all()).map_err(|e| Error::build("sparse index", e))?;
        if let (true, Some(snap)) = (sparse.is_built(), &header.sparse) {
            sparse.verify(snap).map_err(|e| Error::corrupt("sparse snapshot", e))?;
        }
        let mut dense = self.fresh_dense();
        dense.restore(store.all()).map_err(|e| Error::build("dense index", e))?;

        self.store = store;
        self.sparse = sparse;
        self.dense = dense;
        Ok(count)
    }
}

impl SearchEngine for HybridEngine {
    fn search(&self, query: &str, request: &SearchRequest) -> Result<Vec<ScoredPassage>> { Self::search(self, query, request) }
    fn retrieve(&self, query: &str, request: &SearchRequest) -> Result<Retrieval> { Self::retrieve(self, query, request) }
}
