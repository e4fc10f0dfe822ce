/// Text-to-vector function backing the dense index.
///
/// Implementations must return one vector per input, all of length `dim()`.
/// Loading the underlying model happens at construction; a constructor error
/// is a build failure for the engine, not a per-query condition.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Pairwise relevance model (cross-encoder).
///
/// Returns one raw, unnormalized score per passage, in input order. Higher is
/// more relevant.
pub trait Reranker: Send + Sync {
    fn score_pairs(&self, query: &str, passages: &[&str]) -> anyhow::Result<Vec<f32>>;
}
