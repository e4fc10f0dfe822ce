//! Score fusion and rerank blending.
//!
//! Candidates are identified by store ordinal, which is also the tie-breaker
//! whenever two scores are equal.

use std::collections::BTreeMap;

use ragdb_core::types::SearchHit;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub ord: usize,
    /// Current ranking score (fused, or blended after reranking).
    pub score: f32,
    pub dense: Option<f32>,
    pub sparse: Option<f32>,
    pub rerank: Option<f32>,
}

impl Candidate {
    fn new(ord: usize) -> Self { Self { ord, score: 0.0, dense: None, sparse: None, rerank: None } }
}

/// `alpha * dense + (1 - alpha) * sparse`; a side that did not return the
/// passage contributes 0. Result is sorted.
pub fn fuse(dense: &[(usize, SearchHit)], sparse: &[(usize, SearchHit)], alpha: f32) -> Vec<Candidate> {
    let mut by_ord: BTreeMap<usize, Candidate> = BTreeMap::new();
    for (ord, hit) in dense {
        by_ord.entry(*ord).or_insert_with(|| Candidate::new(*ord)).dense = Some(hit.score);
    }
    for (ord, hit) in sparse {
        by_ord.entry(*ord).or_insert_with(|| Candidate::new(*ord)).sparse = Some(hit.score);
    }
    let mut out: Vec<Candidate> = by_ord
        .into_values()
        .map(|mut c| {
            c.score = alpha * c.dense.unwrap_or(0.0) + (1.0 - alpha) * c.sparse.unwrap_or(0.0);
            c
        })
        .collect();
    sort_candidates(&mut out);
    out
}

/// Descending score, ascending ordinal.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.ord.cmp(&b.ord)));
}

/// Min-max scale into `[0, 1]`. A degenerate range maps every value to 1.0.
pub fn min_max(scores: &[f32]) -> Vec<f32> {
    let (lo, hi) = scores.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = hi - lo;
    if !range.is_finite() || range <= f32::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - lo) / range).collect()
}

pub fn sigmoid(x: f32) -> f32 { 1.0 / (1.0 + (-x).exp()) }

/// Blend normalized retrieval scores with logistic rerank scores and re-sort.
/// `raw` holds one cross-encoder logit per candidate, in candidate order.
pub fn apply_rerank(candidates: &mut [Candidate], raw: &[f32], retrieval_weight: f32, rerank_weight: f32) {
    let retrieval: Vec<f32> = candidates.iter().map(|c| c.score).collect();
    let retrieval = min_max(&retrieval);
    for ((c, r), &logit) in candidates.iter_mut().zip(retrieval).zip(raw) {
        let rerank = sigmoid(logit);
        c.rerank = Some(rerank);
        c.score = retrieval_weight * r + rerank_weight * rerank;
    }
    sort_candidates(candidates);
}
