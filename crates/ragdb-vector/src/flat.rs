use anyhow::{anyhow, ensure, Result};
use candle_core::{Device, Tensor};

use ragdb_core::types::{Passage, PassageId, SearchHit, SourceKind};

/// Brute-force cosine search: one `(n, d) x (d, 1)` product per query over
/// L2-normalized rows.
pub struct FlatIndex {
    matrix: Option<Tensor>,
    ids: Vec<PassageId>,
    dim: usize,
}

impl FlatIndex {
    pub fn build(passages: &[Passage]) -> Result<Self> {
        let dim = passages.first().and_then(|p| p.embedding.as_ref()).map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(passages.len() * dim);
        let mut ids = Vec::with_capacity(passages.len());
        for p in passages {
            let e = p.embedding.as_ref().ok_or_else(|| anyhow!("passage {} has no embedding", p.id))?;
            ensure!(e.len() == dim, "passage {} has dim {} expected {}", p.id, e.len(), dim);
            flat.extend_from_slice(e);
            ids.push(p.id.clone());
        }
        let matrix = if ids.is_empty() || dim == 0 { None } else { Some(Tensor::from_vec(flat, (ids.len(), dim), &Device::Cpu)?) };
        Ok(Self { matrix, ids, dim })
    }

    pub fn len(&self) -> usize { self.ids.len() }

    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    pub fn dim(&self) -> usize { self.dim }

    /// Top `k` rows by inner product with `query` (already normalized), ties
    /// by row order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, SearchHit)>> {
        let Some(matrix) = &self.matrix else { return Ok(Vec::new()) };
        if k == 0 { return Ok(Vec::new()); }
        ensure!(query.len() == self.dim, "query dim {} does not match index dim {}", query.len(), self.dim);
        let q = Tensor::from_slice(query, (self.dim, 1), &Device::Cpu)?;
        let scores: Vec<f32> = matrix.matmul(&q)?.flatten_all()?.to_vec1()?;
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
        order.truncate(k);
        Ok(order
            .into_iter()
            .map(|i| (i, SearchHit { id: self.ids[i].clone(), score: scores[i], source: SourceKind::Dense }))
            .collect())
    }
}
