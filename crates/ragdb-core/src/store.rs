//! In-memory, insertion-ordered passage collection.
//!
//! The store owns every `Passage`. Indices refer to passages by id or by
//! ordinal (position in insertion order), which also serves as the
//! deterministic tie-breaker when scores are equal.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{source_name, Passage, PassageId};

#[derive(Debug, Clone, Default)]
pub struct PassageStore {
    passages: Vec<Passage>,
    by_id: HashMap<PassageId, usize>,
    embedding_dim: Option<usize>,
}

impl PassageStore {
    pub fn new() -> Self { Self::default() }

    /// Append passages, skipping ids already present (also within the batch).
    /// Returns how many were inserted.
    pub fn add<I>(&mut self, passages: I) -> usize
    where
        I: IntoIterator<Item = Passage>,
    {
        let before = self.passages.len();
        for passage in passages {
            if self.by_id.contains_key(&passage.id) {
                debug!(id = %passage.id, "skipping duplicate passage");
                continue;
            }
            if self.embedding_dim.is_none() {
                self.embedding_dim = passage.embedding.as_ref().map(Vec::len);
            }
            self.by_id.insert(passage.id.clone(), self.passages.len());
            self.passages.push(passage);
        }
        self.passages.len() - before
    }

    pub fn get(&self, id: &str) -> Result<&Passage> {
        self.by_id
            .get(id)
            .map(|&ord| &self.passages[ord])
            .ok_or_else(|| Error::NotFound(format!("passage '{id}'")))
    }

    pub fn ordinal(&self, id: &str) -> Option<usize> { self.by_id.get(id).copied() }

    pub fn by_ordinal(&self, ordinal: usize) -> Option<&Passage> { self.passages.get(ordinal) }

    pub fn all(&self) -> &[Passage] { &self.passages }

    pub fn citation_for(&self, id: &str) -> Result<String> { self.get(id).map(Passage::citation) }

    pub fn len(&self) -> usize { self.passages.len() }

    pub fn is_empty(&self) -> bool { self.passages.is_empty() }

    pub fn clear(&mut self) {
        self.passages.clear();
        self.by_id.clear();
        self.embedding_dim = None;
    }

    pub fn sources(&self) -> BTreeSet<&str> {
        self.passages.iter().map(|p| p.source.as_str()).collect()
    }

    /// Passage counts keyed by source file name.
    pub fn source_chunk_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for p in &self.passages {
            *counts.entry(source_name(&p.source)).or_insert(0) += 1;
        }
        counts
    }

    /// Ordinals of passages that still need an embedding.
    pub fn missing_embeddings(&self) -> Vec<usize> {
        self.passages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.embedding.is_none())
            .map(|(ord, _)| ord)
            .collect()
    }

    /// Dimension shared by all attached embeddings, `None` when none are attached.
    pub fn embedding_dim(&self) -> Option<usize> { self.embedding_dim }

    /// Attach an embedding to the passage at `ordinal`. Rejects vectors whose
    /// dimension differs from the ones already attached.
    pub fn attach_embedding(&mut self, ordinal: usize, embedding: Vec<f32>) -> Result<()> {
        if let Some(dim) = self.embedding_dim() {
            if dim != embedding.len() {
                return Err(Error::BuildFailure(format!(
                    "embedding dimension mismatch: got {} expected {}",
                    embedding.len(),
                    dim
                )));
            }
        }
        let passage = self
            .passages
            .get_mut(ordinal)
            .ok_or_else(|| Error::NotFound(format!("passage ordinal {ordinal}")))?;
        self.embedding_dim = Some(embedding.len());
        passage.embedding = Some(embedding);
        Ok(())
    }
}
