//! Embedding backfill for passages that have no vector yet.
//!
//! Identical texts (blake3 content hash) are embedded once per run. Texts are
//! sent to the embedder in batches; every returned vector is checked for count
//! and dimension, L2-normalized and attached to the passage store.
use anyhow::{ensure, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use ragdb_core::traits::Embedder;
use ragdb_core::PassageStore;
use ragdb_embed::l2_normalize;

#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    pub batch_size: usize,
    pub show_progress: bool,
}

impl Default for BackfillOptions {
    fn default() -> Self { Self { batch_size: 32, show_progress: false } }
}

pub fn hash_content(s: &str) -> String {
    let h = blake3::hash(s.as_bytes());
    h.to_hex().to_string()
}

/// Embed every passage lacking a vector. Returns the number of passages updated.
#[instrument(skip_all, fields(batch_size = opts.batch_size))]
pub fn backfill_embeddings(store: &mut PassageStore, embedder: &dyn Embedder, opts: &BackfillOptions) -> Result<usize> {
    let missing = store.missing_embeddings();
    if missing.is_empty() { return Ok(0); }

    // content hash -> ordinals sharing that text, plus unique texts in first-seen order
    let mut by_hash: HashMap<String, Vec<usize>> = HashMap::new();
    let mut unique: Vec<(String, String)> = Vec::new();
    for &ord in &missing {
        let Some(p) = store.by_ordinal(ord) else { continue };
        let chash = hash_content(&p.text);
        let slot = by_hash.entry(chash.clone()).or_default();
        if slot.is_empty() { unique.push((chash, p.text.clone())); }
        slot.push(ord);
    }
    info!(passages = missing.len(), unique = unique.len(), "embedding passages");

    let pb = progress_bar(unique.len(), opts.show_progress);
    let dim = embedder.dim();
    for chunk in unique.chunks(opts.batch_size.max(1)) {
        let texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
        let embs = embedder.embed_batch(&texts)?;
        ensure!(embs.len() == texts.len(), "embedder returned {} vectors for {} texts", embs.len(), texts.len());
        for ((h, _), mut v) in chunk.iter().zip(embs) {
            ensure!(v.len() == dim, "dim mismatch: got {} expected {}", v.len(), dim);
            l2_normalize(&mut v);
            for &ord in &by_hash[h] { store.attach_embedding(ord, v.clone())?; }
        }
        pb.inc(chunk.len() as u64);
        debug!(batch = chunk.len(), "batch embedded");
    }
    pb.finish_and_clear();
    Ok(missing.len())
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible { return ProgressBar::hidden(); }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} texts ({percent}%) {msg}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("embedding");
    pb
}
