#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ragdb_core::traits::{Embedder, Reranker};
use ragdb_core::{ChunkingConfig, SourceText};
use ragdb_hybrid::{EngineConfig, HybridEngine};

pub const P1: &str = "Photosynthesis converts light into chemical energy.";
pub const P2: &str = "Respiration releases energy from glucose.";

const CONCEPTS: &[(&[&str], usize)] = &[
    (&["plants", "plant", "photosynthesis", "light", "leaves"], 0),
    (&["converts", "convert", "make", "makes", "produce"], 1),
    (&["energy"], 2),
    (&["respiration", "releases", "glucose"], 3),
    (&["rivers", "river", "valleys", "carve", "erosion"], 4),
    (&["castles", "castle", "knights", "medieval"], 5),
];

/// Maps words onto a handful of topic axes so related wording lands close.
pub struct ConceptEmbedder {
    pub texts: Arc<AtomicUsize>,
}

impl ConceptEmbedder {
    pub fn new() -> Self { Self { texts: Arc::new(AtomicUsize::new(0)) } }

    pub fn counter(&self) -> Arc<AtomicUsize> { self.texts.clone() }
}

impl Embedder for ConceptEmbedder {
    fn dim(&self) -> usize { 8 }

    fn max_len(&self) -> usize { 256 }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 8];
                for word in t.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
                    let word = word.to_lowercase();
                    if let Some((_, axis)) = CONCEPTS.iter().find(|(words, _)| words.contains(&word.as_str())) {
                        v[*axis] += 1.0;
                    }
                }
                if v.iter().all(|x| *x == 0.0) {
                    v[7] = 1.0;
                }
                v
            })
            .collect())
    }
}

/// `ConceptEmbedder` that errors while its switch is on.
pub struct FlakyEmbedder {
    inner: ConceptEmbedder,
    failing: Arc<AtomicBool>,
}

impl FlakyEmbedder {
    pub fn new() -> Self { Self { inner: ConceptEmbedder::new(), failing: Arc::new(AtomicBool::new(false)) } }

    pub fn switch(&self) -> Arc<AtomicBool> { self.failing.clone() }
}

impl Embedder for FlakyEmbedder {
    fn dim(&self) -> usize { self.inner.dim() }

    fn max_len(&self) -> usize { self.inner.max_len() }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("embedding backend went away");
        }
        self.inner.embed_batch(texts)
    }
}

/// Strong positive logit for passages containing `word`, strong negative otherwise.
pub struct KeywordReranker {
    pub word: &'static str,
}

impl Reranker for KeywordReranker {
    fn score_pairs(&self, _query: &str, passages: &[&str]) -> anyhow::Result<Vec<f32>> {
        Ok(passages.iter().map(|p| if p.contains(self.word) { 5.0 } else { -5.0 }).collect())
    }
}

pub struct FailingReranker;

impl Reranker for FailingReranker {
    fn score_pairs(&self, _query: &str, _passages: &[&str]) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("model crashed")
    }
}

pub fn test_config(cache_dir: &std::path::Path) -> EngineConfig {
    let mut cfg = EngineConfig::default().with_cache_dir(cache_dir);
    cfg.persist_on_ingest = false;
    cfg.dense.use_accel = false;
    // Small chunks so every sentence of the corpus is its own passage.
    cfg.chunking = ChunkingConfig { target_size: 60, overlap: 0 };
    cfg
}

pub fn engine(cache_dir: &std::path::Path) -> HybridEngine {
    ragdb_core::telemetry::init_test_tracing();
    HybridEngine::with_models(test_config(cache_dir), Some(Box::new(ConceptEmbedder::new())), None).expect("engine")
}

pub fn corpus() -> Vec<SourceText> {
    vec![
        SourceText::new("notes/bio.txt", format!("{P1} {P2}")),
        SourceText::new("notes/geo.txt", "Rivers carve valleys over long periods. Erosion shapes the land."),
        SourceText::new("notes/history.md", "Medieval castles had moats. Knights defended the castle walls."),
    ]
}
