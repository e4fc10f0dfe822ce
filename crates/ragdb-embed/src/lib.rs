use anyhow::{anyhow, ensure, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::Device;
use candle_transformers::models::xlm_roberta::XLMRobertaModel;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use ragdb_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod rerank;
pub mod tokenize;
pub mod weights;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use rerank::{get_default_reranker, CrossEncoderReranker};

use tokenize::tokenize_batch;
use weights::{first_existing_dir, ModelFiles};

/// Token limit per passage for the embedding model.
pub const MAX_LEN: usize = 256;

/// BGE-M3 style sentence embedder: XLM-RoBERTa encoder, masked mean pooling, L2 norm.
pub struct EmbeddingModel { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize }

impl EmbeddingModel {
    pub fn new(use_accel: bool) -> Result<Self> {
        let model_dir = resolve_model_dir()?;
        Self::from_dir(&model_dir, use_accel)
    }

    pub fn from_dir(model_dir: &Path, use_accel: bool) -> Result<Self> {
        let device = select_device(use_accel);
        info!(dir = %model_dir.display(), "loading embedding model");
        let files = ModelFiles::open(model_dir)?;
        let vb = files.var_builder(&device)?;
        let model = XLMRobertaModel::new(&files.config, vb)?;
        let dim = files.config.hidden_size;
        info!(dim, "embedding model loaded");
        Ok(Self { model, tokenizer: files.tokenizer, device, dim })
    }

    fn embed_chunk(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let batch = tokenize_batch(&self.tokenizer, texts, MAX_LEN, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(candle_core::DType::F32)?.to_vec2()?;
        ensure!(rows.len() == texts.len(), "model returned {} rows for {} texts", rows.len(), texts.len());
        Ok(rows)
    }
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { MAX_LEN }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let out = self.embed_chunk(&refs)?;
        let elapsed = start.elapsed();
        debug!(n = texts.len(), ms = elapsed.as_millis() as u64, "embedded batch");
        if elapsed.as_millis() > 100 * texts.len() as u128 { warn!(n = texts.len(), "slow embedding batch"); }
        Ok(out)
    }
}

/// Deterministic bag-of-words embedder hashing whitespace tokens with xxHash.
/// Texts sharing words get similar vectors; no model files needed.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder { pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } } }

impl FakeEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; } v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { MAX_LEN }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub const FAKE_DIM: usize = 1024;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(use_accel: bool) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() { info!("using FakeEmbedder"); return Ok(Box::new(FakeEmbedder::new(FAKE_DIM))); }
    Ok(Box::new(EmbeddingModel::new(use_accel)?))
}

fn resolve_model_dir() -> Result<PathBuf> {
    first_existing_dir(&["APP_MODEL_DIR", "MODEL_DIR"], &["../models/bge-m3", "models/bge-m3"])
        .ok_or_else(|| anyhow!("Could not locate BGE-M3 model directory"))
}

/// L2-normalize `v` in place; zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 { for x in v.iter_mut() { *x /= norm; } }
}
