//! Cross-encoder reranking (BGE reranker family).
//!
//! Scores `(query, passage)` pairs jointly with an XLM-RoBERTa sequence
//! classifier that has a single output label. Scores are raw logits.

use anyhow::{ensure, Result};
use std::path::Path;

use candle_core::{DType, Device};
use candle_transformers::models::xlm_roberta::XLMRobertaForSequenceClassification;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use ragdb_core::traits::Reranker;

use crate::device::select_device;
use crate::tokenize::tokenize_pairs;
use crate::weights::{first_existing_dir, ModelFiles};

/// Token limit for a concatenated `(query, passage)` pair.
pub const PAIR_MAX_LEN: usize = 512;
/// Pairs scored per forward pass.
const PAIR_BATCH: usize = 16;

pub struct CrossEncoderReranker {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
}

impl CrossEncoderReranker {
    pub fn from_dir(model_dir: &Path, use_accel: bool) -> Result<Self> {
        let device = select_device(use_accel);
        info!(dir = %model_dir.display(), "loading reranker");
        let files = ModelFiles::open(model_dir)?;
        let vb = files.var_builder(&device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &files.config, vb)?;
        Ok(Self { model, tokenizer: files.tokenizer, device })
    }
}

impl Reranker for CrossEncoderReranker {
    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for group in passages.chunks(PAIR_BATCH) {
            let batch = tokenize_pairs(&self.tokenizer, query, group, PAIR_MAX_LEN, &self.device)?;
            let logits = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids)?;
            let logits: Vec<f32> = logits.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
            ensure!(logits.len() == group.len(), "reranker returned {} logits for {} pairs", logits.len(), group.len());
            scores.extend(logits);
        }
        debug!(pairs = passages.len(), "reranked");
        Ok(scores)
    }
}

/// Cross-encoder from `APP_RERANK_MODEL_DIR` (or `models/bge-reranker`).
/// `Ok(None)` when no model directory exists; a directory that fails to load
/// is an error.
pub fn get_default_reranker(use_accel: bool) -> Result<Option<Box<dyn Reranker>>> {
    let Some(dir) = first_existing_dir(&["APP_RERANK_MODEL_DIR"], &["../models/bge-reranker", "models/bge-reranker"]) else {
        info!("no reranker model found, reranking disabled");
        return Ok(None);
    };
    Ok(Some(Box::new(CrossEncoderReranker::from_dir(&dir, use_accel)?)))
}
