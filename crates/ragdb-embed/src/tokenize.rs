use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::{Encoding, Tokenizer};

/// XLM-R `<pad>` id.
pub const PAD_ID: u32 = 1;

/// Token tensors for one batch, padded to the longest sequence.
pub struct Batch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Tokenize `texts`, truncate each to `max_len` and right-pad to the longest.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[&str], max_len: usize, device: &Device) -> Result<Batch> {
    let encodings = texts
        .iter()
        .map(|t| tokenizer.encode(*t, true).map_err(|e| anyhow!("Tokenization failed: {}", e)))
        .collect::<Result<Vec<_>>>()?;
    pad_to_tensors(&encodings, max_len, device)
}

/// Tokenize `(query, passage)` pairs for a cross-encoder.
pub fn tokenize_pairs(tokenizer: &Tokenizer, query: &str, passages: &[&str], max_len: usize, device: &Device) -> Result<Batch> {
    let encodings = passages
        .iter()
        .map(|p| tokenizer.encode((query, *p), true).map_err(|e| anyhow!("Tokenization failed: {}", e)))
        .collect::<Result<Vec<_>>>()?;
    pad_to_tensors(&encodings, max_len, device)
}

fn pad_to_tensors(encodings: &[Encoding], max_len: usize, device: &Device) -> Result<Batch> {
    let width = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);
    let rows = encodings.len();
    let mut ids = Vec::with_capacity(rows * width);
    let mut mask = Vec::with_capacity(rows * width);
    for enc in encodings {
        let n = enc.get_ids().len().min(width);
        ids.extend_from_slice(&enc.get_ids()[..n]);
        mask.extend_from_slice(&enc.get_attention_mask()[..n]);
        ids.extend(std::iter::repeat(PAD_ID).take(width - n));
        mask.extend(std::iter::repeat(0).take(width - n));
    }
    let input_ids = Tensor::from_vec(ids, (rows, width), device)?;
    let attention_mask = Tensor::from_vec(mask, (rows, width), device)?;
    let token_type_ids = input_ids.zeros_like()?;
    Ok(Batch { input_ids, attention_mask, token_type_ids })
}
