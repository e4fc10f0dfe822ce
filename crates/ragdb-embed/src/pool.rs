use anyhow::{ensure, Result};
use candle_core::{DType, Tensor, D};

/// Sentence vectors from token states: average the positions kept by
/// `attention_mask` (`[B,T]`), then scale each row of the `[B,H]` result to
/// unit length.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    ensure!(hidden.rank() == 3, "hidden states must be [B,T,H], got {:?}", hidden.dims());
    let (batch, tokens, _) = hidden.dims3()?;
    ensure!(
        attention_mask.dims() == [batch, tokens],
        "attention mask {:?} does not cover [{batch}, {tokens}]",
        attention_mask.dims()
    );

    let weights = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(D::Minus1)?;
    let summed = hidden.broadcast_mul(&weights)?.sum(1)?;
    // All-padding rows keep a count of one and pool to zero.
    let counts = weights.sum(1)?.clamp(1f64, f64::MAX)?;
    let mean = summed.broadcast_div(&counts)?;

    let eps = if hidden.dtype() == DType::F16 { 1e-6 } else { 1e-12 };
    let norms = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
    Ok(mean.broadcast_div(&norms)?)
}
