use anyhow::Result;
use candle_core::{DType, Tensor};

/// Row-wise L2 normalisation of a `[B, H]` tensor with a small epsilon guard.
pub fn l2_normalize_rows(features: &Tensor) -> Result<Tensor> {
    let dims = features.dims();
    anyhow::ensure!(dims.len() == 2, "features shape must be [B,H], got {:?}", dims);
    let eps_val = match features.dtype() { DType::F16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], features.device())?.to_dtype(features.dtype())?.unsqueeze(0)?;
    let norm = features.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.broadcast_add(&eps)?;
    Ok(features.broadcast_div(&norm)?)
}
