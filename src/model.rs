//! The acoustic-network collaborator seam.
//!
//! The network body (token embedding, convolutional encoder, projection
//! head) lives outside this crate. It consumes either the token-rate pair
//! (`text`, `text_mask`) or the frame-rate pair (`text_rep`,
//! `text_rep_mask`), plus an optional speaker embedding, and returns
//! per-position predictions with their valid lengths.

use candle_core::{DType, Tensor, D};

use crate::{Error, Result};

/// A network that maps token or frame sequences to per-position predictions.
///
/// The returned `pred` is `(B, T, width)`; `len` is `(B,)` and must equal
/// the input mask's per-example valid lengths (checked with
/// [`check_pred_len`], an exact equality, not a tolerance).
pub trait AcousticModel {
    fn forward(
        &self,
        text: &Tensor,
        text_mask: &Tensor,
        speaker_emb: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)>;
}

/// Verify that predicted lengths exactly match the mask's valid lengths.
pub fn check_pred_len(text_mask: &Tensor, pred_len: &Tensor) -> Result<()> {
    let expected = text_mask
        .to_dtype(DType::I64)?
        .sum(D::Minus1)?
        .to_vec1::<i64>()?;
    let actual = pred_len.to_dtype(DType::I64)?.to_vec1::<i64>()?;
    if expected != actual {
        return Err(Error::Shape(format!(
            "prediction lengths {actual:?} do not match mask lengths {expected:?}"
        )));
    }
    Ok(())
}
