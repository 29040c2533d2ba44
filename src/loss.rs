//! Training losses.
//!
//! ## Components
//!
//! - [`dur`] — duration loss engine with six interchangeable
//!   parameterizations (regression, ordinal classes, logistic mixtures)
//! - [`mel`] — masked mel-spectrogram reconstruction loss
//! - [`dmld`] — discretized mixture of logistics primitives
//!
//! All losses are computed per position, multiplied by a presence mask, then
//! reduced with [`reduce_masked`].

pub mod dmld;
pub mod dur;
pub mod mel;

use candle_core::{DType, Tensor, D};

use crate::config::Reduction;
use crate::Result;

/// Reduce a per-position loss `(B, T)` under a presence mask `(B, T)`.
///
/// `All` averages over every unmasked position of the batch; `Batch` takes a
/// per-example mean first, then the mean over examples.
pub fn reduce_masked(loss: &Tensor, mask: &Tensor, reduction: Reduction) -> Result<Tensor> {
    let mask = mask.to_dtype(DType::F32)?;
    let masked = (loss * &mask)?;
    match reduction {
        Reduction::All => Ok((masked.sum_all()? / mask.sum_all()?)?),
        Reduction::Batch => {
            let per_example = (masked.sum(D::Minus1)? / mask.sum(D::Minus1)?)?;
            Ok(per_example.mean_all()?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn reductions_weight_examples_differently() {
        let device = Device::Cpu;
        // Row 0: two valid positions with loss 1.0; row 1: one with loss 4.0.
        let loss = Tensor::new(&[[1.0f32, 1.0, 9.0], [4.0, 9.0, 9.0]], &device).unwrap();
        let mask = Tensor::new(&[[1u8, 1, 0], [1, 0, 0]], &device).unwrap();

        let all: f32 = reduce_masked(&loss, &mask, Reduction::All)
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!((all - 2.0).abs() < 1e-6); // (1 + 1 + 4) / 3

        let batch: f32 = reduce_masked(&loss, &mask, Reduction::Batch)
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!((batch - 2.5).abs() < 1e-6); // mean(1, 4)
    }

    #[test]
    fn masked_positions_do_not_contribute() {
        let device = Device::Cpu;
        let loss = Tensor::new(&[[3.0f32, 1e6]], &device).unwrap();
        let mask = Tensor::new(&[[1u8, 0]], &device).unwrap();
        let value: f32 = reduce_masked(&loss, &mask, Reduction::All)
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!((value - 3.0).abs() < 1e-6);
    }
}
