//! Masked mel-spectrogram reconstruction loss.

use candle_core::{DType, Tensor, D};

use crate::config::Reduction;
use crate::loss::reduce_masked;
use crate::{Error, Result};

/// Per-frame MSE over the frame-rate-expanded sequence.
#[derive(Debug, Clone, Copy)]
pub struct MelLoss {
    reduction: Reduction,
}

impl MelLoss {
    pub fn new(reduction: Reduction) -> Self {
        Self { reduction }
    }

    /// Compute the loss.
    ///
    /// - `mel_true`: ground-truth mel `(B, D, T)`
    /// - `mel_pred`: predicted mel `(B, T, D)`
    /// - `mel_len`: valid frame counts `(B,)`
    /// - `dur_true`: per-position durations `(B, T_text)`
    /// - `text_rep_mask`: frame-rate presence mask `(B, T)`
    ///
    /// The per-example mel length, duration sum and mask sum count the same
    /// frames by definition; any mismatch is an upstream bug and fatal.
    pub fn forward(
        &self,
        mel_true: &Tensor,
        mel_pred: &Tensor,
        mel_len: &Tensor,
        dur_true: &Tensor,
        text_rep_mask: &Tensor,
    ) -> Result<Tensor> {
        let lens = mel_len.to_dtype(DType::I64)?.to_vec1::<i64>()?;
        let dur_sums = dur_true
            .to_dtype(DType::I64)?
            .sum(D::Minus1)?
            .to_vec1::<i64>()?;
        let mask_sums = text_rep_mask
            .to_dtype(DType::I64)?
            .sum(D::Minus1)?
            .to_vec1::<i64>()?;
        if lens != dur_sums || lens != mask_sums {
            return Err(Error::Shape(format!(
                "mel length mismatch: mel_len={lens:?}, dur sums={dur_sums:?}, mask sums={mask_sums:?}"
            )));
        }

        let frames_true = mel_true.transpose(1, 2)?; // (B, T, D)
        let loss = (mel_pred - &frames_true)?.sqr()?.mean(D::Minus1)?;
        reduce_masked(&loss, text_rep_mask, self.reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn consistent_batch_gives_finite_loss() {
        let device = Device::Cpu;
        let mel_true = Tensor::randn(0.0f32, 1.0, (2, 80, 12), &device).unwrap();
        let mel_pred = Tensor::randn(0.0f32, 1.0, (2, 12, 80), &device).unwrap();
        let mel_len = Tensor::new(&[10i64, 12], &device).unwrap();
        let dur_true = Tensor::new(&[[4i64, 6, 0], [5, 3, 4]], &device).unwrap();
        let mask = Tensor::new(
            &[
                [1u8, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0],
                [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
            ],
            &device,
        )
        .unwrap();

        let loss = MelLoss::new(Reduction::All);
        let value: f32 = loss
            .forward(&mel_true, &mel_pred, &mel_len, &dur_true, &mask)
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(value.is_finite());
        assert!(value > 0.0);
    }

    #[test]
    fn perfect_prediction_is_zero() {
        let device = Device::Cpu;
        let mel_true = Tensor::randn(0.0f32, 1.0, (1, 4, 3), &device).unwrap();
        let mel_pred = mel_true.transpose(1, 2).unwrap();
        let mel_len = Tensor::new(&[3i64], &device).unwrap();
        let dur_true = Tensor::new(&[[2i64, 1]], &device).unwrap();
        let mask = Tensor::new(&[[1u8, 1, 1]], &device).unwrap();

        let loss = MelLoss::new(Reduction::Batch);
        let value: f32 = loss
            .forward(&mel_true, &mel_pred, &mel_len, &dur_true, &mask)
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(value.abs() < 1e-12);
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let device = Device::Cpu;
        let mel_true = Tensor::randn(0.0f32, 1.0, (2, 80, 12), &device).unwrap();
        let mel_pred = Tensor::randn(0.0f32, 1.0, (2, 12, 80), &device).unwrap();
        let mel_len = Tensor::new(&[10i64, 12], &device).unwrap();
        // Second row sums to 11, not 12.
        let dur_true = Tensor::new(&[[4i64, 6, 0], [5, 3, 3]], &device).unwrap();
        let mask = Tensor::new(
            &[
                [1u8, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0],
                [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
            ],
            &device,
        )
        .unwrap();

        let loss = MelLoss::new(Reduction::All);
        assert!(matches!(
            loss.forward(&mel_true, &mel_pred, &mel_len, &dur_true, &mask),
            Err(Error::Shape(_))
        ));
    }
}
