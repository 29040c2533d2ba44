//! Discretized mixture of logistics over a bounded range.
//!
//! The PixelCNN++/WaveNet parameterization: a K-component logistic mixture
//! whose density is integrated over `num_classes` equal bins spanning
//! [-1, 1]. Interior bins use the CDF difference between bin edges (with a
//! log-pdf fallback when the difference underflows); the extreme bins use
//! one-sided CDFs so the tails are not truncated.
//!
//! Predictions are laid out `(B, T, 3K)`: K component logits, K means,
//! K log-scales (floored at -7 for numerical stability).

use candle_core::{Tensor, D};
use candle_nn::ops::{log_softmax, sigmoid};

use crate::{Error, Result};

fn split_params(pred: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
    let width = pred.dim(D::Minus1)?;
    if width % 3 != 0 || width == 0 {
        return Err(Error::Shape(format!(
            "dmld prediction width {width} is not a positive multiple of 3"
        )));
    }
    let k = width / 3;
    let logit_probs = pred.narrow(D::Minus1, 0, k)?;
    let means = pred.narrow(D::Minus1, k, k)?;
    let log_scales = pred.narrow(D::Minus1, 2 * k, k)?.maximum(-7.0)?;
    Ok((logit_probs, means, log_scales))
}

/// Numerically stable `log(1 + exp(x))`.
fn softplus(x: &Tensor) -> Result<Tensor> {
    let log1p = (x.abs()?.neg()?.exp()? + 1.0)?.log()?;
    Ok((x.relu()? + log1p)?)
}

/// `log(sum(exp(x)))` over the last dimension.
fn log_sum_exp(x: &Tensor) -> Result<Tensor> {
    let max = x.max_keepdim(D::Minus1)?;
    let sum = x.broadcast_sub(&max)?.exp()?.sum_keepdim(D::Minus1)?;
    Ok((sum.log()? + max)?.squeeze(D::Minus1)?)
}

/// Per-position negative log-likelihood of `target` under the mixture.
///
/// `pred` is `(B, T, 3K)`, `target` is `(B, T)` with values in [-1, 1];
/// returns `(B, T)`.
pub fn dmld_loss(pred: &Tensor, target: &Tensor, num_classes: usize) -> Result<Tensor> {
    if num_classes < 2 {
        return Err(Error::Config(format!(
            "dmld needs at least 2 classes, got {num_classes}"
        )));
    }
    let (logit_probs, means, log_scales) = split_params(pred)?;

    let x = target.unsqueeze(D::Minus1)?; // (B, T, 1)
    let centered = x.broadcast_sub(&means)?; // (B, T, K)
    let inv_stdv = log_scales.neg()?.exp()?;
    let half_bin = 1.0 / (num_classes as f64 - 1.0);

    let plus_in = (&inv_stdv * &(&centered + half_bin)?)?;
    let min_in = (&inv_stdv * &(&centered - half_bin)?)?;

    let log_cdf_plus = (&plus_in - &softplus(&plus_in)?)?;
    let log_one_minus_cdf_min = softplus(&min_in)?.neg()?;
    let cdf_delta = (sigmoid(&plus_in)? - sigmoid(&min_in)?)?;

    // Fallback for bins where the CDF difference underflows: the density at
    // the bin center times the bin width.
    let mid_in = (&inv_stdv * &centered)?;
    let log_pdf_mid = ((&mid_in - &log_scales)? - (softplus(&mid_in)? * 2.0)?)?;
    let log_bin_width = ((num_classes as f64 - 1.0) / 2.0).ln();
    let interior = cdf_delta.gt(1e-5)?.where_cond(
        &cdf_delta.maximum(1e-12)?.log()?,
        &(log_pdf_mid - log_bin_width)?,
    )?;

    let x_wide = x.broadcast_as(centered.shape())?;
    let per_component = x_wide
        .gt(0.999)?
        .where_cond(&log_one_minus_cdf_min, &interior)?;
    let per_component = x_wide.lt(-0.999)?.where_cond(&log_cdf_plus, &per_component)?;

    let log_probs = (&per_component + &log_softmax(&logit_probs, D::Minus1)?)?;
    Ok(log_sum_exp(&log_probs)?.neg()?)
}

/// Draw one value per position from the mixture: Gumbel-max component
/// choice, then a logistic inverse-CDF draw, clamped to [-1, 1].
///
/// Returns `(B, T)` for `pred` of shape `(B, T, 3K)`.
pub fn dmld_sample(pred: &Tensor) -> Result<Tensor> {
    let (logit_probs, means, log_scales) = split_params(pred)?;
    let (batch, time, k) = logit_probs.dims3()?;
    let device = pred.device();

    let uniform = Tensor::rand(1e-5f32, 1.0 - 1e-5f32, (batch, time, k), device)?;
    let gumbel = uniform.log()?.neg()?.log()?.neg()?;
    let component = (&logit_probs + &gumbel)?
        .argmax(D::Minus1)?
        .unsqueeze(D::Minus1)?;

    // narrow() views are not contiguous, and gather requires it.
    let mean = means.contiguous()?.gather(&component, D::Minus1)?;
    let log_scale = log_scales.contiguous()?.gather(&component, D::Minus1)?;

    let u = Tensor::rand(1e-5f32, 1.0 - 1e-5f32, (batch, time, 1), device)?;
    // logit(u) is a standard logistic draw.
    let logistic = (u.log()? - u.affine(-1.0, 1.0)?.log()?)?;
    let sample = (mean + (log_scale.exp()? * logistic)?)?;
    Ok(sample.squeeze(D::Minus1)?.clamp(-1.0, 1.0)?)
}
