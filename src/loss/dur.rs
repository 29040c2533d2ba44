//! Duration loss engine.
//!
//! Six interchangeable parameterizations of the scalar duration prediction
//! problem, behind one strategy interface:
//!
//! | method     | target transform                  | loss          | width |
//! |------------|-----------------------------------|---------------|-------|
//! | `l2-log`   | log(d + 1)                        | MSE           | 1     |
//! | `l2`       | d                                 | MSE           | 1     |
//! | `dmld-log` | clamp, log-scale into [-1, 1]     | logistic mix  | 3K    |
//! | `dmld`     | clamp, linear-scale into [-1, 1]  | logistic mix  | 3K    |
//! | `xe`       | clamp to class 0..C-1             | cross-entropy | C     |
//! | `xe-steps` | nearest boundary index            | cross-entropy | len(table) |
//!
//! Each method knows its network output width, how to encode integer
//! durations into regression/class targets, how to score predictions per
//! position, and how to decode raw predictions back into durations.
//! Decoded durations are always clamped at 0 and rounded to integers.

use candle_core::{DType, Tensor, D};
use candle_nn::ops::log_softmax;

use crate::config::{DurLossConfig, DurLossMethod, Reduction};
use crate::loss::{dmld, reduce_masked};
use crate::{Error, Result};

/// One duration-loss parameterization.
pub trait DurationMethod: Send + Sync {
    /// Width of the network output this method expects per position.
    fn output_width(&self) -> usize;

    /// Transform integer durations `(B, T)` into this method's target space.
    fn encode_targets(&self, dur_true: &Tensor) -> Result<Tensor>;

    /// Per-position loss `(B, T)` from raw predictions `(B, T, width)` and
    /// encoded targets.
    fn per_position_loss(&self, dur_pred: &Tensor, target: &Tensor) -> Result<Tensor>;

    /// Raw predictions back to (float) durations `(B, T)`.
    fn decode_predictions(&self, dur_pred: &Tensor) -> Result<Tensor>;
}

/// `l2` / `l2-log`: one regressed value per position.
struct Regression {
    log: bool,
}

impl Regression {
    fn squeeze_width_one(&self, dur_pred: &Tensor) -> Result<Tensor> {
        if dur_pred.dim(D::Minus1)? != 1 {
            return Err(Error::Shape(format!(
                "regression duration loss expects prediction width 1, got {}",
                dur_pred.dim(D::Minus1)?
            )));
        }
        Ok(dur_pred.squeeze(D::Minus1)?)
    }
}

impl DurationMethod for Regression {
    fn output_width(&self) -> usize {
        1
    }

    fn encode_targets(&self, dur_true: &Tensor) -> Result<Tensor> {
        let dur = dur_true.to_dtype(DType::F32)?;
        if self.log {
            Ok((dur + 1.0)?.log()?)
        } else {
            Ok(dur)
        }
    }

    fn per_position_loss(&self, dur_pred: &Tensor, target: &Tensor) -> Result<Tensor> {
        let pred = self.squeeze_width_one(dur_pred)?;
        Ok((pred - target)?.sqr()?)
    }

    fn decode_predictions(&self, dur_pred: &Tensor) -> Result<Tensor> {
        let pred = self.squeeze_width_one(dur_pred)?;
        if self.log {
            Ok((pred.exp()? - 1.0)?)
        } else {
            Ok(pred)
        }
    }
}

/// `dmld` / `dmld-log`: a discretized logistic mixture over durations
/// clamped to `0..num_classes` and rescaled into [-1, 1].
struct Mixture {
    log: bool,
    num_classes: usize,
    hidden: usize,
}

impl DurationMethod for Mixture {
    fn output_width(&self) -> usize {
        3 * self.hidden
    }

    fn encode_targets(&self, dur_true: &Tensor) -> Result<Tensor> {
        let top = (self.num_classes - 1) as f64;
        let dur = dur_true.to_dtype(DType::F32)?.clamp(0.0, top)?;
        let scaled = if self.log {
            // [0, C-1] => [0, log C] => [0, 1], saturating at 1.
            let dur = (dur + 1.0)?.log()?;
            ((dur / (self.num_classes as f64).ln())?).minimum(1.0)?
        } else {
            (dur / top)?
        };
        Ok(((scaled - 0.5)? * 2.0)?)
    }

    fn per_position_loss(&self, dur_pred: &Tensor, target: &Tensor) -> Result<Tensor> {
        dmld::dmld_loss(dur_pred, target, self.num_classes)
    }

    fn decode_predictions(&self, dur_pred: &Tensor) -> Result<Tensor> {
        let top = (self.num_classes - 1) as f64;
        let sample = dmld::dmld_sample(dur_pred)?;
        let unit = ((sample + 1.0)? * 0.5)?;
        if self.log {
            let dur = ((unit * (self.num_classes as f64).ln())?.exp()? - 1.0)?;
            Ok(dur.minimum(top)?)
        } else {
            Ok((unit * top)?)
        }
    }
}

/// `xe`: plain ordinal classes `0..num_classes`.
struct Classes {
    num_classes: usize,
}

impl DurationMethod for Classes {
    fn output_width(&self) -> usize {
        self.num_classes
    }

    fn encode_targets(&self, dur_true: &Tensor) -> Result<Tensor> {
        let top = (self.num_classes - 1) as f64;
        Ok(dur_true
            .to_dtype(DType::F32)?
            .clamp(0.0, top)?
            .to_dtype(DType::U32)?)
    }

    fn per_position_loss(&self, dur_pred: &Tensor, target: &Tensor) -> Result<Tensor> {
        cross_entropy_per_position(dur_pred, target)
    }

    fn decode_predictions(&self, dur_pred: &Tensor) -> Result<Tensor> {
        Ok(dur_pred.argmax(D::Minus1)?.to_dtype(DType::F32)?)
    }
}

/// `xe-steps`: classes on a geometrically growing boundary table, so large
/// durations share coarse classes while small ones stay exact.
struct SteppedClasses {
    classes: Vec<i64>,
}

impl SteppedClasses {
    fn class_tensor(&self, device: &candle_core::Device) -> Result<Tensor> {
        let values: Vec<f32> = self.classes.iter().map(|&c| c as f32).collect();
        Ok(Tensor::new(values.as_slice(), device)?)
    }
}

impl DurationMethod for SteppedClasses {
    fn output_width(&self) -> usize {
        self.classes.len()
    }

    fn encode_targets(&self, dur_true: &Tensor) -> Result<Tensor> {
        // Nearest boundary by absolute distance.
        let classes = self
            .class_tensor(dur_true.device())?
            .reshape((1, 1, self.classes.len()))?;
        let dur = dur_true.to_dtype(DType::F32)?.unsqueeze(D::Minus1)?;
        Ok(dur.broadcast_sub(&classes)?.abs()?.argmin(D::Minus1)?)
    }

    fn per_position_loss(&self, dur_pred: &Tensor, target: &Tensor) -> Result<Tensor> {
        cross_entropy_per_position(dur_pred, target)
    }

    fn decode_predictions(&self, dur_pred: &Tensor) -> Result<Tensor> {
        let (batch, time, _) = dur_pred.dims3()?;
        let index = dur_pred.argmax(D::Minus1)?.unsqueeze(D::Minus1)?;
        let classes = self
            .class_tensor(dur_pred.device())?
            .reshape((1, 1, self.classes.len()))?
            .broadcast_as((batch, time, self.classes.len()))?
            .contiguous()?;
        Ok(classes.gather(&index, D::Minus1)?.squeeze(D::Minus1)?)
    }
}

/// Unreduced cross-entropy: `(B, T, C)` logits, `(B, T)` U32 targets,
/// `(B, T)` losses.
fn cross_entropy_per_position(logits: &Tensor, target: &Tensor) -> Result<Tensor> {
    let log_probs = log_softmax(logits, D::Minus1)?;
    let picked = log_probs.gather(&target.unsqueeze(D::Minus1)?, D::Minus1)?;
    Ok(picked.squeeze(D::Minus1)?.neg()?)
}

/// Boundary table for `xe-steps`: exact classes `0..num_classes`, then
/// geometric growth (`k *= coef; c += k`) until the boundary passes
/// `max_dur`.
fn xe_steps_classes(num_classes: usize, max_dur: usize, coef: f64) -> Vec<i64> {
    let mut classes: Vec<i64> = (0..num_classes as i64).collect();
    let mut step = 1.0f64;
    let mut boundary = (num_classes - 1) as f64;
    while boundary < max_dur as f64 {
        step *= coef;
        boundary += step;
        classes.push(boundary as i64);
    }
    classes
}

/// Configured duration loss: a method plus a masked reduction.
pub struct DurationLoss {
    method: Box<dyn DurationMethod>,
    reduction: Reduction,
}

impl DurationLoss {
    pub fn new(config: &DurLossConfig) -> Result<Self> {
        if config.num_classes < 2 {
            return Err(Error::Config(format!(
                "duration loss needs at least 2 classes, got {}",
                config.num_classes
            )));
        }
        let method: Box<dyn DurationMethod> = match config.method {
            DurLossMethod::L2Log => Box::new(Regression { log: true }),
            DurLossMethod::L2 => Box::new(Regression { log: false }),
            DurLossMethod::DmldLog => Box::new(Mixture {
                log: true,
                num_classes: config.num_classes,
                hidden: config.dmld_hidden,
            }),
            DurLossMethod::Dmld => Box::new(Mixture {
                log: false,
                num_classes: config.num_classes,
                hidden: config.dmld_hidden,
            }),
            DurLossMethod::Xe => Box::new(Classes {
                num_classes: config.num_classes,
            }),
            DurLossMethod::XeSteps => {
                // Below 1.0 the step shrinks and the boundary converges
                // short of max_dur, so the table would never finish.
                if config.xe_steps_coef <= 1.0 {
                    return Err(Error::Config(format!(
                        "xe-steps coefficient must be greater than 1.0, got {}",
                        config.xe_steps_coef
                    )));
                }
                let classes =
                    xe_steps_classes(config.num_classes, config.max_dur, config.xe_steps_coef);
                tracing::info!(boundaries = classes.len(), "xe-steps classes: {classes:?}");
                Box::new(SteppedClasses { classes })
            }
        };
        Ok(Self {
            method,
            reduction: config.reduction,
        })
    }

    /// Width of the network projection head this loss expects.
    pub fn output_width(&self) -> usize {
        self.method.output_width()
    }

    /// Masked, reduced loss from true durations `(B, T)` I64, raw
    /// predictions `(B, T, width)` and the text presence mask `(B, T)`.
    pub fn forward(&self, dur_true: &Tensor, dur_pred: &Tensor, text_mask: &Tensor) -> Result<Tensor> {
        let target = self.method.encode_targets(dur_true)?;
        let loss = self.method.per_position_loss(dur_pred, &target)?;
        if loss.shape() != text_mask.shape() {
            return Err(Error::Shape(format!(
                "duration loss {:?} vs text_mask {:?}",
                loss.shape(),
                text_mask.shape()
            )));
        }
        reduce_masked(&loss, text_mask, self.reduction)
    }

    /// Decode raw predictions into integer durations: the method's inverse
    /// transform, clamped at 0 and rounded.
    pub fn decode(&self, dur_pred: &Tensor) -> Result<Tensor> {
        let dur = self.method.decode_predictions(dur_pred)?;
        Ok(dur.maximum(0.0)?.round()?.to_dtype(DType::I64)?)
    }
}
