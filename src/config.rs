//! Configuration for the FasterSpeech data pipeline and losses.
//!
//! Enum options mirror the original training-script strings ("pad",
//! "full-pad", "l2-log", ...). Unknown names fail with [`Error::Config`] at
//! parse time, never silently default.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Duration encoding scheme.
///
/// - `Pad`: one duration per token; a space token is prepended/appended to
///   each text sequence at collation time.
/// - `FullPad`: CTC-style blanks interleaved with tokens; blank durations
///   (`tokens + 1` of them) surround and separate the token durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DursType {
    Pad,
    FullPad,
}

impl FromStr for DursType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pad" => Ok(Self::Pad),
            "full-pad" => Ok(Self::FullPad),
            other => Err(Error::Config(format!("unknown durations type {other:?}"))),
        }
    }
}

/// Duration loss parameterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DurLossMethod {
    /// MSE on log(duration + 1); network outputs one value per position.
    L2Log,
    /// MSE on the raw duration.
    L2,
    /// Discretized mixture of logistics over log-scaled durations.
    DmldLog,
    /// Discretized mixture of logistics over linearly scaled durations.
    Dmld,
    /// Cross-entropy over duration classes `0..num_classes`.
    Xe,
    /// Cross-entropy over a geometrically growing boundary table.
    XeSteps,
}

impl FromStr for DurLossMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "l2-log" => Ok(Self::L2Log),
            "l2" => Ok(Self::L2),
            "dmld-log" => Ok(Self::DmldLog),
            "dmld" => Ok(Self::Dmld),
            "xe" => Ok(Self::Xe),
            "xe-steps" => Ok(Self::XeSteps),
            other => Err(Error::Config(format!("unknown duration loss method {other:?}"))),
        }
    }
}

/// Masked loss reduction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reduction {
    /// Global mean over all unmasked positions.
    All,
    /// Per-example mean, then mean over the batch.
    Batch,
}

impl FromStr for Reduction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "batch" => Ok(Self::Batch),
            other => Err(Error::Config(format!("unknown reduction {other:?}"))),
        }
    }
}

/// Batch sampling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerKind {
    /// Plain per-epoch shuffle of the shard.
    Default,
    /// Length-bucketed batches with epoch-seeded batch-order shuffling.
    LengthBucketed,
}

impl FromStr for SamplerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(Self::Default),
            "length-bucketed" => Ok(Self::LengthBucketed),
            other => Err(Error::Config(format!("unknown sampler strategy {other:?}"))),
        }
    }
}

/// Data layer configuration: duration scheme, token ids, batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Duration encoding scheme.
    #[serde(default = "default_durs_type")]
    pub durs_type: DursType,

    /// Number of examples per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Token id used to pad text sequences to the batch width.
    pub pad_id: i64,

    /// Token id of the CTC-style blank (full-pad scheme).
    pub blank_id: i64,

    /// Token id of the space character (pad scheme).
    pub space_id: i64,

    /// Whether the upstream dataset loads waveforms.
    #[serde(default = "default_load_audio")]
    pub load_audio: bool,

    /// Batch sampling strategy.
    #[serde(default = "default_sampler")]
    pub sampler: SamplerKind,
}

/// Duration loss configuration. Defaults match the original training setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurLossConfig {
    #[serde(default = "default_method")]
    pub method: DurLossMethod,

    /// Number of duration classes / discretization bins.
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    /// Number of logistic mixture components (dmld methods).
    #[serde(default = "default_dmld_hidden")]
    pub dmld_hidden: usize,

    #[serde(default = "default_reduction")]
    pub reduction: Reduction,

    /// Largest duration the xe-steps boundary table must span.
    #[serde(default = "default_max_dur")]
    pub max_dur: usize,

    /// Geometric growth coefficient for xe-steps boundaries.
    #[serde(default = "default_xe_steps_coef")]
    pub xe_steps_coef: f64,
}

impl Default for DurLossConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            num_classes: default_num_classes(),
            dmld_hidden: default_dmld_hidden(),
            reduction: default_reduction(),
            max_dur: default_max_dur(),
            xe_steps_coef: default_xe_steps_coef(),
        }
    }
}

fn default_durs_type() -> DursType {
    DursType::FullPad
}

fn default_batch_size() -> usize {
    32
}

fn default_load_audio() -> bool {
    true
}

fn default_sampler() -> SamplerKind {
    SamplerKind::Default
}

fn default_method() -> DurLossMethod {
    DurLossMethod::L2Log
}

fn default_num_classes() -> usize {
    32
}

fn default_dmld_hidden() -> usize {
    5
}

fn default_reduction() -> Reduction {
    Reduction::All
}

fn default_max_dur() -> usize {
    500
}

fn default_xe_steps_coef() -> f64 {
    1.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kebab_case_names() {
        assert_eq!("pad".parse::<DursType>().unwrap(), DursType::Pad);
        assert_eq!("full-pad".parse::<DursType>().unwrap(), DursType::FullPad);
        assert_eq!("l2-log".parse::<DurLossMethod>().unwrap(), DurLossMethod::L2Log);
        assert_eq!("xe-steps".parse::<DurLossMethod>().unwrap(), DurLossMethod::XeSteps);
        assert_eq!("batch".parse::<Reduction>().unwrap(), Reduction::Batch);
        assert_eq!(
            "length-bucketed".parse::<SamplerKind>().unwrap(),
            SamplerKind::LengthBucketed
        );
    }

    #[test]
    fn unknown_names_are_config_errors() {
        assert!(matches!("half-pad".parse::<DursType>(), Err(Error::Config(_))));
        assert!(matches!("l3".parse::<DurLossMethod>(), Err(Error::Config(_))));
        assert!(matches!("mean".parse::<Reduction>(), Err(Error::Config(_))));
        assert!(matches!("smart".parse::<SamplerKind>(), Err(Error::Config(_))));
    }

    #[test]
    fn serde_round_trip_matches_original_strings() {
        let json = serde_json::to_string(&DursType::FullPad).unwrap();
        assert_eq!(json, "\"full-pad\"");
        let json = serde_json::to_string(&DurLossMethod::DmldLog).unwrap();
        assert_eq!(json, "\"dmld-log\"");

        let config: DurLossConfig = serde_json::from_str("{\"method\":\"xe\"}").unwrap();
        assert_eq!(config.method, DurLossMethod::Xe);
        assert_eq!(config.num_classes, 32);
        assert_eq!(config.max_dur, 500);
    }

    #[test]
    fn dur_loss_defaults() {
        let config = DurLossConfig::default();
        assert_eq!(config.method, DurLossMethod::L2Log);
        assert_eq!(config.dmld_hidden, 5);
        assert_eq!(config.reduction, Reduction::All);
        assert!((config.xe_steps_coef - 1.5).abs() < 1e-12);
    }
}
