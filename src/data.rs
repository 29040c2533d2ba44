//! Data pipeline: duration-aware dataset, batch collation, epoch samplers.
//!
//! ## Components
//!
//! - [`dataset`] — joins upstream (audio, text) examples with precomputed
//!   durations and speaker embeddings
//! - [`collate`] — builds token-rate and frame-rate batch tensors
//! - [`sampler`] — deterministic per-epoch index orders, optionally bucketed
//!   by sequence length

pub mod collate;
pub mod dataset;
pub mod sampler;

pub use collate::{Batch, Collator};
pub use dataset::{AudioExample, AudioSource, DurationStore, Example, FasterSpeechDataset, SpeakerTable};
pub use sampler::{EpochShuffleSampler, LengthBucketedSampler, Sampler, ShardSpec};
