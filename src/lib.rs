//! FasterSpeech training data pipeline and losses in pure Rust.
//!
//! A candle-based implementation of the data-loading and loss machinery for
//! the FasterSpeech non-autoregressive TTS acoustic model: aligning text
//! tokens with externally computed per-token durations, collating batches at
//! token rate and frame rate, and the duration/mel training losses.
//!
//! ## Data flow
//!
//! ```text
//! (id, audio, text, speaker) ──┐
//!                              ├→ FasterSpeechDataset (attach durations,
//! duration store ──────────────┘   speaker embedding)
//!                               ↓
//!                  Collator (text, text_mask, dur,
//!                            text_rep, text_rep_mask)
//!                               ↓
//!                  acoustic network (external)
//!                               ↓
//!             DurationLoss / MelLoss (masked, reduced)
//! ```
//!
//! ## Modules
//!
//! - [`ops`] — pad-and-stack, presence masks, blank/token interleaving
//! - [`data`] — duration-aware dataset, batch collator, epoch samplers
//! - [`loss`] — duration loss engine (6 parameterizations), mel loss,
//!   discretized mixture of logistics primitives
//! - [`model`] — the acoustic-network collaborator seam
//! - [`config`] — duration scheme, loss method, reduction, sampler options

pub mod config;
pub mod data;
pub mod loss;
pub mod model;
pub mod ops;

mod error;

pub use error::{Error, Result};
