//! Variable-length-sequence batching primitives.
//!
//! Everything the collator needs to turn ragged per-example sequences into
//! rectangular tensors: right-padding with a fill value ([`merge`]), boolean
//! presence masks from true lengths ([`make_mask`]), CTC-style blank/token
//! interleaving ([`interleave`]) and frame-rate expansion ([`repeat_by`]).

use candle_core::{Device, Tensor, WithDType};

use crate::{Error, Result};

/// Right-pad each row to the maximum length with `fill` and stack into a
/// 2-D tensor of shape `(rows.len(), max_len)`.
///
/// Fails on an empty input set. Never truncates.
pub fn merge<T: WithDType + Copy>(rows: &[Vec<T>], fill: T, device: &Device) -> Result<Tensor> {
    if rows.is_empty() {
        return Err(Error::Shape("merge called with no sequences".into()));
    }
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut flat = Vec::with_capacity(rows.len() * width);
    for row in rows {
        flat.extend_from_slice(row);
        flat.resize(flat.len() + (width - row.len()), fill);
    }
    Ok(Tensor::from_vec(flat, (rows.len(), width), device)?)
}

/// Boolean presence mask (dtype U8) of shape `(lengths.len(), max(lengths))`:
/// row `i` is true for positions `< lengths[i]`.
pub fn make_mask(lengths: &[usize], device: &Device) -> Result<Tensor> {
    let rows: Vec<Vec<u8>> = lengths.iter().map(|&len| vec![1u8; len]).collect();
    merge(&rows, 0u8, device)
}

/// Alternate two sequences: `a[0], b[0], a[1], b[1], ..., a[last]`.
///
/// Elements of `a` land at even positions, `b` at odd; the output has length
/// `2 * b.len() + 1`. Requires `a.len() == b.len() + 1` (blanks surround and
/// separate tokens), checked explicitly.
pub fn interleave<T: Copy>(a: &[T], b: &[T]) -> Result<Vec<T>> {
    if a.len() != b.len() + 1 {
        return Err(Error::Shape(format!(
            "interleave requires len(a) == len(b) + 1, got {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let mut out = Vec::with_capacity(2 * b.len() + 1);
    for (x, y) in a.iter().zip(b.iter()) {
        out.push(*x);
        out.push(*y);
    }
    out.push(a[b.len()]);
    Ok(out)
}

/// Repeat each value by its count and concatenate: the frame-rate expansion
/// of one token-rate row. Non-positive counts contribute nothing.
pub fn repeat_by(values: &[i64], counts: &[i64]) -> Vec<i64> {
    let total: i64 = counts.iter().map(|&c| c.max(0)).sum();
    let mut out = Vec::with_capacity(total as usize);
    for (&value, &count) in values.iter().zip(counts.iter()) {
        for _ in 0..count {
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_pads_and_stacks() {
        let device = Device::Cpu;
        let rows = vec![vec![1i64, 2, 3], vec![4i64]];
        let merged = merge(&rows, -1i64, &device).unwrap();
        assert_eq!(merged.dims(), &[2, 3]);
        let values: Vec<Vec<i64>> = merged.to_vec2().unwrap();
        assert_eq!(values, vec![vec![1, 2, 3], vec![4, -1, -1]]);
    }

    #[test]
    fn merge_rejects_empty_input() {
        let device = Device::Cpu;
        let rows: Vec<Vec<i64>> = Vec::new();
        assert!(matches!(merge(&rows, 0i64, &device), Err(Error::Shape(_))));
    }

    #[test]
    fn make_mask_from_lengths() {
        let device = Device::Cpu;
        let mask = make_mask(&[3, 5, 2], &device).unwrap();
        assert_eq!(mask.dims(), &[3, 5]);
        let values: Vec<Vec<u8>> = mask.to_vec2().unwrap();
        assert_eq!(values[0], vec![1, 1, 1, 0, 0]);
        assert_eq!(values[1], vec![1, 1, 1, 1, 1]);
        assert_eq!(values[2], vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn interleave_alternates_even_odd() {
        let a = [10i64, 11, 12, 13];
        let b = [20i64, 21, 22];
        let out = interleave(&a, &b).unwrap();
        assert_eq!(out.len(), 2 * b.len() + 1);
        for (i, &value) in out.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(value, a[i / 2]);
            } else {
                assert_eq!(value, b[i / 2]);
            }
        }
    }

    #[test]
    fn interleave_single_element() {
        let out = interleave(&[7i64], &[]).unwrap();
        assert_eq!(out, vec![7]);
    }

    #[test]
    fn interleave_checks_length_relation() {
        assert!(matches!(
            interleave(&[1i64, 2], &[3i64, 4]),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn repeat_by_expands_to_frame_rate() {
        let expanded = repeat_by(&[5, 6, 7], &[2, 0, 3]);
        assert_eq!(expanded, vec![5, 5, 7, 7, 7]);
        assert!(repeat_by(&[], &[]).is_empty());
    }
}
