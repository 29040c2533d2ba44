//! Deterministic per-epoch index sampling.
//!
//! Both samplers shard the dataset across parallel replicas and reseed a
//! `ChaCha8Rng` from the epoch number, so the index order is reproducible for
//! a given epoch across runs and restarts, and differs between epochs.
//!
//! [`LengthBucketedSampler`] additionally sorts its shard by a length key and
//! emits consecutive fixed-size batches, shuffling only the batch order —
//! similar-length examples share a batch, which keeps padding waste low.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::SamplerKind;
use crate::{Error, Result};

/// Partition of the dataset across parallel data-loading replicas.
#[derive(Debug, Clone, Copy)]
pub struct ShardSpec {
    pub num_replicas: usize,
    pub rank: usize,
}

impl Default for ShardSpec {
    fn default() -> Self {
        Self {
            num_replicas: 1,
            rank: 0,
        }
    }
}

impl ShardSpec {
    pub fn new(num_replicas: usize, rank: usize) -> Result<Self> {
        if num_replicas == 0 || rank >= num_replicas {
            return Err(Error::Config(format!(
                "invalid shard: rank {rank} of {num_replicas} replicas"
            )));
        }
        Ok(Self { num_replicas, rank })
    }

    /// This replica's slice of `0..len` for the given epoch.
    ///
    /// The full index set is permuted with an epoch-seeded generator and
    /// wrap-padded so every replica receives the same count, then sliced with
    /// stride `num_replicas` starting at `rank`.
    fn shard(&self, len: usize, epoch: u64) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(epoch);
        indices.shuffle(&mut rng);

        let per_replica = len.div_ceil(self.num_replicas);
        let pad = per_replica * self.num_replicas - len;
        let tail: Vec<usize> = indices.iter().take(pad).copied().collect();
        indices.extend(tail);

        indices
            .into_iter()
            .skip(self.rank)
            .step_by(self.num_replicas)
            .collect()
    }
}

/// The "default" strategy: a plain epoch-shuffled shard.
#[derive(Debug, Clone)]
pub struct EpochShuffleSampler {
    len: usize,
    shard: ShardSpec,
}

impl EpochShuffleSampler {
    pub fn new(len: usize, shard: ShardSpec) -> Self {
        Self { len, shard }
    }

    pub fn epoch_indices(&self, epoch: u64) -> Vec<usize> {
        self.shard.shard(self.len, epoch)
    }
}

/// Length-bucketed batches with epoch-seeded batch-order shuffling.
#[derive(Debug, Clone)]
pub struct LengthBucketedSampler {
    lengths: Vec<f64>,
    batch_size: usize,
    shard: ShardSpec,
}

impl LengthBucketedSampler {
    /// `lengths[i]` is the bucketing key for example `i` (e.g. utterance
    /// duration in seconds).
    pub fn new(lengths: Vec<f64>, batch_size: usize, shard: ShardSpec) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        Ok(Self {
            lengths,
            batch_size,
            shard,
        })
    }

    /// Flat, batch-contiguous index order for one epoch.
    ///
    /// The last chunk may be shorter than `batch_size`; it is kept as a
    /// short batch, never dropped or padded with repeats.
    pub fn epoch_indices(&self, epoch: u64) -> Vec<usize> {
        let mut indices = self.shard.shard(self.lengths.len(), epoch);
        indices.sort_by(|&a, &b| {
            self.lengths[a]
                .partial_cmp(&self.lengths[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let batches: Vec<&[usize]> = indices.chunks(self.batch_size).collect();
        let mut order: Vec<usize> = (0..batches.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(epoch);
        order.shuffle(&mut rng);

        order
            .into_iter()
            .flat_map(|i| batches[i].iter().copied())
            .collect()
    }
}

/// Sampler strategy dispatch.
#[derive(Debug, Clone)]
pub enum Sampler {
    Shuffle(EpochShuffleSampler),
    LengthBucketed(LengthBucketedSampler),
}

impl Sampler {
    pub fn from_config(
        kind: SamplerKind,
        lengths: Vec<f64>,
        batch_size: usize,
        shard: ShardSpec,
    ) -> Result<Self> {
        match kind {
            SamplerKind::Default => Ok(Self::Shuffle(EpochShuffleSampler::new(lengths.len(), shard))),
            SamplerKind::LengthBucketed => Ok(Self::LengthBucketed(LengthBucketedSampler::new(
                lengths, batch_size, shard,
            )?)),
        }
    }

    pub fn epoch_indices(&self, epoch: u64) -> Vec<usize> {
        match self {
            Self::Shuffle(sampler) => sampler.epoch_indices(epoch),
            Self::LengthBucketed(sampler) => sampler.epoch_indices(epoch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(n: usize) -> Vec<f64> {
        // Pseudo-random but fixed lengths.
        (0..n).map(|i| ((i * 7919) % 100) as f64).collect()
    }

    #[test]
    fn same_epoch_is_deterministic() {
        let sampler =
            LengthBucketedSampler::new(lengths(97), 8, ShardSpec::default()).unwrap();
        assert_eq!(sampler.epoch_indices(3), sampler.epoch_indices(3));
    }

    #[test]
    fn different_epochs_differ() {
        let sampler =
            LengthBucketedSampler::new(lengths(97), 8, ShardSpec::default()).unwrap();
        assert_ne!(sampler.epoch_indices(0), sampler.epoch_indices(1));
    }

    #[test]
    fn batches_group_similar_lengths() {
        let lens = lengths(64);
        let sampler = LengthBucketedSampler::new(lens.clone(), 8, ShardSpec::default()).unwrap();
        let indices = sampler.epoch_indices(0);
        assert_eq!(indices.len(), 64);

        // Within each batch, lengths are non-decreasing (sorted before
        // chunking; only batch order is shuffled).
        for batch in indices.chunks(8) {
            for pair in batch.windows(2) {
                assert!(lens[pair[0]] <= lens[pair[1]]);
            }
        }
    }

    #[test]
    fn short_last_batch_is_kept() {
        let sampler =
            LengthBucketedSampler::new(lengths(10), 4, ShardSpec::default()).unwrap();
        let indices = sampler.epoch_indices(0);
        // 10 indices, batch size 4: all indices present, none dropped.
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn shards_are_balanced_and_cover_all_indices() {
        let n = 11;
        let shard0 = ShardSpec::new(2, 0).unwrap();
        let shard1 = ShardSpec::new(2, 1).unwrap();
        let a = EpochShuffleSampler::new(n, shard0).epoch_indices(5);
        let b = EpochShuffleSampler::new(n, shard1).epoch_indices(5);
        // Wrap-padding gives both replicas the same count.
        assert_eq!(a.len(), 6);
        assert_eq!(b.len(), 6);
        let mut all: Vec<usize> = a.iter().chain(b.iter()).copied().collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn invalid_shard_is_config_error() {
        assert!(matches!(ShardSpec::new(0, 0), Err(Error::Config(_))));
        assert!(matches!(ShardSpec::new(2, 2), Err(Error::Config(_))));
    }
}
