//! Batch index planning
//!
//! The loaders here are synchronous: worker-count and pin-memory flags on
//! the data module configuration describe the external parallel-loading
//! collaborator and do not change how indices are planned.

use ndarray::Array1;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

/// Chunk `indices` into consecutive batches of `batch_size` (last batch may
/// be short).
pub(crate) fn chunk_batches(indices: &[usize], batch_size: usize) -> Vec<Vec<usize>> {
    assert!(batch_size > 0, "batch size must be > 0");
    indices
        .chunks(batch_size)
        .map(<[usize]>::to_vec)
        .collect()
}

/// Shuffled index batches.
pub(crate) fn shuffled_batches(n: usize, batch_size: usize, rng: &mut StdRng) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    chunk_batches(&indices, batch_size)
}

/// Sequential index batches, for validation and test loaders.
pub(crate) fn sequential_batches(n: usize, batch_size: usize) -> Vec<Vec<usize>> {
    let indices: Vec<usize> = (0..n).collect();
    chunk_batches(&indices, batch_size)
}

/// Stratified index batches: each batch's group composition approximates
/// the overall proportions of `groups`.
///
/// Members of each group are shuffled, then striped across batches so the
/// batches partition the dataset.
pub(crate) fn stratified_batches(
    groups: &Array1<i64>,
    batch_size: usize,
    rng: &mut StdRng,
) -> Vec<Vec<usize>> {
    assert!(batch_size > 0, "batch size must be > 0");
    let n = groups.len();
    let num_batches = n.div_ceil(batch_size);

    let mut by_group: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &g) in groups.iter().enumerate() {
        by_group.entry(g).or_default().push(i);
    }
    for members in by_group.values_mut() {
        members.shuffle(rng);
    }

    let mut batches: Vec<Vec<usize>> = vec![Vec::new(); num_batches];
    for members in by_group.values() {
        let ng = members.len();
        for (b, batch) in batches.iter_mut().enumerate() {
            let lo = b * ng / num_batches;
            let hi = (b + 1) * ng / num_batches;
            batch.extend_from_slice(&members[lo..hi]);
        }
    }
    batches.retain(|b| !b.is_empty());
    for batch in &mut batches {
        batch.shuffle(rng);
    }
    batches
}

/// Instance-weighted index batches: samples are drawn with replacement,
/// weighted inversely to their group's frequency, so rare groups are
/// over-sampled toward balance.
pub(crate) fn weighted_batches(
    groups: &Array1<i64>,
    batch_size: usize,
    rng: &mut StdRng,
) -> Vec<Vec<usize>> {
    assert!(batch_size > 0, "batch size must be > 0");
    let n = groups.len();

    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for &g in groups {
        *counts.entry(g).or_default() += 1;
    }
    let weights: Vec<f64> = groups
        .iter()
        .map(|g| 1.0 / counts[g] as f64)
        .collect();
    let dist = WeightedIndex::new(&weights).expect("group counts are positive");

    let drawn: Vec<usize> = (0..n).map(|_| dist.sample(rng)).collect();
    chunk_batches(&drawn, batch_size)
}
