//! Seeded stratified splitting

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Hold-out fractions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of all rows held out for the final evaluation
    pub test_ratio: f64,
    /// Fraction of the training split carved out to score search trials
    pub validation_ratio: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            validation_ratio: 0.2,
        }
    }
}

/// Row positions on either side of a split, each in ascending order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub holdout: Vec<usize>,
}

/// Split positions `0..labels.len()` so each class keeps its share in the hold-out.
///
/// Per class, `round(ratio * class_size)` rows are held out, but a class is
/// never emptied from the training side.
pub fn stratified_split(labels: &[u8], ratio: f64, seed: u64) -> SplitIndices {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut holdout = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);
        let n_holdout = ((ratio * members.len() as f64).round() as usize).min(members.len() - 1);
        holdout.extend_from_slice(&members[..n_holdout]);
        train.extend_from_slice(&members[n_holdout..]);
    }

    train.sort_unstable();
    holdout.sort_unstable();
    SplitIndices { train, holdout }
}

/// Pick `n` positions out of `0..len` without replacement, seeded
pub fn sample_indices(len: usize, n: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, len, n.min(len)).into_vec();
    picked.sort_unstable();
    picked
}
