//! Synthetic minority oversampling (SMOTE) for the training split
//!
//! Only ever called on training rows. Validation, test and inference data
//! are never resampled.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Oversampling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoteConfig {
    /// Upper bound on neighbours considered per minority point
    pub k_neighbors: usize,
    /// Desired minority/majority ratio after resampling; 1.0 equalizes classes
    pub sampling_ratio: f64,
}

impl Default for SmoteConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 5,
            sampling_ratio: 1.0,
        }
    }
}

/// What the corrector did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SmoteOutcome {
    /// `synthesized` new minority rows were appended using `k` neighbours
    Applied { minority_class: u8, synthesized: usize, k: usize },
    /// Minority already at or above the target ratio
    AlreadyBalanced,
    /// Too few minority rows to interpolate between
    Skipped { minority_class: u8, minority_size: usize },
}

/// Resampled training data
#[derive(Debug, Clone)]
pub struct Resampled {
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    pub outcome: SmoteOutcome,
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Indices (into `points`) of the `k` nearest other points of each point
pub fn nearest_neighbors(points: &[&[f64]], k: usize) -> Vec<Vec<usize>> {
    points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let mut distances: Vec<(usize, f64)> = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, q)| (j, squared_distance(p, q)))
                .collect();
            distances.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            distances.into_iter().take(k).map(|(j, _)| j).collect()
        })
        .collect()
}

/// Oversample the minority class of a binary training set.
///
/// Each synthetic row lies on the segment between a random minority row and
/// one of its `k` nearest minority neighbours, where `k` is capped at
/// `minority_size - 1`. A minority of one row or fewer is returned unchanged.
pub fn smote(rows: &[Vec<f64>], labels: &[u8], config: &SmoteConfig, seed: u64) -> Resampled {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    let (minority_class, minority_size, majority_size) = if positives <= negatives {
        (1u8, positives, negatives)
    } else {
        (0u8, negatives, positives)
    };

    let unchanged = |outcome| Resampled {
        rows: rows.to_vec(),
        labels: labels.to_vec(),
        outcome,
    };

    let target = (config.sampling_ratio * majority_size as f64).ceil() as usize;
    if minority_size >= target {
        return unchanged(SmoteOutcome::AlreadyBalanced);
    }
    if minority_size <= 1 {
        warn!(
            minority_class,
            minority_size, "minority class too small for oversampling; training on the original split"
        );
        return unchanged(SmoteOutcome::Skipped {
            minority_class,
            minority_size,
        });
    }

    let k = config.k_neighbors.min(minority_size - 1).max(1);
    let minority: Vec<&[f64]> = rows
        .iter()
        .zip(labels)
        .filter(|(_, &l)| l == minority_class)
        .map(|(r, _)| r.as_slice())
        .collect();
    let neighbors = nearest_neighbors(&minority, k);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let synthesized = target - minority_size;
    let mut out_rows = rows.to_vec();
    let mut out_labels = labels.to_vec();
    out_rows.reserve(synthesized);
    out_labels.reserve(synthesized);

    for _ in 0..synthesized {
        let base = rng.gen_range(0..minority.len());
        let neighbor = neighbors[base][rng.gen_range(0..neighbors[base].len())];
        let gap: f64 = rng.gen();
        let point: Vec<f64> = minority[base]
            .iter()
            .zip(minority[neighbor])
            .map(|(a, b)| a + gap * (b - a))
            .collect();
        out_rows.push(point);
        out_labels.push(minority_class);
    }

    debug!(synthesized, k, "SMOTE resampling complete");
    Resampled {
        rows: out_rows,
        labels: out_labels,
        outcome: SmoteOutcome::Applied {
            minority_class,
            synthesized,
            k,
        },
    }
}
