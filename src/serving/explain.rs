//! Local feature attributions by permutation sampling of Shapley values
//!
//! For each background row and each sampled feature ordering, features are
//! switched from the background value to the explained value one at a time;
//! each switch credits the change in predicted probability to that feature.
//! Attributions sum exactly to `f(row) - mean(f(background))`.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::model::Classifier;

/// Shapley estimator over a fixed background sample
pub struct PermutationExplainer<'a, C: Classifier + ?Sized> {
    model: &'a C,
    background: &'a [Vec<f64>],
    permutations: usize,
    seed: u64,
}

impl<'a, C: Classifier + ?Sized> PermutationExplainer<'a, C> {
    pub fn new(model: &'a C, background: &'a [Vec<f64>], permutations: usize, seed: u64) -> Self {
        Self {
            model,
            background,
            permutations: permutations.max(1),
            seed,
        }
    }

    /// Expected model output over the background
    pub fn expected_value(&self) -> f64 {
        if self.background.is_empty() {
            return 0.0;
        }
        self.background.iter().map(|b| self.model.predict_proba(b)).sum::<f64>() / self.background.len() as f64
    }

    /// One attribution per input column; `None` when there is no background
    /// or a row width disagrees with the model.
    pub fn shap_values(&self, row: &[f64]) -> Option<Vec<f64>> {
        let width = self.model.n_features();
        if self.background.is_empty() || row.len() != width || self.background.iter().any(|b| b.len() != width) {
            return None;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..width).collect();
        let mut phi = vec![0.0; width];
        let mut point = vec![0.0; width];

        for base in self.background {
            for _ in 0..self.permutations {
                order.shuffle(&mut rng);
                point.copy_from_slice(base);
                let mut previous = self.model.predict_proba(&point);
                for &j in &order {
                    point[j] = row[j];
                    let current = self.model.predict_proba(&point);
                    phi[j] += current - previous;
                    previous = current;
                }
            }
        }

        let samples = (self.background.len() * self.permutations) as f64;
        phi.iter_mut().for_each(|v| *v /= samples);
        Some(phi)
    }
}
