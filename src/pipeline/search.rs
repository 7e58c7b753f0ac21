//! Seeded random hyperparameter search
//!
//! Trial `i` draws its parameters and trains with seed `base + i`, so the
//! sequential and rayon-parallel schedules produce identical trial lists.

use anyhow::{bail, Result};
use indicatif::ProgressBar;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::metrics::f1_at_threshold;
use crate::model::{
    Activation, BoostingParams, Classifier, DecisionPolicy, FinalFitConfig, MlpParams, Model, ModelFamily,
    ModelParams,
};

/// Search budget and the fixed part of every parameter draw
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub trials: usize,
    /// Epoch / estimator cap used while scoring trials
    pub trial_max_iter: usize,
    /// Evaluate trials on the rayon pool
    pub parallel: bool,
    /// Booster settings the search does not vary (class weight, regularization, sampling)
    pub boosting: BoostingParams,
    /// MLP settings the search does not vary (class weight, batch size, tolerance)
    pub mlp: MlpParams,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            trials: 15,
            trial_max_iter: 100,
            parallel: false,
            boosting: BoostingParams::imbalance_aware(),
            mlp: MlpParams::default(),
        }
    }
}

impl SearchConfig {
    /// Loss weight of positive rows in both families
    pub fn set_positive_weight(&mut self, weight: f64) {
        self.boosting.scale_pos_weight = weight;
        self.mlp.positive_class_weight = weight;
    }
}

/// One evaluated parameter draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial: usize,
    pub seed: u64,
    pub params: ModelParams,
    /// Positive-class F1 on the validation rows at the decision threshold
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub best: TrialResult,
    pub trials: Vec<TrialResult>,
}

fn log_uniform(rng: &mut ChaCha8Rng, low: f64, high: f64) -> f64 {
    rng.gen_range(low.ln()..=high.ln()).exp()
}

/// Draw one parameter set of `family` on top of the configured base settings
pub fn sample_params(family: ModelFamily, config: &SearchConfig, rng: &mut ChaCha8Rng) -> ModelParams {
    match family {
        ModelFamily::Mlp => {
            const HIDDEN: [&[usize]; 3] = [&[128, 64], &[256, 128, 64], &[64, 32]];
            const ACTIVATIONS: [Activation; 2] = [Activation::Relu, Activation::Tanh];
            let hidden = HIDDEN.choose(rng).copied().unwrap_or(HIDDEN[0]);
            let activation = ACTIVATIONS.choose(rng).copied().unwrap_or_default();
            ModelParams::Mlp(MlpParams {
                hidden_layers: hidden.to_vec(),
                activation,
                learning_rate_init: log_uniform(rng, 1e-4, 1e-2),
                alpha: log_uniform(rng, 1e-5, 1e-2),
                ..config.mlp.clone()
            })
        }
        ModelFamily::Boosting => {
            const DEPTHS: [usize; 3] = [2, 3, 4];
            const ESTIMATORS: [usize; 3] = [60, 120, 200];
            ModelParams::Boosting(BoostingParams {
                max_depth: DEPTHS.choose(rng).copied().unwrap_or(3),
                learning_rate: log_uniform(rng, 0.01, 0.3),
                reg_lambda: log_uniform(rng, 0.1, 10.0),
                n_estimators: ESTIMATORS.choose(rng).copied().unwrap_or(120),
                ..config.boosting.clone()
            })
        }
    }
}

/// Training and validation rows for the search
pub struct SearchData<'a> {
    pub train_rows: &'a [Vec<f64>],
    pub train_labels: &'a [u8],
    pub val_rows: &'a [Vec<f64>],
    pub val_labels: &'a [u8],
}

fn run_trial(
    trial: usize,
    family: ModelFamily,
    data: &SearchData<'_>,
    config: &SearchConfig,
    policy: &DecisionPolicy,
    base_seed: u64,
) -> Result<TrialResult> {
    let seed = base_seed.wrapping_add(trial as u64);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let params = sample_params(family, config, &mut rng);
    let model = Model::fit(
        &params,
        data.train_rows,
        data.train_labels,
        &FinalFitConfig::trial(config.trial_max_iter),
        seed,
    )?;
    let probabilities = model.predict_batch(data.val_rows);
    let score = f1_at_threshold(&probabilities, data.val_labels, policy.threshold);
    debug!(trial, seed, score, "search trial scored");
    Ok(TrialResult {
        trial,
        seed,
        params,
        score,
    })
}

/// Evaluate `config.trials` random draws and keep the best (earliest on ties)
pub fn random_search(
    family: ModelFamily,
    data: &SearchData<'_>,
    config: &SearchConfig,
    policy: &DecisionPolicy,
    seed: u64,
    progress: Option<&ProgressBar>,
) -> Result<SearchResult> {
    if config.trials == 0 {
        bail!("search needs at least one trial");
    }
    if data.val_rows.is_empty() {
        bail!("search needs at least one validation row");
    }

    let evaluate = |trial: usize| {
        let result = run_trial(trial, family, data, config, policy, seed);
        if let Some(pb) = progress {
            pb.inc(1);
        }
        result
    };
    let trials: Vec<TrialResult> = if config.parallel {
        (0..config.trials).into_par_iter().map(evaluate).collect::<Result<_>>()?
    } else {
        (0..config.trials).map(evaluate).collect::<Result<_>>()?
    };

    let best = trials
        .iter()
        .fold(None::<&TrialResult>, |best, t| match best {
            Some(b) if b.score >= t.score => Some(b),
            _ => Some(t),
        })
        .cloned();
    match best {
        Some(best) => Ok(SearchResult { best, trials }),
        None => bail!("search produced no trials"),
    }
}
