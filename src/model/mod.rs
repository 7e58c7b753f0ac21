//! Model families, their hyperparameters and the decision policy
//!
//! Both families map a fixed-length scaled feature vector to P(class 1). They
//! are serialized as a tagged [`Model`] enum in the artifact bundle.

pub mod boosting;
pub mod mlp;

use anyhow::{bail, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pipeline::split::stratified_split;

pub use boosting::{BoostingParams, GradientBoostedTrees};
pub use mlp::{Activation, MlpClassifier, MlpParams};

/// Anything that produces a positive-class probability for one scaled row
pub trait Classifier {
    /// Probability of the positive class
    fn predict_proba(&self, row: &[f64]) -> f64;

    /// Expected input width
    fn n_features(&self) -> usize;

    /// Probabilities for many rows, in input order
    fn predict_batch(&self, rows: &[Vec<f64>]) -> Vec<f64>
    where
        Self: Sync,
    {
        rows.par_iter().map(|row| self.predict_proba(row)).collect()
    }
}

/// Which model family a training run searches over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    #[default]
    Mlp,
    Boosting,
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFamily::Mlp => write!(f, "mlp"),
            ModelFamily::Boosting => write!(f, "boosting"),
        }
    }
}

impl std::str::FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mlp" => Ok(ModelFamily::Mlp),
            "boosting" | "xgboost" | "gbdt" => Ok(ModelFamily::Boosting),
            _ => Err(format!("Unknown model family: '{}'. Use 'mlp' or 'boosting'.", s)),
        }
    }
}

/// Hyperparameters of either family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum ModelParams {
    Boosting(BoostingParams),
    Mlp(MlpParams),
}

impl ModelParams {
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelParams::Boosting(_) => ModelFamily::Boosting,
            ModelParams::Mlp(_) => ModelFamily::Mlp,
        }
    }

    /// Cap on boosting rounds or training epochs
    pub fn with_max_iter(&self, max_iter: usize) -> Self {
        match self {
            ModelParams::Boosting(p) => ModelParams::Boosting(BoostingParams {
                n_estimators: p.n_estimators.min(max_iter),
                ..p.clone()
            }),
            ModelParams::Mlp(p) => ModelParams::Mlp(MlpParams {
                max_iter,
                ..p.clone()
            }),
        }
    }
}

/// Early stopping and iteration budget of a fit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalFitConfig {
    pub max_iter: usize,
    pub early_stopping: bool,
    /// Fraction of the fit rows held out to monitor early stopping
    pub validation_fraction: f64,
    /// Rounds without validation improvement before stopping
    pub n_iter_no_change: usize,
}

impl Default for FinalFitConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            early_stopping: true,
            validation_fraction: 0.1,
            n_iter_no_change: 10,
        }
    }
}

impl FinalFitConfig {
    /// Single-shot fit used by search trials
    pub fn trial(max_iter: usize) -> Self {
        Self {
            max_iter,
            early_stopping: false,
            ..Default::default()
        }
    }
}

/// Held-out rows a fitter monitors for early stopping
pub struct Monitor<'a> {
    pub rows: Vec<&'a [f64]>,
    pub labels: Vec<u8>,
    pub patience: usize,
}

/// A trained model of either family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Model {
    Boosting(GradientBoostedTrees),
    Mlp(MlpClassifier),
}

impl Model {
    pub fn family(&self) -> ModelFamily {
        match self {
            Model::Boosting(_) => ModelFamily::Boosting,
            Model::Mlp(_) => ModelFamily::Mlp,
        }
    }

    /// Train a model with `params`, optionally stopping early on a stratified carve-out
    pub fn fit(
        params: &ModelParams,
        rows: &[Vec<f64>],
        labels: &[u8],
        fit: &FinalFitConfig,
        seed: u64,
    ) -> Result<Self> {
        if rows.is_empty() {
            bail!("cannot fit a model on an empty training set");
        }
        if rows.len() != labels.len() {
            bail!("{} rows but {} labels", rows.len(), labels.len());
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            bail!("training rows have inconsistent widths");
        }

        let params = params.with_max_iter(fit.max_iter);
        let carve = if fit.early_stopping && fit.validation_fraction > 0.0 {
            let split = stratified_split(labels, fit.validation_fraction, seed);
            (!split.holdout.is_empty()).then_some(split)
        } else {
            None
        };

        let (fit_rows, fit_labels, monitor): (Vec<&[f64]>, Vec<u8>, Option<Monitor>) = match carve {
            Some(split) => (
                split.train.iter().map(|&i| rows[i].as_slice()).collect(),
                split.train.iter().map(|&i| labels[i]).collect(),
                Some(Monitor {
                    rows: split.holdout.iter().map(|&i| rows[i].as_slice()).collect(),
                    labels: split.holdout.iter().map(|&i| labels[i]).collect(),
                    patience: fit.n_iter_no_change.max(1),
                }),
            ),
            None => (rows.iter().map(Vec::as_slice).collect(), labels.to_vec(), None),
        };

        Ok(match &params {
            ModelParams::Boosting(p) => {
                Model::Boosting(GradientBoostedTrees::fit(p, &fit_rows, &fit_labels, monitor.as_ref(), seed))
            }
            ModelParams::Mlp(p) => {
                Model::Mlp(MlpClassifier::fit(p, &fit_rows, &fit_labels, monitor.as_ref(), seed))
            }
        })
    }
}

impl Classifier for Model {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        match self {
            Model::Boosting(m) => m.predict_proba(row),
            Model::Mlp(m) => m.predict_proba(row),
        }
    }

    fn n_features(&self) -> usize {
        match self {
            Model::Boosting(m) => m.n_features(),
            Model::Mlp(m) => m.n_features(),
        }
    }

    fn predict_batch(&self, rows: &[Vec<f64>]) -> Vec<f64>
    where
        Self: Sync,
    {
        match self {
            Model::Boosting(m) => m.predict_batch(rows),
            Model::Mlp(m) => m.predict_batch(rows),
        }
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Mean binary cross-entropy of probabilities against labels
pub(crate) fn log_loss(probs: &[f64], labels: &[u8]) -> f64 {
    let eps = 1e-15;
    let total: f64 = probs
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = p.clamp(eps, 1.0 - eps);
            if y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / probs.len().max(1) as f64
}

// ============================================================================
// Decision policy
// ============================================================================

/// Coarse risk tier reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
        }
    }
}

/// Classification threshold and tier cutoffs, stored once in the bundle metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    /// Probability at or above which a row is classified positive
    pub threshold: f64,
    pub medium_cutoff: f64,
    pub high_cutoff: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.30,
            medium_cutoff: 0.20,
            high_cutoff: 0.35,
        }
    }
}

impl DecisionPolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("threshold", self.threshold),
            ("medium_cutoff", self.medium_cutoff),
            ("high_cutoff", self.high_cutoff),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be between 0.0 and 1.0, got {}", name, value);
            }
        }
        if self.medium_cutoff > self.high_cutoff {
            bail!(
                "medium_cutoff ({}) must not exceed high_cutoff ({})",
                self.medium_cutoff,
                self.high_cutoff
            );
        }
        Ok(())
    }

    /// Hard label at the decision threshold
    pub fn classify(&self, probability: f64) -> u8 {
        u8::from(probability >= self.threshold)
    }

    pub fn risk_level(&self, probability: f64) -> RiskLevel {
        if probability >= self.high_cutoff {
            RiskLevel::High
        } else if probability >= self.medium_cutoff {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}
