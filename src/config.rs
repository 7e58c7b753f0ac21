//! Training run configuration
//!
//! Every knob of a training run lives in [`PipelineConfig`]. Defaults reproduce
//! the standard four-source run; a JSON file can override any subset of fields
//! and the command line overrides the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{DecisionPolicy, FinalFitConfig, ModelFamily};
use crate::pipeline::harmonize::HarmonizerConfig;
use crate::pipeline::imbalance::SmoteConfig;
use crate::pipeline::search::SearchConfig;
use crate::pipeline::split::SplitConfig;

/// Base seed used by every stochastic stage unless overridden
pub const DEFAULT_SEED: u64 = 42;

/// Number of training rows persisted for local explanations
pub const DEFAULT_BACKGROUND_SIZE: usize = 5;

/// Permutations sampled per background row when explaining a prediction
pub const DEFAULT_EXPLAIN_PERMUTATIONS: usize = 8;

/// Complete configuration of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the raw source CSV files
    pub raw_dir: PathBuf,
    /// Root directory for processed data, model bundle and reports
    pub output_dir: PathBuf,
    /// Source files that must exist in `raw_dir`
    pub sources: Vec<String>,
    pub harmonizer: HarmonizerConfig,
    pub split: SplitConfig,
    pub smote: SmoteConfig,
    pub search: SearchConfig,
    pub final_fit: FinalFitConfig,
    pub model_family: ModelFamily,
    pub decision: DecisionPolicy,
    /// Rows kept as the explanation background sample
    pub background_size: usize,
    /// Permutations per background row used by the explainer at serving time
    pub explain_permutations: usize,
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            output_dir: PathBuf::from("."),
            sources: vec![
                "mendeley_blood_cancer.csv".to_string(),
                "cervical_cancer.csv".to_string(),
                "lung_cancer_air.csv".to_string(),
                "lung_cancer_risk.csv".to_string(),
            ],
            harmonizer: HarmonizerConfig::default(),
            split: SplitConfig::default(),
            smote: SmoteConfig::default(),
            search: SearchConfig::default(),
            final_fit: FinalFitConfig::default(),
            model_family: ModelFamily::default(),
            decision: DecisionPolicy::default(),
            background_size: DEFAULT_BACKGROUND_SIZE,
            explain_permutations: DEFAULT_EXPLAIN_PERMUTATIONS,
            seed: DEFAULT_SEED,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration file, filling unspecified fields with defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no stage can work with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.harmonizer.missing_threshold) {
            anyhow::bail!(
                "missing_threshold must be between 0.0 and 1.0, got {}",
                self.harmonizer.missing_threshold
            );
        }
        if !(0.0..1.0).contains(&self.split.test_ratio) || !(0.0..1.0).contains(&self.split.validation_ratio) {
            anyhow::bail!("split ratios must be in [0.0, 1.0)");
        }
        if self.smote.sampling_ratio <= 0.0 || self.smote.sampling_ratio > 1.0 {
            anyhow::bail!(
                "smote sampling_ratio must be in (0.0, 1.0], got {}",
                self.smote.sampling_ratio
            );
        }
        if self.search.trials == 0 {
            anyhow::bail!("search needs at least one trial");
        }
        let weights = [self.search.boosting.scale_pos_weight, self.search.mlp.positive_class_weight];
        if weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            anyhow::bail!("positive class weights must be positive, got {:?}", weights);
        }
        self.decision.validate()?;
        Ok(())
    }

    /// Directory for the harmonized + engineered table
    pub fn processed_dir(&self) -> PathBuf {
        self.output_dir.join("data").join("processed")
    }

    /// Directory holding the artifact bundle
    pub fn model_dir(&self) -> PathBuf {
        self.output_dir.join("model")
    }

    /// Directory for evaluation reports
    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join("reports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"seed": 7, "harmonizer": {"missing_threshold": 0.5}}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.harmonizer.missing_threshold, 0.5);
        assert_eq!(config.sources.len(), 4);
        assert_eq!(config.background_size, DEFAULT_BACKGROUND_SIZE);
        assert!(!config.harmonizer.positive_tokens.is_empty());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = PipelineConfig::default();
        config.harmonizer.missing_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_paths() {
        let config = PipelineConfig {
            output_dir: PathBuf::from("/tmp/run"),
            ..Default::default()
        };
        assert_eq!(config.model_dir(), PathBuf::from("/tmp/run/model"));
        assert_eq!(config.processed_dir(), PathBuf::from("/tmp/run/data/processed"));
    }
}
