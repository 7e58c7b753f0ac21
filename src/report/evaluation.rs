//! Evaluation report export (`reports/evaluation.json`)

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::{ModelFamily, ModelParams};
use crate::pipeline::metrics::{roc_curve, EvaluationMetrics, RocPoint};
use crate::pipeline::search::TrialResult;

/// Metadata about the training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Timestamp of the run (RFC 3339)
    pub timestamp: String,
    pub oncorisk_version: String,
    pub bundle_id: String,
    pub model_family: ModelFamily,
    pub seed: u64,
    pub test_rows: usize,
}

/// Complete evaluation export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metadata: ReportMetadata,
    pub metrics: EvaluationMetrics,
    pub best_params: ModelParams,
    pub trials: Vec<TrialResult>,
    /// ROC curve on the test split, for external plotting
    pub roc_curve: Vec<RocPoint>,
}

/// Inputs of [`export_evaluation`]
pub struct EvaluationParams<'a> {
    pub bundle_id: &'a str,
    pub family: ModelFamily,
    pub seed: u64,
    pub probabilities: &'a [f64],
    pub labels: &'a [u8],
    pub metrics: &'a EvaluationMetrics,
    pub best_params: &'a ModelParams,
    pub trials: &'a [TrialResult],
}

/// Build the report and write it as pretty JSON, creating parent directories
pub fn export_evaluation(output_path: &Path, params: &EvaluationParams) -> Result<EvaluationReport> {
    let report = EvaluationReport {
        metadata: ReportMetadata {
            timestamp: Utc::now().to_rfc3339(),
            oncorisk_version: env!("CARGO_PKG_VERSION").to_string(),
            bundle_id: params.bundle_id.to_string(),
            model_family: params.family,
            seed: params.seed,
            test_rows: params.labels.len(),
        },
        metrics: params.metrics.clone(),
        best_params: params.best_params.clone(),
        trials: params.trials.to_vec(),
        roc_curve: roc_curve(params.probabilities, params.labels)
            .into_iter()
            // JSON has no infinity; the curve origin is reported at threshold 1.0
            .map(|p| RocPoint {
                threshold: if p.threshold.is_finite() { p.threshold } else { 1.0 },
                ..p
            })
            .collect(),
    };

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize evaluation report")?;
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write evaluation report: {}", output_path.display()))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoostingParams, DecisionPolicy};

    #[test]
    fn test_export_evaluation_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("evaluation.json");
        let probabilities = [0.9, 0.2, 0.7, 0.1];
        let labels = [1, 0, 1, 0];
        let metrics = EvaluationMetrics::compute(&probabilities, &labels, &DecisionPolicy::default());
        let params = ModelParams::Boosting(BoostingParams::default());

        let report = export_evaluation(
            &path,
            &EvaluationParams {
                bundle_id: "b-1",
                family: ModelFamily::Boosting,
                seed: 42,
                probabilities: &probabilities,
                labels: &labels,
                metrics: &metrics,
                best_params: &params,
                trials: &[],
            },
        )
        .unwrap();

        assert_eq!(report.roc_curve[0].threshold, 1.0);
        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["metadata"]["bundle_id"], "b-1");
        assert_eq!(value["metadata"]["model_family"], "boosting");
        assert_eq!(value["metrics"]["auc_roc"], 1.0);
        assert_eq!(value["best_params"]["family"], "boosting");
    }
}
