//! Inference service over a loaded artifact bundle
//!
//! The service is built once: either Ready with an immutable bundle behind an
//! `Arc`, or NotReady with the reason loading failed. All operations take
//! `&self`, so one instance can be shared across request threads.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::explain::PermutationExplainer;
use crate::error::RiskError;
use crate::model::{Classifier, RiskLevel};
use crate::pipeline::export::ArtifactBundle;
use crate::pipeline::features::Filler;
use crate::pipeline::record::RawRecord;

/// Attributions at or below this magnitude are not reported
const MIN_ATTRIBUTION: f64 = 0.001;

/// Number of factors returned per prediction
const TOP_FACTORS: usize = 3;

/// Request-level failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("model not available: {0}")]
    NotReady(String),
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl ScoreError {
    /// Machine-readable status string
    pub fn status(&self) -> &'static str {
        match self {
            ScoreError::NotReady(_) => "not_available",
            ScoreError::BadRequest(_) => "bad_request",
        }
    }

    /// HTTP-equivalent status code
    pub fn code(&self) -> u16 {
        match self {
            ScoreError::NotReady(_) => 503,
            ScoreError::BadRequest(_) => 400,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            status: self.status().to_string(),
            error: self.to_string(),
        }
    }
}

impl From<RiskError> for ScoreError {
    fn from(e: RiskError) -> Self {
        match e {
            RiskError::BadRequest(msg) => ScoreError::BadRequest(msg),
            RiskError::NotReady(msg) => ScoreError::NotReady(msg),
            other => ScoreError::BadRequest(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub status: String,
    pub error: String,
}

/// One explained feature of a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub feature: String,
    /// Feature value before scaling
    pub value: f64,
    pub impact: String,
    pub shap_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub success: bool,
    /// Probability in percent, one decimal
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub top_factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Held-out metric snapshot recorded at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub auc_roc: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub precision: f64,
    pub pr_auc: f64,
}

enum ServiceState {
    Ready(Arc<ArtifactBundle>),
    NotReady { reason: String },
}

pub struct InferenceService {
    state: ServiceState,
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl InferenceService {
    /// Load the bundle in `dir`. Failure leaves the service NotReady instead of erroring.
    pub fn load(dir: &Path) -> Self {
        match ArtifactBundle::load(dir) {
            Ok(bundle) => {
                info!(bundle_id = %bundle.bundle_id, family = %bundle.model.family(), "model bundle loaded");
                Self::from_bundle(bundle)
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "model bundle unavailable");
                Self::not_ready(e.to_string())
            }
        }
    }

    pub fn from_bundle(bundle: ArtifactBundle) -> Self {
        Self {
            state: ServiceState::Ready(Arc::new(bundle)),
        }
    }

    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self {
            state: ServiceState::NotReady { reason: reason.into() },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ServiceState::Ready(_))
    }

    /// Loaded bundle, shared
    pub fn bundle(&self) -> Result<Arc<ArtifactBundle>, ScoreError> {
        match &self.state {
            ServiceState::Ready(bundle) => Ok(Arc::clone(bundle)),
            ServiceState::NotReady { reason } => Err(ScoreError::NotReady(reason.clone())),
        }
    }

    pub fn health(&self) -> HealthResponse {
        let status = if self.is_ready() { "ok" } else { "starting" };
        HealthResponse {
            status: status.to_string(),
        }
    }

    pub fn metrics(&self) -> Result<MetricsResponse, ScoreError> {
        let bundle = self.bundle()?;
        let m = &bundle.metadata.metrics;
        Ok(MetricsResponse {
            auc_roc: m.auc_roc,
            recall: m.recall,
            f1_score: m.f1_score,
            precision: m.precision,
            pr_auc: m.pr_auc,
        })
    }

    /// Score a flat JSON object of raw fields
    pub fn score(&self, payload: &Value) -> Result<ScoreResponse, ScoreError> {
        let bundle = self.bundle()?;
        let record = RawRecord::from_json(payload)?;
        Self::score_with(&bundle, record)
    }

    /// Score an already parsed record
    pub fn score_record(&self, record: RawRecord) -> Result<ScoreResponse, ScoreError> {
        let bundle = self.bundle()?;
        Self::score_with(&bundle, record)
    }

    fn score_with(bundle: &ArtifactBundle, mut record: RawRecord) -> Result<ScoreResponse, ScoreError> {
        record.engineer(&mut Filler::Zero);
        let row = bundle.preprocessing.apply_record(&record)?;
        let probability = bundle.model.predict_proba(&row);
        let risk_level = bundle.metadata.decision.risk_level(probability);

        let top_factors = Self::explain(bundle, &record, &row);
        debug!(probability, %risk_level, factors = top_factors.len(), "request scored");

        Ok(ScoreResponse {
            success: true,
            risk_score: round_to(probability * 100.0, 1),
            risk_level,
            top_factors,
        })
    }

    /// Top attributions; empty when no background is available or explanation fails
    fn explain(bundle: &ArtifactBundle, record: &RawRecord, row: &[f64]) -> Vec<RiskFactor> {
        let Some(background) = bundle.background.as_deref() else {
            return Vec::new();
        };
        let explainer = PermutationExplainer::new(
            &bundle.model,
            background,
            bundle.metadata.explain_permutations,
            bundle.metadata.seed,
        );
        let Some(phi) = explainer.shap_values(row) else {
            warn!("explanation unavailable for this request");
            return Vec::new();
        };

        let raw = bundle.preprocessing.raw_values(record);
        let mut ranked: Vec<usize> = (0..phi.len()).filter(|&i| phi[i].abs() > MIN_ATTRIBUTION).collect();
        ranked.sort_by(|&a, &b| phi[b].abs().total_cmp(&phi[a].abs()).then(a.cmp(&b)));

        ranked
            .into_iter()
            .take(TOP_FACTORS)
            .map(|i| RiskFactor {
                feature: bundle.feature_columns[i].clone(),
                value: round_to(raw.get(i).copied().unwrap_or(0.0), 3),
                impact: if phi[i] > 0.0 { "increases risk" } else { "decreases risk" }.to_string(),
                shap_value: round_to(phi[i], 4),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(37.46, 1), 37.5);
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(-1.23456, 3), -1.235);
    }

    #[test]
    fn test_not_ready_service() {
        let service = InferenceService::not_ready("no bundle");
        assert!(!service.is_ready());
        assert_eq!(service.health().status, "starting");
        let err = service.score(&json!({"age": 50})).unwrap_err();
        assert_eq!(err.status(), "not_available");
        assert_eq!(err.code(), 503);
        assert!(matches!(service.metrics(), Err(ScoreError::NotReady(_))));

        let response = err.to_response();
        assert!(!response.success);
        assert!(response.error.contains("no bundle"));
    }

    #[test]
    fn test_load_missing_dir_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let service = InferenceService::load(&dir.path().join("absent"));
        assert!(!service.is_ready());
    }

    #[test]
    fn test_risk_error_mapping() {
        let e: ScoreError = RiskError::BadRequest("x".to_string()).into();
        assert_eq!(e.code(), 400);
        let e: ScoreError = RiskError::NotReady("y".to_string()).into();
        assert_eq!(e.status(), "not_available");
    }
}
