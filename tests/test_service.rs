//! Tests for the inference service over a persisted bundle

#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;

use serde_json::json;

use oncorisk::model::RiskLevel;
use oncorisk::pipeline::export::{BACKGROUND_FILE, MODEL_FILE};
use oncorisk::serving::{InferenceService, ScoreError};

fn written_bundle(with_background: bool) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::TempDir::new().unwrap();
    let model_dir = dir.path().join("model");
    common::fitted_bundle(with_background).write(&model_dir).unwrap();
    (dir, model_dir)
}

#[test]
fn test_ready_service_scores_and_explains() {
    let (_dir, model_dir) = written_bundle(true);
    let service = InferenceService::load(&model_dir);
    assert!(service.is_ready());
    assert_eq!(service.health().status, "ok");

    let response = service.score(&common::high_risk_payload()).unwrap();
    assert!(response.success);
    assert!((0.0..=100.0).contains(&response.risk_score));
    assert!(response.top_factors.len() <= 3);

    let magnitudes: Vec<f64> = response.top_factors.iter().map(|f| f.shap_value.abs()).collect();
    assert!(magnitudes.windows(2).all(|w| w[0] >= w[1]));
    for factor in &response.top_factors {
        assert!(factor.shap_value.abs() > 0.0005);
        let expected = if factor.shap_value > 0.0 { "increases risk" } else { "decreases risk" };
        assert_eq!(factor.impact, expected);
    }
}

#[test]
fn test_risk_tiers_follow_the_model() {
    let (_dir, model_dir) = written_bundle(true);
    let service = InferenceService::load(&model_dir);

    let high = service.score(&common::high_risk_payload()).unwrap();
    let low = service.score(&common::low_risk_payload()).unwrap();

    assert_eq!(high.risk_level, RiskLevel::High);
    assert_eq!(low.risk_level, RiskLevel::Low);
    assert!(high.risk_score > low.risk_score);
}

#[test]
fn test_scores_are_deterministic() {
    let (_dir, model_dir) = written_bundle(true);
    let service = InferenceService::load(&model_dir);
    let a = service.score(&common::high_risk_payload()).unwrap();
    let b = service.score(&common::high_risk_payload()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_concurrent_scoring_shares_one_bundle() {
    let (_dir, model_dir) = written_bundle(true);
    let service = Arc::new(InferenceService::load(&model_dir));
    let expected = service.score(&common::high_risk_payload()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let payload = if i % 2 == 0 {
                    common::high_risk_payload()
                } else {
                    common::low_risk_payload()
                };
                (i, service.score(&payload).unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (i, response) = handle.join().unwrap();
        if i % 2 == 0 {
            assert_eq!(response, expected);
        } else {
            assert_eq!(response.risk_level, RiskLevel::Low);
        }
    }
}

#[test]
fn test_missing_background_disables_explanations() {
    let (_dir, model_dir) = written_bundle(false);
    assert!(!model_dir.join(BACKGROUND_FILE).exists());

    let service = InferenceService::load(&model_dir);
    assert!(service.is_ready());
    let response = service.score(&common::high_risk_payload()).unwrap();
    assert!(response.top_factors.is_empty());
    assert_eq!(response.risk_level, RiskLevel::High);
}

#[test]
fn test_mixed_bundle_is_not_ready() {
    let (_dir, model_dir) = written_bundle(true);
    let (_other_dir, other_model_dir) = written_bundle(true);
    std::fs::copy(other_model_dir.join(MODEL_FILE), model_dir.join(MODEL_FILE)).unwrap();

    let service = InferenceService::load(&model_dir);
    assert!(!service.is_ready());
    assert_eq!(service.health().status, "starting");

    let err = service.score(&common::high_risk_payload()).unwrap_err();
    assert_eq!(err.code(), 503);
    assert!(err.to_string().contains("artifact mismatch"));
}

#[test]
fn test_bad_requests() {
    let (_dir, model_dir) = written_bundle(true);
    let service = InferenceService::load(&model_dir);

    for payload in [json!([1, 2, 3]), json!({"age": [50]}), json!({"age": "old"})] {
        let err = service.score(&payload).unwrap_err();
        assert!(matches!(err, ScoreError::BadRequest(_)), "{:?}", payload);
        assert_eq!(err.code(), 400);
        assert_eq!(err.to_response().status, "bad_request");
    }
}

#[test]
fn test_sparse_request_still_scores() {
    let (_dir, model_dir) = written_bundle(true);
    let service = InferenceService::load(&model_dir);

    let response = service.score(&json!({})).unwrap();
    assert!(response.success);

    let with_nulls = service.score(&json!({"age": null, "sex": null, "unknown_field": "x"})).unwrap();
    assert!(with_nulls.success);
}

#[test]
fn test_metrics_snapshot() {
    let bundle = common::fitted_bundle(true);
    let recorded = bundle.metadata.metrics.clone();
    let service = InferenceService::from_bundle(bundle);

    let metrics = service.metrics().unwrap();
    assert_eq!(metrics.auc_roc, recorded.auc_roc);
    assert_eq!(metrics.recall, recorded.recall);
    assert_eq!(metrics.pr_auc, recorded.pr_auc);
}
