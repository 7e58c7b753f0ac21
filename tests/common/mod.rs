//! Shared test utilities and fixture generators

#![allow(dead_code)]

use std::path::Path;

use polars::prelude::*;
use tempfile::TempDir;

use oncorisk::config::PipelineConfig;
use oncorisk::model::{BoostingParams, FinalFitConfig, Model, ModelFamily, ModelParams};
use oncorisk::pipeline::export::{new_bundle_id, ArtifactBundle, BundleMetadata, TrainingSummary};
use oncorisk::pipeline::imbalance::SmoteOutcome;
use oncorisk::pipeline::metrics::EvaluationMetrics;
use oncorisk::pipeline::run::outcome_labels;
use oncorisk::pipeline::{engineer_table, CanonicalSchema, Filler, PreprocessingState, TableSchema};

/// Blood panel source: canonical hematology columns and a leukemia-type outcome.
/// Every third row is a leukemia case with a high neutrophil share and low hemoglobin.
pub fn mendeley_csv() -> String {
    let mut csv = String::from(
        "Age,Sex,WBC_Count,Neutrophil_Pct,Lymphocyte_Pct,Platelet_Count,Hemoglobin,Cancer_Type\n",
    );
    for i in 0..60 {
        let sick = i % 3 == 0;
        let sex = if i % 2 == 0 { "Male" } else { "Female" };
        let wbc = 6000 + (i * 37) % 900;
        let (neut, lymph, hb, label) = if sick {
            (78 + i % 6, 12 + i % 4, 10.0 + (i % 5) as f64 * 0.3, "AML")
        } else {
            (55 + i % 8, 32 + i % 5, 14.0 + (i % 4) as f64 * 0.2, "Normal")
        };
        let platelets = 220 + (i * 13) % 150;
        csv.push_str(&format!(
            "{},{},{},{},{},{},{:.1},{}\n",
            30 + i,
            sex,
            wbc,
            neut,
            lymph,
            platelets,
            hb,
            label
        ));
    }
    csv
}

/// Cervical screening source with "?" placeholders for unknown values
pub fn cervical_csv() -> String {
    let mut csv = String::from("Age,Smokes (years),Dx:Cancer\n");
    for i in 0..40 {
        let smokes = if i % 7 == 0 { "?".to_string() } else { format!("{}", (i % 9) as f64 * 1.5) };
        csv.push_str(&format!("{},{},{}\n", 20 + i, smokes, u8::from(i % 5 == 0)));
    }
    csv
}

/// Air-quality source whose outcome is a Low/Medium/High level
pub fn lung_air_csv() -> String {
    let mut csv = String::from("Patient Id,Age,Gender,Air Pollution,Alcohol use,Level\n");
    for i in 0..40 {
        let level = match i % 4 {
            0 => "High",
            1 => "Medium",
            _ => "Low",
        };
        csv.push_str(&format!(
            "P{},{},{},{},{},{}\n",
            i,
            25 + i,
            1 + i % 2,
            1 + i % 8,
            1 + i % 5,
            level
        ));
    }
    csv
}

/// Survey source with a YES/NO outcome
pub fn lung_risk_csv() -> String {
    let mut csv = String::from("GENDER,AGE,SMOKING_STATUS,LUNG_CANCER\n");
    for i in 0..40 {
        let gender = if i % 3 == 0 { "M" } else { "F" };
        let outcome = if i % 2 == 0 { "YES" } else { "NO" };
        csv.push_str(&format!("{},{},{},{}\n", gender, 40 + i, 1 + i % 2, outcome));
    }
    csv
}

/// Write the four standard sources into `dir`
pub fn write_raw_sources(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("mendeley_blood_cancer.csv"), mendeley_csv()).unwrap();
    std::fs::write(dir.join("cervical_cancer.csv"), cervical_csv()).unwrap();
    std::fs::write(dir.join("lung_cancer_air.csv"), lung_air_csv()).unwrap();
    std::fs::write(dir.join("lung_cancer_risk.csv"), lung_risk_csv()).unwrap();
}

/// Temp workspace with `raw/` populated and an empty `out/`
pub fn create_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_raw_sources(&dir.path().join("raw"));
    dir
}

/// A configuration small enough for tests: few trials, short fits, boosting family
pub fn small_config(workspace: &Path) -> PipelineConfig {
    let mut config = PipelineConfig {
        raw_dir: workspace.join("raw"),
        output_dir: workspace.join("out"),
        model_family: ModelFamily::Boosting,
        ..Default::default()
    };
    config.search.trials = 3;
    config.search.trial_max_iter = 15;
    config.final_fit.max_iter = 30;
    config
}

/// Engineered blood-panel table with a clean NLR-driven outcome
pub fn hematology_dataframe(rows: usize) -> DataFrame {
    let sick: Vec<bool> = (0..rows).map(|i| i % 2 == 0).collect();
    let sex: Vec<&str> = (0..rows).map(|i| if i % 4 < 2 { "male" } else { "female" }).collect();
    let age: Vec<f64> = (0..rows).map(|i| 35.0 + (i % 30) as f64).collect();
    let wbc: Vec<f64> = (0..rows).map(|i| 6000.0 + ((i * 53) % 1000) as f64).collect();
    let neut: Vec<f64> = sick
        .iter()
        .enumerate()
        .map(|(i, &s)| (if s { 80.0 } else { 55.0 }) + (i % 3) as f64)
        .collect();
    let lymph: Vec<f64> = sick
        .iter()
        .enumerate()
        .map(|(i, &s)| (if s { 10.0 } else { 35.0 }) + (i % 3) as f64)
        .collect();
    let platelets: Vec<f64> = (0..rows).map(|i| 200.0 + ((i * 17) % 120) as f64).collect();
    let hb: Vec<f64> = sick.iter().map(|&s| if s { 10.5 } else { 14.5 }).collect();
    let outcome: Vec<i32> = sick.iter().map(|&s| i32::from(s)).collect();

    let df = DataFrame::new(vec![
        Column::new("age".into(), age),
        Column::new("sex".into(), sex),
        Column::new("wbc_count".into(), wbc),
        Column::new("neutrophil_pct".into(), neut),
        Column::new("lymphocyte_pct".into(), lymph),
        Column::new("platelet_count".into(), platelets),
        Column::new("hemoglobin".into(), hb),
        Column::new("cancer_risk".into(), outcome),
    ])
    .unwrap();
    engineer_table(&df, &mut Filler::Zero).unwrap()
}

/// Fit a boosting bundle directly on [`hematology_dataframe`], skipping the harmonizer
pub fn fitted_bundle(with_background: bool) -> ArtifactBundle {
    let df = hematology_dataframe(80);
    let labels = outcome_labels(&df).unwrap();
    let schema = TableSchema::infer(&df, &CanonicalSchema::default());
    let (preprocessing, matrix) = PreprocessingState::fit_transform(&df, &schema).unwrap();

    let params = ModelParams::Boosting(BoostingParams {
        n_estimators: 60,
        learning_rate: 0.3,
        subsample: 1.0,
        colsample: 1.0,
        ..Default::default()
    });
    let model = Model::fit(&params, &matrix.rows, &labels, &FinalFitConfig::trial(60), 7).unwrap();

    let probabilities: Vec<f64> = {
        use oncorisk::model::Classifier;
        model.predict_batch(&matrix.rows)
    };
    let config = PipelineConfig::default();
    let metrics = EvaluationMetrics::compute(&probabilities, &labels, &config.decision);

    ArtifactBundle {
        bundle_id: new_bundle_id(),
        metadata: BundleMetadata {
            created_at: "2026-01-01T00:00:00Z".to_string(),
            version: "test".to_string(),
            model_family: ModelFamily::Boosting,
            params,
            decision: config.decision,
            metrics,
            training: TrainingSummary {
                total_rows: labels.len(),
                train_rows: labels.len(),
                test_rows: 0,
                validation_rows: 0,
                resampled_rows: labels.len(),
                smote: SmoteOutcome::AlreadyBalanced,
                trials: 1,
                best_trial_score: 1.0,
            },
            explain_permutations: 6,
            seed: 7,
        },
        model,
        feature_columns: preprocessing.feature_columns.clone(),
        preprocessing,
        background: with_background.then(|| matrix.rows.iter().step_by(16).cloned().collect()),
    }
}

/// A clearly high-risk request: neutrophil-dominated differential and anemia
pub fn high_risk_payload() -> serde_json::Value {
    serde_json::json!({
        "age": 50,
        "sex": "male",
        "wbc_count": 6500,
        "neutrophil_pct": 81,
        "lymphocyte_pct": 10,
        "platelet_count": 250,
        "hemoglobin": 10.5
    })
}

/// A clearly low-risk request
pub fn low_risk_payload() -> serde_json::Value {
    serde_json::json!({
        "age": 50,
        "sex": "male",
        "wbc_count": 6500,
        "neutrophil_pct": 56,
        "lymphocyte_pct": 36,
        "platelet_count": 250,
        "hemoglobin": 14.5
    })
}
