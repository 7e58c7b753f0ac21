//! End-to-end training run: harmonize, engineer, split, preprocess, resample,
//! search, fit, evaluate and export.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::{info, warn};

use super::columns::{numeric_values, take_rows};
use super::export::{new_bundle_id, ArtifactBundle, BundleMetadata, TrainingSummary};
use super::features::{engineer_table, Filler};
use super::harmonize::{harmonize_sources, HarmonizeReport};
use super::imbalance::{smote, SmoteOutcome};
use super::loader::save_table;
use super::metrics::EvaluationMetrics;
use super::preprocess::{FeatureMatrix, PreprocessingState};
use super::schema::{CanonicalSchema, TableSchema, OUTCOME_FIELD};
use super::search::{random_search, SearchData, SearchResult};
use super::split::{sample_indices, stratified_split};
use crate::config::PipelineConfig;
use crate::model::{Classifier, Model};
use crate::report::{export_evaluation, EvaluationParams, RunSummary};
use crate::utils::{
    create_spinner, create_trial_bar, finish_with_success, finish_with_warning, print_count, print_info,
    print_step_header, print_step_time, print_success, print_warning,
};

/// File name of the harmonized, engineered table under the processed directory
pub const PROCESSED_FILE: &str = "cleaned_plco_mirrored_data.csv";

/// File name of the evaluation report under the reports directory
pub const EVALUATION_FILE: &str = "evaluation.json";

/// Everything a finished run produced
#[derive(Debug)]
pub struct TrainingOutcome {
    pub bundle: ArtifactBundle,
    pub harmonize: HarmonizeReport,
    pub search: SearchResult,
    pub summary: RunSummary,
    pub processed_path: PathBuf,
    pub model_dir: PathBuf,
    pub report_path: PathBuf,
}

/// Binary labels of the outcome column; anything but 1 counts as negative
pub fn outcome_labels(df: &DataFrame) -> Result<Vec<u8>> {
    Ok(numeric_values(df, OUTCOME_FIELD)?
        .into_iter()
        .map(|v| u8::from(v == Some(1.0)))
        .collect())
}

fn select_rows(matrix: &FeatureMatrix, labels: &[u8], indices: &[usize]) -> (Vec<Vec<f64>>, Vec<u8>) {
    (
        indices.iter().map(|&i| matrix.rows[i].clone()).collect(),
        indices.iter().map(|&i| labels[i]).collect(),
    )
}

fn report_smote(outcome: &SmoteOutcome) {
    match outcome {
        SmoteOutcome::Applied { synthesized, k, .. } => {
            print_success(&format!("SMOTE added {} synthetic rows (k={})", synthesized, k))
        }
        SmoteOutcome::AlreadyBalanced => print_info("Classes already balanced, no resampling"),
        SmoteOutcome::Skipped { minority_size, .. } => print_warning(&format!(
            "Minority class has {} row(s); resampling skipped",
            minority_size
        )),
    }
}

/// Run every training stage in order and write the artifact bundle
pub fn run_training(config: &PipelineConfig) -> Result<TrainingOutcome> {
    config.validate()?;
    let canonical = CanonicalSchema::default();
    let seed = config.seed;

    // Step 1: harmonize sources
    print_step_header(1, "Harmonizing Sources");
    let step_start = Instant::now();
    let spinner = create_spinner("Loading and harmonizing source tables...");
    let (harmonized, harmonize) =
        harmonize_sources(&config.raw_dir, &config.sources, &canonical, &config.harmonizer, seed)?;
    finish_with_success(
        &spinner,
        &format!("Harmonized {} rows x {} columns", harmonized.height(), harmonized.width()),
    );
    for source in &harmonize.sources {
        print_count(
            &format!("rows from {}", source.name),
            source.rows_kept,
            Some(format!("({} positive)", source.positives).as_str()),
        );
    }
    for warning in &harmonize.warnings {
        print_warning(warning);
    }
    if !harmonize.dropped_columns.is_empty() {
        print_count("columns dropped for missingness", harmonize.dropped_columns.len(), None);
    }
    print_step_time(step_start.elapsed());

    // Step 2: feature engineering
    print_step_header(2, "Engineering Features");
    let step_start = Instant::now();
    let mut engineered = engineer_table(&harmonized, &mut Filler::training(seed))?;
    let processed_path = config.processed_dir().join(PROCESSED_FILE);
    save_table(&mut engineered, &processed_path)?;
    print_success(&format!("Processed table saved to {}", processed_path.display()));
    print_step_time(step_start.elapsed());

    // Step 3: split and preprocess
    print_step_header(3, "Splitting & Preprocessing");
    let step_start = Instant::now();
    let labels = outcome_labels(&engineered)?;
    let split = stratified_split(&labels, config.split.test_ratio, seed);
    if split.holdout.is_empty() {
        anyhow::bail!("test split is empty; {} rows are too few to evaluate", labels.len());
    }
    let train_df = take_rows(&engineered, &split.train)?;
    let test_df = take_rows(&engineered, &split.holdout)?;
    let train_labels: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
    let test_labels: Vec<u8> = split.holdout.iter().map(|&i| labels[i]).collect();

    let table_schema = TableSchema::infer(&train_df, &canonical);
    let (preprocessing, train_matrix) = PreprocessingState::fit_transform(&train_df, &table_schema)
        .context("Failed to fit preprocessing on the training split")?;
    let test_matrix = preprocessing.apply(&test_df)?;
    print_count("training rows", train_matrix.n_rows(), None);
    print_count("test rows", test_matrix.n_rows(), None);
    print_count("model features", preprocessing.n_features(), None);
    print_step_time(step_start.elapsed());

    // Step 4: hyperparameter search on a validation carve-out
    print_step_header(4, "Hyperparameter Search");
    let step_start = Instant::now();
    let carve = stratified_split(&train_labels, config.split.validation_ratio, seed.wrapping_add(1));
    let (sub_rows, sub_labels) = select_rows(&train_matrix, &train_labels, &carve.train);
    let (val_rows, val_labels) = select_rows(&train_matrix, &train_labels, &carve.holdout);
    let search_train = smote(&sub_rows, &sub_labels, &config.smote, seed);
    report_smote(&search_train.outcome);

    let bar = create_trial_bar(config.search.trials as u64, &format!("Searching {}", config.model_family));
    let search = random_search(
        config.model_family,
        &SearchData {
            train_rows: &search_train.rows,
            train_labels: &search_train.labels,
            val_rows: &val_rows,
            val_labels: &val_labels,
        },
        &config.search,
        &config.decision,
        seed,
        Some(&bar),
    )?;
    if search.best.score > 0.0 {
        finish_with_success(
            &bar,
            &format!("Best trial {} (F1 {:.4})", search.best.trial, search.best.score),
        );
    } else {
        finish_with_warning(&bar, "No trial found a positive row; keeping trial 0");
    }
    print_step_time(step_start.elapsed());

    // Step 5: final fit on the resampled training split
    print_step_header(5, "Final Fit");
    let step_start = Instant::now();
    let final_train = smote(&train_matrix.rows, &train_labels, &config.smote, seed);
    report_smote(&final_train.outcome);
    let spinner = create_spinner("Training final model...");
    let model = Model::fit(
        &search.best.params,
        &final_train.rows,
        &final_train.labels,
        &config.final_fit,
        seed,
    )?;
    finish_with_success(&spinner, &format!("Trained final {} model", model.family()));
    print_step_time(step_start.elapsed());

    // Step 6: evaluate and export
    print_step_header(6, "Evaluation & Export");
    let step_start = Instant::now();
    let probabilities = model.predict_batch(&test_matrix.rows);
    let metrics = EvaluationMetrics::compute(&probabilities, &test_labels, &config.decision);
    if test_labels.iter().all(|&l| l == 0) {
        warn!("test split has no positive rows; ROC-AUC is reported as 0.5");
    }

    let background_idx = sample_indices(train_matrix.n_rows(), config.background_size, seed);
    let background: Vec<Vec<f64>> = background_idx.iter().map(|&i| train_matrix.rows[i].clone()).collect();

    let bundle_id = new_bundle_id();
    let bundle = ArtifactBundle {
        bundle_id: bundle_id.clone(),
        metadata: BundleMetadata {
            created_at: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model_family: model.family(),
            params: search.best.params.clone(),
            decision: config.decision.clone(),
            metrics: metrics.clone(),
            training: TrainingSummary {
                total_rows: labels.len(),
                train_rows: train_labels.len(),
                test_rows: test_labels.len(),
                validation_rows: val_labels.len(),
                resampled_rows: final_train.rows.len(),
                smote: final_train.outcome.clone(),
                trials: search.trials.len(),
                best_trial_score: search.best.score,
            },
            explain_permutations: config.explain_permutations,
            seed,
        },
        model,
        feature_columns: preprocessing.feature_columns.clone(),
        preprocessing,
        background: (!background.is_empty()).then_some(background),
    };
    bundle.check_shapes()?;

    let model_dir = config.model_dir();
    bundle
        .write(&model_dir)
        .with_context(|| format!("Failed to write artifact bundle to {}", model_dir.display()))?;
    print_success(&format!("Bundle {} written to {}", bundle_id, model_dir.display()));

    let report_path = config.reports_dir().join(EVALUATION_FILE);
    export_evaluation(
        &report_path,
        &EvaluationParams {
            bundle_id: &bundle_id,
            family: config.model_family,
            seed,
            probabilities: &probabilities,
            labels: &test_labels,
            metrics: &metrics,
            best_params: &search.best.params,
            trials: &search.trials,
        },
    )?;
    print_success(&format!("Evaluation report saved to {}", report_path.display()));
    print_step_time(step_start.elapsed());

    info!(
        bundle_id = %bundle_id,
        auc_roc = metrics.auc_roc,
        f1 = metrics.f1_score,
        "training run complete"
    );

    let summary = RunSummary {
        harmonized_rows: harmonized.height(),
        dropped_columns: harmonize.dropped_columns.clone(),
        feature_count: bundle.feature_columns.len(),
        smote: final_train.outcome,
        family: config.model_family,
        best_trial_score: search.best.score,
        metrics,
    };

    Ok(TrainingOutcome {
        bundle,
        harmonize,
        search,
        summary,
        processed_path,
        model_dir,
        report_path,
    })
}
