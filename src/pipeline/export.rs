//! Artifact bundle: everything the scoring service needs, written as one set
//!
//! Each JSON file wraps its payload together with the bundle id. The set is
//! staged in a sibling directory and swapped into place with renames, so a
//! reader never sees files from two different runs.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::imbalance::SmoteOutcome;
use super::metrics::EvaluationMetrics;
use super::preprocess::PreprocessingState;
use crate::error::{RiskError, RiskResult};
use crate::model::{Classifier, DecisionPolicy, Model, ModelFamily, ModelParams};

pub const METADATA_FILE: &str = "metadata.json";
pub const MODEL_FILE: &str = "model.json";
pub const PREPROCESSING_FILE: &str = "preprocessing.json";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";
pub const BACKGROUND_FILE: &str = "background.json";

/// Row counts and resampling decisions of the run that produced a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub validation_rows: usize,
    pub resampled_rows: usize,
    pub smote: SmoteOutcome,
    pub trials: usize,
    pub best_trial_score: f64,
}

/// Descriptive record of a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub created_at: String,
    pub version: String,
    pub model_family: ModelFamily,
    pub params: ModelParams,
    pub decision: DecisionPolicy,
    pub metrics: EvaluationMetrics,
    pub training: TrainingSummary,
    pub explain_permutations: usize,
    pub seed: u64,
}

/// A payload stamped with the id of the bundle it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stamped<T> {
    bundle_id: String,
    payload: T,
}

/// The complete artifact contract between training and serving
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    pub bundle_id: String,
    pub metadata: BundleMetadata,
    pub model: Model,
    pub preprocessing: PreprocessingState,
    pub feature_columns: Vec<String>,
    /// Scaled training rows used as the explanation reference; optional on load
    pub background: Option<Vec<Vec<f64>>>,
}

/// Fresh bundle id: creation time plus a random suffix
pub fn new_bundle_id() -> String {
    format!("{}-{:08x}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"), rand::random::<u32>())
}

fn write_json<T: Serialize>(path: &Path, bundle_id: &str, payload: &T) -> RiskResult<()> {
    let stamped = Stamped {
        bundle_id: bundle_id.to_string(),
        payload,
    };
    fs::write(path, serde_json::to_string_pretty(&stamped)?)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> RiskResult<Stamped<T>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn sibling(dir: &Path, tag: &str, bundle_id: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    dir.with_file_name(format!(".{}.{}-{}", name, tag, bundle_id))
}

impl ArtifactBundle {
    /// Write all files into `dir`, replacing any previous bundle as a whole
    pub fn write(&self, dir: &Path) -> RiskResult<()> {
        if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = sibling(dir, "staging", &self.bundle_id);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let id = &self.bundle_id;
        write_json(&staging.join(METADATA_FILE), id, &self.metadata)?;
        write_json(&staging.join(MODEL_FILE), id, &self.model)?;
        write_json(&staging.join(PREPROCESSING_FILE), id, &self.preprocessing)?;
        write_json(&staging.join(FEATURE_COLUMNS_FILE), id, &self.feature_columns)?;
        if let Some(background) = &self.background {
            write_json(&staging.join(BACKGROUND_FILE), id, background)?;
        }

        if dir.exists() {
            let previous = sibling(dir, "previous", id);
            fs::rename(dir, &previous)?;
            if let Err(e) = fs::rename(&staging, dir) {
                // Put the old bundle back before reporting
                fs::rename(&previous, dir)?;
                return Err(e.into());
            }
            fs::remove_dir_all(&previous)?;
        } else {
            fs::rename(&staging, dir)?;
        }
        debug!(bundle_id = %id, dir = %dir.display(), "artifact bundle written");
        Ok(())
    }

    /// Load and cross-check a bundle. A missing background file is tolerated.
    pub fn load(dir: &Path) -> RiskResult<Self> {
        let metadata: Stamped<BundleMetadata> = read_json(&dir.join(METADATA_FILE))?;
        let model: Stamped<Model> = read_json(&dir.join(MODEL_FILE))?;
        let preprocessing: Stamped<PreprocessingState> = read_json(&dir.join(PREPROCESSING_FILE))?;
        let feature_columns: Stamped<Vec<String>> = read_json(&dir.join(FEATURE_COLUMNS_FILE))?;

        let background_path = dir.join(BACKGROUND_FILE);
        let background: Option<Stamped<Vec<Vec<f64>>>> = if background_path.exists() {
            Some(read_json(&background_path)?)
        } else {
            warn!(dir = %dir.display(), "no background sample in bundle; explanations disabled");
            None
        };

        let bundle_id = metadata.bundle_id;
        let ids = [
            (MODEL_FILE, &model.bundle_id),
            (PREPROCESSING_FILE, &preprocessing.bundle_id),
            (FEATURE_COLUMNS_FILE, &feature_columns.bundle_id),
        ];
        let background_id = background.as_ref().map(|b| (BACKGROUND_FILE, &b.bundle_id));
        for (file, id) in ids.into_iter().chain(background_id) {
            if *id != bundle_id {
                return Err(RiskError::ArtifactMismatch(format!(
                    "{} belongs to bundle {}, metadata to {}",
                    file, id, bundle_id
                )));
            }
        }

        let bundle = Self {
            bundle_id,
            metadata: metadata.payload,
            model: model.payload,
            preprocessing: preprocessing.payload,
            feature_columns: feature_columns.payload,
            background: background.map(|b| b.payload),
        };
        bundle.check_shapes()?;
        Ok(bundle)
    }

    /// Column list, preprocessing output, model input and background width must agree
    pub fn check_shapes(&self) -> RiskResult<()> {
        self.preprocessing.ensure_columns(&self.feature_columns)?;
        let width = self.feature_columns.len();
        if self.model.n_features() != width {
            return Err(RiskError::ArtifactMismatch(format!(
                "model expects {} features, column list has {}",
                self.model.n_features(),
                width
            )));
        }
        if let Some(row) = self.background.iter().flatten().find(|r| r.len() != width) {
            return Err(RiskError::ArtifactMismatch(format!(
                "background row has {} values, expected {}",
                row.len(),
                width
            )));
        }
        Ok(())
    }
}
