//! Error taxonomy shared by the pipeline, the artifact bundle and the service

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for typed oncorisk operations
pub type RiskResult<T> = std::result::Result<T, RiskError>;

/// Errors with a distinct recovery policy.
///
/// Data-quality and degenerate-input problems (unparseable sources, undefined
/// medians, a minority class too small to oversample) never show up here:
/// they are recovered where they happen and logged as warnings.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Required raw source files are absent from the input directory
    #[error("missing required source file(s) in {dir}: {}", .files.join(", "))]
    MissingSources { dir: PathBuf, files: Vec<String> },

    /// A column the pipeline depends on is not in the table
    #[error("required column '{0}' not found")]
    MissingColumn(String),

    /// None of the configured sources could be loaded
    #[error("no source table could be loaded from {0}")]
    NoUsableSources(PathBuf),

    /// Persisted state and current inputs disagree on the feature layout
    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// A scoring payload could not be interpreted
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The service was asked to score before its artifacts loaded
    #[error("model not ready: {0}")]
    NotReady(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data frame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}
