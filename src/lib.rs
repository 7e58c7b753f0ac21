//! Oncorisk: cancer-risk pipeline and scoring service
//!
//! Harmonizes heterogeneous clinical tables, engineers hematology features,
//! trains a threshold-calibrated classifier on leakage-safe preprocessed data
//! and serves explained predictions from a versioned artifact bundle.

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod serving;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{RiskError, RiskResult};
pub use serving::InferenceService;
