//! Scoring service: loads an artifact bundle and serves explained predictions

pub mod explain;
pub mod service;

pub use explain::PermutationExplainer;
pub use service::{
    ErrorResponse, HealthResponse, InferenceService, MetricsResponse, RiskFactor, ScoreError, ScoreResponse,
};
