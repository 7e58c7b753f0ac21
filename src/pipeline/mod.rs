//! Pipeline module - the training stages, leaves first

pub mod columns;
pub mod export;
pub mod features;
pub mod harmonize;
pub mod imbalance;
pub mod loader;
pub mod metrics;
pub mod missing;
pub mod preprocess;
pub mod record;
pub mod run;
pub mod schema;
pub mod search;
pub mod split;

pub use export::ArtifactBundle;
pub use features::{derive_features, engineer_table, Filler};
pub use harmonize::{harmonize_sources, HarmonizeReport, HarmonizerConfig};
pub use loader::*;
pub use missing::*;
pub use preprocess::{FeatureMatrix, PreprocessingState};
pub use record::{FieldValue, RawRecord};
pub use run::{run_training, TrainingOutcome};
pub use schema::{CanonicalSchema, TableSchema, OUTCOME_FIELD};
