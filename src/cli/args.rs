//! Command-line argument definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::model::ModelFamily;

/// Oncorisk - train and serve an explained cancer-risk model from blood-panel data
#[derive(Parser, Debug)]
#[command(name = "oncorisk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug-level logging for any subcommand
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full training pipeline and write a model bundle
    Train(TrainArgs),

    /// Score one JSON record against a model bundle and print the response
    Score {
        /// Directory holding the artifact bundle
        #[arg(long, default_value = "model")]
        model_dir: PathBuf,

        /// JSON file with one flat record; "-" or absent reads stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Report whether a model bundle is loadable
    Health {
        #[arg(long, default_value = "model")]
        model_dir: PathBuf,
    },

    /// Print the held-out metrics recorded in a model bundle
    Metrics {
        #[arg(long, default_value = "model")]
        model_dir: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory with the raw source CSV files
    #[arg(long)]
    pub raw_dir: Option<PathBuf>,

    /// Root for processed data, model bundle and reports
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Model family to search: "mlp" or "boosting"
    #[arg(long)]
    pub model_family: Option<ModelFamily>,

    /// Number of random-search trials
    #[arg(long, value_parser = validate_trials)]
    pub trials: Option<usize>,

    /// Base seed for every stochastic stage
    #[arg(long)]
    pub seed: Option<u64>,

    /// Loss weight of positive rows for either family (boosting defaults to 3.5)
    #[arg(long, value_parser = validate_weight)]
    pub positive_weight: Option<f64>,

    /// Evaluate search trials in parallel
    #[arg(long, default_value = "false")]
    pub parallel: bool,
}

impl TrainArgs {
    /// Load the configuration file (or defaults) and apply flag overrides
    pub fn to_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = &self.raw_dir {
            config.raw_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(family) = self.model_family {
            config.model_family = family;
        }
        if let Some(trials) = self.trials {
            config.search.trials = trials;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(weight) = self.positive_weight {
            config.search.set_positive_weight(weight);
        }
        if self.parallel {
            config.search.parallel = true;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Validator for the trials parameter
fn validate_trials(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid trial count", s))?;
    if value == 0 {
        Err("trials must be at least 1".to_string())
    } else {
        Ok(value)
    }
}

/// Validator for class weights
fn validate_weight(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err("weight must be greater than 0".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_overrides() {
        let cli = Cli::parse_from([
            "oncorisk",
            "train",
            "--raw-dir",
            "in",
            "--model-family",
            "boosting",
            "--trials",
            "3",
            "--seed",
            "7",
        ]);
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.raw_dir, PathBuf::from("in"));
        assert_eq!(config.model_family, ModelFamily::Boosting);
        assert_eq!(config.search.trials, 3);
        assert_eq!(config.seed, 7);
        assert!(!config.search.parallel);
        assert_eq!(config.search.boosting.scale_pos_weight, 3.5);
    }

    #[test]
    fn test_positive_weight_override() {
        let cli = Cli::parse_from(["oncorisk", "train", "--positive-weight", "2.5"]);
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.search.boosting.scale_pos_weight, 2.5);
        assert_eq!(config.search.mlp.positive_class_weight, 2.5);

        assert!(Cli::try_parse_from(["oncorisk", "train", "--positive-weight", "0"]).is_err());
        assert!(Cli::try_parse_from(["oncorisk", "train", "--positive-weight", "-1"]).is_err());
    }

    #[test]
    fn test_zero_trials_rejected() {
        assert!(Cli::try_parse_from(["oncorisk", "train", "--trials", "0"]).is_err());
        assert!(validate_trials("x").is_err());
    }

    #[test]
    fn test_unknown_family_rejected() {
        assert!(Cli::try_parse_from(["oncorisk", "train", "--model-family", "forest"]).is_err());
    }

    #[test]
    fn test_verbose_is_global() {
        assert!(Cli::parse_from(["oncorisk", "score", "--verbose"]).verbose);
        assert!(Cli::parse_from(["oncorisk", "-v", "health"]).verbose);
        assert!(Cli::parse_from(["oncorisk", "train", "-v", "--trials", "2"]).verbose);
        assert!(!Cli::parse_from(["oncorisk", "metrics"]).verbose);
    }

    #[test]
    fn test_score_defaults() {
        let cli = Cli::parse_from(["oncorisk", "score"]);
        match cli.command {
            Commands::Score { model_dir, input } => {
                assert_eq!(model_dir, PathBuf::from("model"));
                assert!(input.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
