//! CLI module - argument parsing and subcommand runners

pub mod args;
pub mod serve;
pub mod train;

pub use args::{Cli, Commands, TrainArgs};

use anyhow::Result;

use crate::utils::setup_logging;

/// Install logging at the requested level and dispatch a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.verbose);
    match cli.command {
        Commands::Train(args) => train::run_train(&args),
        Commands::Score { model_dir, input } => serve::run_score(&model_dir, input.as_deref()),
        Commands::Health { model_dir } => serve::run_health(&model_dir),
        Commands::Metrics { model_dir } => serve::run_metrics(&model_dir),
    }
}
