//! `train` subcommand

use std::time::Instant;

use anyhow::Result;
use console::style;

use super::args::TrainArgs;
use crate::pipeline::run_training;
use crate::utils::{print_banner, print_completion, print_config};

pub fn run_train(args: &TrainArgs) -> Result<()> {
    let config = args.to_config()?;

    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(&config);

    let start = Instant::now();
    let outcome = run_training(&config)?;
    outcome.summary.display();

    println!();
    println!(
        "    {}",
        style(format!("Total time: {:.2}s", start.elapsed().as_secs_f64())).dim()
    );
    print_completion(&outcome.model_dir);
    Ok(())
}
