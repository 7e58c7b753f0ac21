//! Oncorisk command-line entry point

use anyhow::Result;
use clap::Parser;

use oncorisk::cli::{self, Cli};

fn main() -> Result<()> {
    cli::run(Cli::parse())
}
