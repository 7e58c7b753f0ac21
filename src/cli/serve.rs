//! `score`, `health` and `metrics` subcommands: thin wrappers over [`InferenceService`]

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::serving::InferenceService;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_payload(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file: {}", path.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            Ok(buf)
        }
    }
}

/// Score one record; the error response is printed before exiting non-zero
pub fn run_score(model_dir: &Path, input: Option<&Path>) -> Result<()> {
    let service = InferenceService::load(model_dir);
    let text = read_payload(input)?;
    let payload: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            let err = crate::serving::ScoreError::BadRequest(format!("malformed JSON: {}", e));
            print_json(&err.to_response())?;
            anyhow::bail!(err);
        }
    };

    match service.score(&payload) {
        Ok(response) => print_json(&response),
        Err(err) => {
            print_json(&err.to_response())?;
            Err(err.into())
        }
    }
}

pub fn run_health(model_dir: &Path) -> Result<()> {
    print_json(&InferenceService::load(model_dir).health())
}

pub fn run_metrics(model_dir: &Path) -> Result<()> {
    match InferenceService::load(model_dir).metrics() {
        Ok(metrics) => print_json(&metrics),
        Err(err) => {
            print_json(&err.to_response())?;
            Err(err.into())
        }
    }
}
