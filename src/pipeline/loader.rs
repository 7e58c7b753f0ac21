//! Source table loading and processed table output

use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;

/// Rows scanned to infer CSV column types
const INFER_SCHEMA_LENGTH: usize = 10000;

/// Token some sources use for unknown values
const NULL_TOKEN: &str = "?";

/// Load a CSV source table, reading `?` cells as missing
pub fn load_source(path: &Path) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if extension != "csv" {
        anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv",
            extension
        );
    }

    let df = LazyCsvReader::new(path)
        .with_infer_schema_length(Some(INFER_SCHEMA_LENGTH))
        .with_null_values(Some(NullValues::AllColumnsSingle(NULL_TOKEN.into())))
        .finish()
        .with_context(|| format!("Failed to load CSV file: {}", path.display()))?
        .collect()
        .with_context(|| format!("Failed to parse CSV file: {}", path.display()))?;

    Ok(df)
}

/// Write a table to CSV, creating the parent directory when needed
pub fn save_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    CsvWriter::new(&mut file)
        .finish(df)
        .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
    Ok(())
}
