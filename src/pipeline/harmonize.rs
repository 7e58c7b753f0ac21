//! Schema harmonization across heterogeneous source tables
//!
//! Each source is loaded, its column names normalized, its outcome column
//! detected and binarized, and then all sources are merged onto the canonical
//! schema. Sources that fail to parse are skipped with a warning; only missing
//! files are fatal.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::columns::{column_to_f64_vec, column_to_string_vec, format_number, take_rows};
use super::loader::load_source;
use super::missing::{analyze_missing_values, get_features_above_threshold};
use super::schema::{CanonicalSchema, FieldType};
use crate::error::RiskError;

/// Tolerance for floating point comparison when checking binary 0/1 values
const TOLERANCE: f64 = 1e-9;

/// Size cap for sources known to be dominated by one class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsampleRule {
    /// Substring of the source file name the rule applies to
    pub source_pattern: String,
    /// The rule fires only when the source has more rows than this
    pub max_rows: usize,
    /// Rows kept after sampling
    pub sample_rows: usize,
}

/// Dataset-specific harmonization vocabulary and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonizerConfig {
    /// Substrings identifying the outcome column; the first matching column wins
    pub target_candidates: Vec<String>,
    /// Lowercase tokens mapped to the positive class
    pub positive_tokens: Vec<String>,
    /// Non-canonical columns missing above this ratio are dropped
    pub missing_threshold: f64,
    pub subsample_rules: Vec<SubsampleRule>,
    pub drop_duplicates: bool,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            target_candidates: owned(&[
                "cancer_risk",
                "risk_factor",
                "biopsy",
                "lung_cancer",
                "cancer_type",
                "dx_cancer",
                "level",
            ]),
            positive_tokens: owned(&[
                "yes",
                "high",
                "positive",
                "1",
                "aml",
                "all",
                "cll",
                "cml",
                "lymphoma",
                "multiple myeloma",
                "nsclc",
                "sclc",
            ]),
            missing_threshold: 0.40,
            subsample_rules: vec![SubsampleRule {
                source_pattern: "lung_cancer_risk".to_string(),
                max_rows: 5000,
                sample_rows: 1000,
            }],
            drop_duplicates: true,
        }
    }
}

/// How a source obtained its outcome column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TargetSource {
    /// Renamed from this normalized column
    Detected(String),
    /// No candidate column; every row is negative
    Defaulted,
}

/// Per-source harmonization outcome
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub rows_loaded: usize,
    pub rows_kept: usize,
    pub target: TargetSource,
    pub positives: usize,
}

/// Everything the harmonizer decided while building the merged table
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarmonizeReport {
    pub sources: Vec<SourceSummary>,
    pub warnings: Vec<String>,
    pub added_columns: Vec<String>,
    pub dropped_columns: Vec<String>,
    pub duplicates_removed: usize,
}

/// Lowercase, trim, and turn separators and punctuation into underscores
pub fn normalize_column_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '(' && *c != ')')
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Rename every column to its normalized form; later duplicates are dropped
pub fn normalize_columns(df: &DataFrame) -> Result<(DataFrame, Vec<String>)> {
    let mut seen = HashSet::new();
    let mut dropped = Vec::new();
    let mut columns = Vec::with_capacity(df.width());

    for col in df.get_columns() {
        let normalized = normalize_column_name(col.name());
        if seen.insert(normalized.clone()) {
            columns.push(col.clone().with_name(normalized.into()));
        } else {
            dropped.push(col.name().to_string());
        }
    }

    Ok((DataFrame::new(columns)?, dropped))
}

/// First column (in table order) whose name contains any candidate substring
pub fn detect_target_column(columns: &[String], candidates: &[String]) -> Option<String> {
    columns
        .iter()
        .find(|col| candidates.iter().any(|c| col.contains(c.as_str())))
        .cloned()
}

/// Map an outcome column to 0/1.
///
/// Numeric columns that are already 0/1 are kept. Everything else is compared
/// token-wise (trimmed, lowercase, integral numbers without a decimal point)
/// against the positive vocabulary; unknown tokens and nulls are negative.
pub fn binarize_target(col: &Column, positive_tokens: &[String]) -> Result<Vec<i32>> {
    let vocabulary: HashSet<String> = positive_tokens.iter().map(|t| t.trim().to_lowercase()).collect();

    if col.dtype().is_primitive_numeric() {
        let values = column_to_f64_vec(col)?;
        let is_binary = values
            .iter()
            .flatten()
            .all(|&v| (v - 0.0).abs() < TOLERANCE || (v - 1.0).abs() < TOLERANCE);
        if is_binary {
            return Ok(values
                .iter()
                .map(|v| match v {
                    Some(x) if (x - 1.0).abs() < TOLERANCE => 1,
                    _ => 0,
                })
                .collect());
        }
        return Ok(values
            .iter()
            .map(|v| match v {
                Some(x) if vocabulary.contains(&format_number(*x)) => 1,
                _ => 0,
            })
            .collect());
    }

    let tokens = column_to_string_vec(col)?;
    Ok(tokens
        .iter()
        .map(|v| match v {
            Some(s) if vocabulary.contains(&s.trim().to_lowercase()) => 1,
            _ => 0,
        })
        .collect())
}

/// Normalize one source table, attach its binary outcome, and apply subsample rules
pub fn harmonize_table(
    df: &DataFrame,
    source_name: &str,
    schema: &CanonicalSchema,
    config: &HarmonizerConfig,
    seed: u64,
) -> Result<(DataFrame, SourceSummary)> {
    let rows_loaded = df.height();
    let (mut table, duplicated) = normalize_columns(df)?;
    if !duplicated.is_empty() {
        warn!(source = source_name, columns = ?duplicated, "dropping columns that collide after name normalization");
    }

    let names: Vec<String> = table.get_column_names().iter().map(|s| s.to_string()).collect();
    let target = match detect_target_column(&names, &config.target_candidates) {
        Some(found) => {
            let outcome = binarize_target(table.column(&found)?, &config.positive_tokens)?;
            table = table.drop(&found)?;
            if found != schema.outcome && table.column(&schema.outcome).is_ok() {
                table = table.drop(&schema.outcome)?;
            }
            table.with_column(Column::new(schema.outcome.as_str().into(), outcome))?;
            TargetSource::Detected(found)
        }
        None => {
            info!(
                source = source_name,
                rows = table.height(),
                "no outcome column detected; source contributes negative examples only"
            );
            table.with_column(Column::new(
                schema.outcome.as_str().into(),
                vec![0i32; table.height()],
            ))?;
            TargetSource::Defaulted
        }
    };

    if let Some(rule) = config
        .subsample_rules
        .iter()
        .find(|r| source_name.contains(r.source_pattern.as_str()))
    {
        if table.height() > rule.max_rows {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut indices =
                rand::seq::index::sample(&mut rng, table.height(), rule.sample_rows.min(table.height())).into_vec();
            indices.sort_unstable();
            info!(
                source = source_name,
                from = table.height(),
                to = indices.len(),
                "subsampling oversized source"
            );
            table = take_rows(&table, &indices)?;
        }
    }

    let positives = table
        .column(&schema.outcome)?
        .cast(&DataType::Int32)?
        .i32()?
        .into_iter()
        .filter(|v| *v == Some(1))
        .count();

    let summary = SourceSummary {
        name: source_name.to_string(),
        rows_loaded,
        rows_kept: table.height(),
        target,
        positives,
    };
    Ok((table, summary))
}

/// Stack tables with differing columns.
///
/// The result holds the union of columns in first-seen order. A column is
/// Float64 when every source that has non-null values for it stores numbers,
/// and String otherwise; sources lacking a column contribute nulls.
pub fn merge_tables(tables: &[DataFrame]) -> Result<DataFrame> {
    let mut order: Vec<String> = Vec::new();
    let mut numeric: HashMap<String, bool> = HashMap::new();

    for table in tables {
        for col in table.get_columns() {
            let name = col.name().to_string();
            if !numeric.contains_key(&name) {
                order.push(name.clone());
                numeric.insert(name.clone(), true);
            }
            let has_values = col.null_count() < col.len();
            if has_values && !col.dtype().is_primitive_numeric() {
                numeric.insert(name, false);
            }
        }
    }

    let mut merged: Option<DataFrame> = None;
    for table in tables {
        let height = table.height();
        let mut columns = Vec::with_capacity(order.len());
        for name in &order {
            let is_numeric = numeric[name];
            let column = match table.column(name) {
                Ok(col) if is_numeric => Column::new(name.as_str().into(), column_to_f64_vec(col)?),
                Ok(col) => Column::new(name.as_str().into(), column_to_string_vec(col)?),
                Err(_) if is_numeric => Column::full_null(name.as_str().into(), height, &DataType::Float64),
                Err(_) => Column::full_null(name.as_str().into(), height, &DataType::String),
            };
            columns.push(column);
        }
        let aligned = DataFrame::new(columns)?;
        merged = Some(match merged {
            None => aligned,
            Some(mut acc) => {
                acc.vstack_mut(&aligned)?;
                acc
            }
        });
    }

    merged.ok_or_else(|| anyhow::anyhow!("No tables to merge"))
}

/// Add absent canonical fields and coerce present ones to their declared type
pub fn conform_to_schema(df: &mut DataFrame, schema: &CanonicalSchema) -> Result<Vec<String>> {
    let height = df.height();
    let mut added = Vec::new();

    for field in &schema.fields {
        let name = field.name.as_str();
        let coerced = match df.column(name) {
            Ok(col) => match field.field_type {
                FieldType::Numeric if col.dtype() != &DataType::Float64 => {
                    Some(Column::new(name.into(), column_to_f64_vec(col)?))
                }
                FieldType::Categorical if col.dtype() != &DataType::String => {
                    Some(Column::new(name.into(), column_to_string_vec(col)?))
                }
                _ => None,
            },
            Err(_) => {
                added.push(field.name.clone());
                let dtype = match field.field_type {
                    FieldType::Numeric => DataType::Float64,
                    FieldType::Categorical => DataType::String,
                };
                Some(Column::full_null(name.into(), height, &dtype))
            }
        };
        if let Some(col) = coerced {
            df.with_column(col)?;
        }
    }

    let outcome: Vec<i32> = match df.column(&schema.outcome) {
        Ok(col) => column_to_f64_vec(col)?
            .into_iter()
            .map(|v| if v == Some(1.0) { 1 } else { 0 })
            .collect(),
        Err(_) => vec![0; height],
    };
    df.with_column(Column::new(schema.outcome.as_str().into(), outcome))?;

    Ok(added)
}

/// Drop exact duplicate rows, keeping the first occurrence
pub fn drop_duplicate_rows(df: &DataFrame) -> Result<(DataFrame, usize)> {
    let height = df.height();
    let mut keys = vec![String::new(); height];
    for col in df.get_columns() {
        for (key, value) in keys.iter_mut().zip(column_to_string_vec(col)?) {
            match value {
                Some(v) => key.push_str(&v),
                None => key.push('\u{0}'),
            }
            key.push('\u{1f}');
        }
    }

    let mut seen = HashSet::with_capacity(height);
    let keep: Vec<usize> = keys
        .into_iter()
        .enumerate()
        .filter(|(_, key)| seen.insert(key.clone()))
        .map(|(i, _)| i)
        .collect();

    let removed = height - keep.len();
    if removed == 0 {
        return Ok((df.clone(), 0));
    }
    Ok((take_rows(df, &keep)?, removed))
}

/// Load, harmonize and merge every configured source from `raw_dir`.
///
/// Missing files abort with [`RiskError::MissingSources`]; unparseable files
/// are skipped and recorded in the report.
pub fn harmonize_sources(
    raw_dir: &Path,
    sources: &[String],
    schema: &CanonicalSchema,
    config: &HarmonizerConfig,
    seed: u64,
) -> Result<(DataFrame, HarmonizeReport)> {
    let missing: Vec<String> = sources
        .iter()
        .filter(|f| !raw_dir.join(f).exists())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(RiskError::MissingSources {
            dir: raw_dir.to_path_buf(),
            files: missing,
        }
        .into());
    }

    let mut report = HarmonizeReport::default();
    let mut tables = Vec::new();

    for source in sources {
        let path = raw_dir.join(source);
        let loaded = load_source(&path)
            .and_then(|df| harmonize_table(&df, source, schema, config, seed));
        match loaded {
            Ok((table, summary)) => {
                tables.push(table);
                report.sources.push(summary);
            }
            Err(e) => {
                let message = format!("Failed to process {}: {:#}", source, e);
                warn!("{}", message);
                report.warnings.push(message);
            }
        }
    }

    if tables.is_empty() {
        return Err(RiskError::NoUsableSources(raw_dir.to_path_buf()).into());
    }

    let mut merged = merge_tables(&tables).context("Failed to merge source tables")?;
    report.added_columns = conform_to_schema(&mut merged, schema)?;

    let ratios = analyze_missing_values(&merged)?;
    let to_drop = get_features_above_threshold(&ratios, config.missing_threshold, &schema.names());
    if !to_drop.is_empty() {
        merged = merged.drop_many(to_drop.iter().map(|s| s.as_str()));
        report.dropped_columns = to_drop;
    }

    if config.drop_duplicates {
        let (deduped, removed) = drop_duplicate_rows(&merged)?;
        merged = deduped;
        report.duplicates_removed = removed;
    }

    Ok((merged, report))
}
