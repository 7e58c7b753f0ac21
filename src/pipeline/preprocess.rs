//! Leakage-safe preprocessing: imputation, Tukey clipping, one-hot encoding, scaling
//!
//! [`PreprocessingState::fit`] is the only function that looks at training
//! statistics. Everything else applies the frozen state, column by column, so
//! the batch path and the single-record path share the same per-value code.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::columns::{numeric_values, string_values};
use super::features::ENGINEERED_FIELDS;
use super::record::{FieldValue, RawRecord};
use super::schema::TableSchema;
use crate::error::{RiskError, RiskResult};

/// Tukey fence multiplier
const IQR_MULTIPLIER: f64 = 1.5;

/// Mode used when a categorical training column has no values at all
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Frozen statistics of one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub name: String,
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
    /// Whether the fences apply; derived ratios and flags pass through unclipped
    pub clip: bool,
    pub mean: f64,
    pub scale: f64,
}

impl NumericStats {
    fn fit(name: &str, values: &[Option<f64>], clip: bool) -> Self {
        let observed: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
        let median = quantile(&observed, 0.5).unwrap_or(0.0);

        let imputed: Vec<f64> = values
            .iter()
            .map(|v| v.filter(|x| x.is_finite()).unwrap_or(median))
            .collect();
        let q1 = quantile(&imputed, 0.25).unwrap_or(median);
        let q3 = quantile(&imputed, 0.75).unwrap_or(median);
        let iqr = q3 - q1;
        let lower = q1 - IQR_MULTIPLIER * iqr;
        let upper = q3 + IQR_MULTIPLIER * iqr;

        let clipped: Vec<f64> = imputed
            .iter()
            .map(|&v| if clip { v.clamp(lower, upper) } else { v })
            .collect();
        let n = clipped.len().max(1) as f64;
        let mean = clipped.iter().sum::<f64>() / n;
        let variance = clipped.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        let scale = if std > 0.0 && std.is_finite() { std } else { 1.0 };

        Self {
            name: name.to_string(),
            median,
            lower,
            upper,
            clip,
            mean,
            scale,
        }
    }

    /// Impute, clip and standardize one value
    pub fn transform(&self, value: Option<f64>) -> f64 {
        (self.clean(value) - self.mean) / self.scale
    }

    /// Clip bounds and imputation only, without scaling
    pub fn clean(&self, value: Option<f64>) -> f64 {
        let v = value.filter(|x| x.is_finite()).unwrap_or(self.median);
        if self.clip {
            v.clamp(self.lower, self.upper)
        } else {
            v
        }
    }
}

/// Frozen statistics of one categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub name: String,
    pub mode: String,
    /// Sorted levels seen in training; the first is the dropped baseline
    pub levels: Vec<String>,
}

impl CategoricalStats {
    fn fit(name: &str, values: &[Option<String>]) -> Self {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for v in values.iter().flatten() {
            *counts.entry(v.as_str()).or_default() += 1;
        }
        // BTreeMap iterates in key order, so ties resolve to the smallest level
        let mode = counts
            .iter()
            .fold(None::<(&str, usize)>, |best, (&level, &count)| match best {
                Some((_, c)) if c >= count => best,
                _ => Some((level, count)),
            })
            .map(|(level, _)| level.to_string())
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

        let mut levels: Vec<String> = counts.keys().map(|s| s.to_string()).collect();
        if values.iter().any(Option::is_none) && !levels.contains(&mode) {
            levels.push(mode.clone());
            levels.sort();
        }

        Self {
            name: name.to_string(),
            mode,
            levels,
        }
    }

    /// Output column names, baseline level dropped
    pub fn dummy_columns(&self) -> Vec<String> {
        self.levels
            .iter()
            .skip(1)
            .map(|level| format!("{}_{}", self.name, level))
            .collect()
    }

    /// One-hot encode a value: `None` takes the mode, unseen levels encode as all zeros
    pub fn encode(&self, value: Option<&str>, out: &mut Vec<f64>) {
        let v = value.unwrap_or(self.mode.as_str());
        out.extend(self.levels.iter().skip(1).map(|level| if level == v { 1.0 } else { 0.0 }));
    }

    /// Encoding for a column the caller did not supply
    pub fn encode_absent(&self, out: &mut Vec<f64>) {
        out.extend(std::iter::repeat(0.0).take(self.levels.len().saturating_sub(1)));
    }
}

/// Dense numeric matrix with named, ordered columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Rows at the given positions, in order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Everything learned from the training split, frozen after [`fit`](Self::fit)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingState {
    pub numeric: Vec<NumericStats>,
    pub categorical: Vec<CategoricalStats>,
    /// Output column order; numeric columns first, then dummies
    pub feature_columns: Vec<String>,
}

impl PreprocessingState {
    /// Learn imputation, clipping, encoding and scaling statistics from training rows
    pub fn fit(train: &DataFrame, schema: &TableSchema) -> Result<Self> {
        schema.validate(train)?;

        let numeric = schema
            .numeric()
            .into_iter()
            .map(|name| {
                let clip = !ENGINEERED_FIELDS.iter().any(|f| *f == name);
                Ok(NumericStats::fit(name, &numeric_values(train, name)?, clip))
            })
            .collect::<Result<Vec<_>>>()?;
        let categorical = schema
            .categorical()
            .into_iter()
            .map(|name| Ok(CategoricalStats::fit(name, &string_values(train, name)?)))
            .collect::<Result<Vec<_>>>()?;

        let feature_columns = numeric
            .iter()
            .map(|s| s.name.clone())
            .chain(categorical.iter().flat_map(|c| c.dummy_columns()))
            .collect();

        Ok(Self {
            numeric,
            categorical,
            feature_columns,
        })
    }

    /// Fit on `train` and transform it with the fitted state
    pub fn fit_transform(train: &DataFrame, schema: &TableSchema) -> Result<(Self, FeatureMatrix)> {
        let state = Self::fit(train, schema)?;
        let matrix = state.apply(train)?;
        Ok((state, matrix))
    }

    pub fn n_features(&self) -> usize {
        self.feature_columns.len()
    }

    /// Transform a table. Absent columns read as raw 0.0 (numeric) or the
    /// baseline level (categorical); extra columns are ignored.
    pub fn apply(&self, df: &DataFrame) -> Result<FeatureMatrix> {
        let height = df.height();
        let mut rows: Vec<Vec<f64>> = vec![Vec::with_capacity(self.n_features()); height];

        for stats in &self.numeric {
            if df.column(&stats.name).is_ok() {
                let values = numeric_values(df, &stats.name)
                    .with_context(|| format!("Failed to read numeric column '{}'", stats.name))?;
                for (row, value) in rows.iter_mut().zip(values) {
                    row.push(stats.transform(value));
                }
            } else {
                let filled = stats.transform(Some(0.0));
                rows.iter_mut().for_each(|row| row.push(filled));
            }
        }

        for stats in &self.categorical {
            if df.column(&stats.name).is_ok() {
                let values = string_values(df, &stats.name)?;
                for (row, value) in rows.iter_mut().zip(values) {
                    stats.encode(value.as_deref(), row);
                }
            } else {
                rows.iter_mut().for_each(|row| stats.encode_absent(row));
            }
        }

        Ok(FeatureMatrix {
            columns: self.feature_columns.clone(),
            rows,
        })
    }

    /// Transform one record with the same per-value rules as [`apply`](Self::apply)
    pub fn apply_record(&self, record: &RawRecord) -> RiskResult<Vec<f64>> {
        let mut row = Vec::with_capacity(self.n_features());

        for stats in &self.numeric {
            let value = match record.get(&stats.name) {
                None => Some(0.0),
                Some(FieldValue::Missing) => None,
                Some(FieldValue::Number(n)) => Some(*n),
                Some(FieldValue::Text(t)) => match t.trim().parse::<f64>() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        return Err(RiskError::BadRequest(format!(
                            "field '{}' expects a number, got '{}'",
                            stats.name, t
                        )))
                    }
                },
            };
            row.push(stats.transform(value));
        }

        for stats in &self.categorical {
            match record.get(&stats.name) {
                None => stats.encode_absent(&mut row),
                Some(value) => stats.encode(value.as_text().as_deref(), &mut row),
            }
        }

        debug_assert_eq!(row.len(), self.n_features());
        Ok(row)
    }

    /// Raw (imputed and clipped, unscaled) value of every output column for one record
    pub fn raw_values(&self, record: &RawRecord) -> Vec<f64> {
        let mut raw = Vec::with_capacity(self.n_features());
        for stats in &self.numeric {
            let value = match record.get(&stats.name) {
                None => Some(0.0),
                Some(v) => v.as_number(),
            };
            raw.push(stats.clean(value));
        }
        for stats in &self.categorical {
            match record.get(&stats.name) {
                None => stats.encode_absent(&mut raw),
                Some(value) => stats.encode(value.as_text().as_deref(), &mut raw),
            }
        }
        raw
    }

    /// Fail unless `columns` is exactly the fitted column list, in order
    pub fn ensure_columns(&self, columns: &[String]) -> RiskResult<()> {
        if columns.len() != self.feature_columns.len() {
            return Err(RiskError::ArtifactMismatch(format!(
                "expected {} feature columns, found {}",
                self.feature_columns.len(),
                columns.len()
            )));
        }
        if let Some((i, (expected, found))) = self
            .feature_columns
            .iter()
            .zip(columns)
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(RiskError::ArtifactMismatch(format!(
                "feature column {} is '{}', expected '{}'",
                i, found, expected
            )));
        }
        Ok(())
    }
}

/// Linear-interpolated quantile of unsorted values; `None` when empty
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
