//! Single-row raw records, as received by the scoring service

use std::collections::BTreeMap;

use anyhow::Result;
use polars::prelude::*;
use serde_json::Value;

use super::columns::{column_to_f64_vec, column_to_string_vec};
use super::features::{derive_features, EngineeredFeatures, Filler, HematologyInputs};
use crate::error::{RiskError, RiskResult};

/// One raw field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    /// Field supplied without a value
    Missing,
}

impl FieldValue {
    /// Numeric view; text that parses as a number counts as numeric
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(t) => t.trim().parse().ok(),
            FieldValue::Missing => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Number(n) => Some(super::columns::format_number(*n)),
            FieldValue::Text(t) => Some(t.clone()),
            FieldValue::Missing => None,
        }
    }
}

/// Field name to value map for one row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_number)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse a flat JSON object; nested values are rejected
    pub fn from_json(value: &Value) -> RiskResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| RiskError::BadRequest("payload must be a JSON object".to_string()))?;

        let mut record = Self::new();
        for (key, v) in object {
            let field = match v {
                Value::Null => FieldValue::Missing,
                Value::Bool(b) => FieldValue::Number(if *b { 1.0 } else { 0.0 }),
                Value::Number(n) => FieldValue::Number(n.as_f64().ok_or_else(|| {
                    RiskError::BadRequest(format!("field '{}' is not a finite number", key))
                })?),
                Value::String(s) => FieldValue::Text(s.clone()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(RiskError::BadRequest(format!(
                        "field '{}' must be a number, string or null",
                        key
                    )))
                }
            };
            record.insert(key.clone(), field);
        }
        Ok(record)
    }

    /// Raw hematology inputs of this record
    pub fn hematology_inputs(&self) -> HematologyInputs {
        HematologyInputs {
            wbc_count: self.number("wbc_count"),
            neutrophil_pct: self.number("neutrophil_pct"),
            lymphocyte_pct: self.number("lymphocyte_pct"),
            monocyte_pct: self.number("monocyte_pct"),
            neutrophil_count: self.number("neutrophil_count"),
            lymphocyte_count: self.number("lymphocyte_count"),
            monocyte_count: self.number("monocyte_count"),
            platelet_count: self.number("platelet_count"),
            hemoglobin: self.number("hemoglobin"),
            sex: self.get("sex").and_then(FieldValue::as_text),
        }
    }

    /// Derive the engineered fields and store them in the record
    pub fn engineer(&mut self, filler: &mut Filler) -> EngineeredFeatures {
        let features = derive_features(&self.hematology_inputs(), filler);
        for (name, value) in features.named() {
            self.insert(name, FieldValue::Number(value));
        }
        features
    }
}

/// Split a table into one record per row; nulls become [`FieldValue::Missing`]
pub fn records_from_table(df: &DataFrame) -> Result<Vec<RawRecord>> {
    let mut records = vec![RawRecord::new(); df.height()];
    for col in df.get_columns() {
        let name = col.name().to_string();
        if col.dtype().is_primitive_numeric() {
            for (record, value) in records.iter_mut().zip(column_to_f64_vec(col)?) {
                record.insert(name.clone(), value.map_or(FieldValue::Missing, FieldValue::Number));
            }
        } else {
            for (record, value) in records.iter_mut().zip(column_to_string_vec(col)?) {
                record.insert(name.clone(), value.map_or(FieldValue::Missing, FieldValue::Text));
            }
        }
    }
    Ok(records)
}
