//! Canonical field schema and per-table column typing

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

/// Name of the binary outcome column in every harmonized table
pub const OUTCOME_FIELD: &str = "cancer_risk";

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Numeric,
    Categorical,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Numeric => write!(f, "numeric"),
            FieldType::Categorical => write!(f, "categorical"),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Numeric,
        }
    }

    pub fn categorical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Categorical,
        }
    }
}

/// Ordered list of fields every harmonized table must carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSchema {
    pub fields: Vec<Field>,
    pub outcome: String,
}

impl Default for CanonicalSchema {
    /// Demographics, lifestyle and blood-panel fields of the screening cohort
    fn default() -> Self {
        let numeric = |n: &str| Field::numeric(n);
        let categorical = |n: &str| Field::categorical(n);
        Self {
            fields: vec![
                numeric("age"),
                categorical("sex"),
                numeric("bmi"),
                categorical("smoking_status"),
                numeric("pack_years"),
                categorical("alcohol_use"),
                categorical("family_history_cancer"),
                categorical("occupational_exposure"),
                categorical("prior_cancer_diagnosis"),
                numeric("wbc_count"),
                numeric("rbc_count"),
                numeric("hemoglobin"),
                numeric("hematocrit"),
                numeric("platelet_count"),
                numeric("neutrophil_pct"),
                numeric("lymphocyte_pct"),
                numeric("cea_level"),
                numeric("ca125_level"),
                numeric("crp_level"),
                numeric("mcv"),
                numeric("mch"),
            ],
            outcome: OUTCOME_FIELD.to_string(),
        }
    }
}

impl CanonicalSchema {
    /// Names of all canonical fields including the outcome
    pub fn names(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| f.name.clone())
            .chain(std::iter::once(self.outcome.clone()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        name == self.outcome || self.fields.iter().any(|f| f.name == name)
    }

    pub fn declared_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.field_type)
    }
}

/// Column typing of one concrete table, used to split numeric and categorical blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<Field>,
}

impl TableSchema {
    /// Type every non-outcome column of `df`.
    ///
    /// Canonical fields use their declared type; other columns are numeric when
    /// their dtype is numeric and categorical otherwise.
    pub fn infer(df: &DataFrame, canonical: &CanonicalSchema) -> Self {
        let fields = df
            .get_columns()
            .iter()
            .filter(|col| col.name().as_str() != canonical.outcome)
            .map(|col| {
                let name = col.name().as_str();
                let field_type = canonical.declared_type(name).unwrap_or_else(|| {
                    if col.dtype().is_primitive_numeric() {
                        FieldType::Numeric
                    } else {
                        FieldType::Categorical
                    }
                });
                Field {
                    name: name.to_string(),
                    field_type,
                }
            })
            .collect();
        Self { fields }
    }

    pub fn numeric(&self) -> Vec<&str> {
        self.of_type(FieldType::Numeric)
    }

    pub fn categorical(&self) -> Vec<&str> {
        self.of_type(FieldType::Categorical)
    }

    fn of_type(&self, field_type: FieldType) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.field_type == field_type)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Check that every field of the schema is a column of `df`
    pub fn validate(&self, df: &DataFrame) -> RiskResult<()> {
        for field in &self.fields {
            if df.column(&field.name).is_err() {
                return Err(RiskError::MissingColumn(field.name.clone()));
            }
        }
        Ok(())
    }
}
