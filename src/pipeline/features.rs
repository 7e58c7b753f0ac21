//! Hematology feature derivation
//!
//! [`derive_features`] is the only place the engineered fields are computed.
//! The batch path ([`engineer_table`]) extracts each row's raw inputs and calls
//! it once per row; the serving path calls it on a single request. Both paths
//! therefore produce identical values for identical inputs.

use anyhow::Result;
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::columns::{optional_numeric_values, string_values};

/// Floor applied to the lymphocyte count before dividing by it
pub const RATIO_EPSILON: f64 = 1e-9;

/// Absolute count used when it cannot be derived from a percentage
pub const DEFAULT_COUNT: f64 = 1.0;

pub const FEMALE_HEMOGLOBIN_CUTOFF: f64 = 12.0;
pub const MALE_HEMOGLOBIN_CUTOFF: f64 = 13.5;
pub const THROMBOCYTOSIS_CUTOFF: f64 = 400.0;
pub const HIGH_NLR_CUTOFF: f64 = 3.0;

/// Engineered columns, in the order they are appended to a table
pub const ENGINEERED_FIELDS: [&str; 9] = [
    "neutrophil_count",
    "lymphocyte_count",
    "monocyte_count",
    "NLR",
    "PLR",
    "MLR",
    "anemia_flag",
    "thrombocytosis_flag",
    "high_nlr_flag",
];

/// Raw inputs the derivation reads; every field may be absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HematologyInputs {
    pub wbc_count: Option<f64>,
    pub neutrophil_pct: Option<f64>,
    pub lymphocyte_pct: Option<f64>,
    pub monocyte_pct: Option<f64>,
    pub neutrophil_count: Option<f64>,
    pub lymphocyte_count: Option<f64>,
    pub monocyte_count: Option<f64>,
    pub platelet_count: Option<f64>,
    pub hemoglobin: Option<f64>,
    pub sex: Option<String>,
}

/// Derived fields for one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineeredFeatures {
    pub neutrophil_count: f64,
    pub lymphocyte_count: f64,
    pub monocyte_count: f64,
    pub nlr: f64,
    pub plr: f64,
    pub mlr: f64,
    pub anemia_flag: f64,
    pub thrombocytosis_flag: f64,
    pub high_nlr_flag: f64,
}

impl EngineeredFeatures {
    /// Values in [`ENGINEERED_FIELDS`] order
    pub fn values(&self) -> [f64; 9] {
        [
            self.neutrophil_count,
            self.lymphocyte_count,
            self.monocyte_count,
            self.nlr,
            self.plr,
            self.mlr,
            self.anemia_flag,
            self.thrombocytosis_flag,
            self.high_nlr_flag,
        ]
    }

    /// `(name, value)` pairs in [`ENGINEERED_FIELDS`] order
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> {
        ENGINEERED_FIELDS.into_iter().zip(self.values())
    }
}

/// Placeholder for a count whose raw inputs are entirely absent
#[derive(Debug, Clone)]
pub enum Filler {
    /// Inference time: a neutral zero
    Zero,
    /// Training time: uniform noise in `[low, high)` from a seeded generator
    Uniform { low: f64, high: f64, rng: ChaCha8Rng },
}

impl Filler {
    /// Training-time filler matching the monocyte count range of the cohort
    pub fn training(seed: u64) -> Self {
        Filler::Uniform {
            low: 0.1,
            high: 1.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn next(&mut self) -> f64 {
        match self {
            Filler::Zero => 0.0,
            Filler::Uniform { low, high, rng } => rng.gen_range(*low..*high),
        }
    }
}

/// Absolute count from a percentage of the total, with [`DEFAULT_COUNT`] when underivable
fn absolute_count(count: Option<f64>, pct: Option<f64>, total: Option<f64>) -> f64 {
    if let Some(c) = count {
        return c;
    }
    match (pct, total) {
        (Some(p), Some(t)) if t != 0.0 => (p / 100.0) * t,
        _ => DEFAULT_COUNT,
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Sex-conditioned anemia check; unknown sex or hemoglobin never flags
pub fn is_anemic(sex: Option<&str>, hemoglobin: Option<f64>) -> bool {
    let Some(hb) = hemoglobin else {
        return false;
    };
    match sex.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("female") => hb < FEMALE_HEMOGLOBIN_CUTOFF,
        Some("male") => hb < MALE_HEMOGLOBIN_CUTOFF,
        _ => false,
    }
}

/// Derive every engineered field from one record's raw inputs
pub fn derive_features(inputs: &HematologyInputs, filler: &mut Filler) -> EngineeredFeatures {
    let neutrophil_count = absolute_count(inputs.neutrophil_count, inputs.neutrophil_pct, inputs.wbc_count);
    let lymphocyte_count = absolute_count(inputs.lymphocyte_count, inputs.lymphocyte_pct, inputs.wbc_count);
    let monocyte_count = match (inputs.monocyte_count, inputs.monocyte_pct, inputs.wbc_count) {
        (Some(c), _, _) => c,
        (None, Some(p), Some(t)) if t != 0.0 => (p / 100.0) * t,
        _ => filler.next(),
    };

    let denominator = lymphocyte_count.max(RATIO_EPSILON);
    let nlr = neutrophil_count / denominator;
    let plr = inputs.platelet_count.unwrap_or(0.0) / denominator;
    let mlr = monocyte_count / denominator;

    EngineeredFeatures {
        neutrophil_count,
        lymphocyte_count,
        monocyte_count,
        nlr,
        plr,
        mlr,
        anemia_flag: flag(is_anemic(inputs.sex.as_deref(), inputs.hemoglobin)),
        thrombocytosis_flag: flag(inputs.platelet_count.is_some_and(|p| p > THROMBOCYTOSIS_CUTOFF)),
        high_nlr_flag: flag(nlr > HIGH_NLR_CUTOFF),
    }
}

/// Per-row raw inputs of a table; absent columns read as missing
pub fn extract_inputs(df: &DataFrame) -> Result<Vec<HematologyInputs>> {
    let height = df.height();
    let column = |name: &str| -> Result<Vec<Option<f64>>> {
        Ok(optional_numeric_values(df, name)?.unwrap_or_else(|| vec![None; height]))
    };

    let wbc = column("wbc_count")?;
    let neut_pct = column("neutrophil_pct")?;
    let lymph_pct = column("lymphocyte_pct")?;
    let mono_pct = column("monocyte_pct")?;
    let neut = column("neutrophil_count")?;
    let lymph = column("lymphocyte_count")?;
    let mono = column("monocyte_count")?;
    let platelets = column("platelet_count")?;
    let hemoglobin = column("hemoglobin")?;
    let sex = if df.column("sex").is_ok() {
        string_values(df, "sex")?
    } else {
        vec![None; height]
    };

    Ok((0..height)
        .map(|i| HematologyInputs {
            wbc_count: wbc[i],
            neutrophil_pct: neut_pct[i],
            lymphocyte_pct: lymph_pct[i],
            monocyte_pct: mono_pct[i],
            neutrophil_count: neut[i],
            lymphocyte_count: lymph[i],
            monocyte_count: mono[i],
            platelet_count: platelets[i],
            hemoglobin: hemoglobin[i],
            sex: sex[i].clone(),
        })
        .collect())
}

/// Append (or overwrite) the engineered columns of every row
pub fn engineer_table(df: &DataFrame, filler: &mut Filler) -> Result<DataFrame> {
    let rows: Vec<EngineeredFeatures> = extract_inputs(df)?
        .iter()
        .map(|inputs| derive_features(inputs, filler))
        .collect();

    let mut out = df.clone();
    for (idx, name) in ENGINEERED_FIELDS.iter().enumerate() {
        let values: Vec<f64> = rows.iter().map(|r| r.values()[idx]).collect();
        out.with_column(Column::new((*name).into(), values))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_inputs() -> HematologyInputs {
        HematologyInputs {
            wbc_count: Some(8000.0),
            neutrophil_pct: Some(60.0),
            lymphocyte_pct: Some(30.0),
            platelet_count: Some(450.0),
            hemoglobin: Some(11.0),
            sex: Some("female".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_patient() {
        let features = derive_features(&reference_inputs(), &mut Filler::Zero);
        assert!((features.neutrophil_count - 4800.0).abs() < 1e-9);
        assert!((features.lymphocyte_count - 2400.0).abs() < 1e-9);
        assert!((features.nlr - 2.0).abs() < 1e-12);
        assert_eq!(features.anemia_flag, 1.0);
        assert_eq!(features.thrombocytosis_flag, 1.0);
        assert_eq!(features.high_nlr_flag, 0.0);
        assert_eq!(features.monocyte_count, 0.0);
        assert_eq!(features.mlr, 0.0);
    }

    #[test]
    fn test_anemia_thresholds_by_sex() {
        assert!(is_anemic(Some("Male "), Some(13.0)));
        assert!(!is_anemic(Some("female"), Some(13.0)));
        assert!(!is_anemic(Some("female"), Some(12.0)));
        assert!(!is_anemic(None, Some(5.0)));
        assert!(!is_anemic(Some("male"), None));
    }

    #[test]
    fn test_zero_lymphocytes_gives_large_ratio() {
        let inputs = HematologyInputs {
            neutrophil_count: Some(5.0),
            lymphocyte_count: Some(0.0),
            ..Default::default()
        };
        let features = derive_features(&inputs, &mut Filler::Zero);
        assert!(features.nlr.is_finite());
        assert!(features.nlr > 1e9);
        assert_eq!(features.high_nlr_flag, 1.0);
    }

    #[test]
    fn test_zero_total_uses_default_count() {
        let inputs = HematologyInputs {
            wbc_count: Some(0.0),
            neutrophil_pct: Some(50.0),
            lymphocyte_pct: Some(20.0),
            ..Default::default()
        };
        let features = derive_features(&inputs, &mut Filler::Zero);
        assert_eq!(features.neutrophil_count, DEFAULT_COUNT);
        assert_eq!(features.lymphocyte_count, DEFAULT_COUNT);
        assert_eq!(features.nlr, 1.0);
    }

    #[test]
    fn test_training_filler_is_seeded_and_bounded() {
        let inputs = HematologyInputs::default();
        let mut a = Filler::training(7);
        let mut b = Filler::training(7);
        for _ in 0..20 {
            let x = derive_features(&inputs, &mut a).monocyte_count;
            let y = derive_features(&inputs, &mut b).monocyte_count;
            assert_eq!(x, y);
            assert!((0.1..1.0).contains(&x));
        }
    }

    #[test]
    fn test_engineer_table_appends_all_fields() {
        let df = df! {
            "wbc_count" => [Some(8000.0f64), None],
            "neutrophil_pct" => [Some(60.0f64), Some(70.0)],
            "lymphocyte_pct" => [Some(30.0f64), Some(20.0)],
            "platelet_count" => [Some(450.0f64), Some(200.0)],
            "hemoglobin" => [Some(11.0f64), Some(15.0)],
            "sex" => ["female", "male"],
        }
        .unwrap();
        let out = engineer_table(&df, &mut Filler::Zero).unwrap();
        for name in ENGINEERED_FIELDS {
            assert!(out.column(name).is_ok(), "missing {}", name);
        }
        let nlr = out.column("NLR").unwrap().f64().unwrap().get(0).unwrap();
        assert!((nlr - 2.0).abs() < 1e-12);
        let plr_missing_wbc = out.column("PLR").unwrap().f64().unwrap().get(1).unwrap();
        assert!((plr_missing_wbc - 200.0).abs() < 1e-12);
    }
}
