//! Missing value analysis for the merged table

use anyhow::Result;
use polars::prelude::*;

/// Missing ratio of every column, sorted descending by ratio
pub fn analyze_missing_values(df: &DataFrame) -> Result<Vec<(String, f64)>> {
    if df.height() == 0 {
        return Ok(Vec::new());
    }

    let rows = df.height() as f64;
    let mut missing_ratios: Vec<(String, f64)> = df
        .get_columns()
        .iter()
        .map(|col| (col.name().to_string(), col.null_count() as f64 / rows))
        .collect();

    missing_ratios.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(missing_ratios)
}

/// Columns whose missing ratio is strictly above `threshold`, never including protected ones
pub fn get_features_above_threshold(
    missing_ratios: &[(String, f64)],
    threshold: f64,
    protected: &[String],
) -> Vec<String> {
    missing_ratios
        .iter()
        .filter(|(name, ratio)| *ratio > threshold && !protected.contains(name))
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios_sorted_descending() {
        let df = df! {
            "full" => [Some(1.0f64), Some(2.0), Some(3.0), Some(4.0)],
            "half" => [Some(1.0f64), None, Some(3.0), None],
            "empty" => [None::<f64>, None, None, None],
        }
        .unwrap();

        let ratios = analyze_missing_values(&df).unwrap();
        assert_eq!(ratios[0], ("empty".to_string(), 1.0));
        assert_eq!(ratios[1], ("half".to_string(), 0.5));
        assert_eq!(ratios[2], ("full".to_string(), 0.0));
    }

    #[test]
    fn test_protected_columns_survive() {
        let ratios = vec![
            ("hemoglobin".to_string(), 0.9),
            ("biopsy_note".to_string(), 0.8),
            ("age".to_string(), 0.1),
            ("at_threshold".to_string(), 0.4),
        ];
        let protected = vec!["hemoglobin".to_string()];
        let to_drop = get_features_above_threshold(&ratios, 0.4, &protected);
        assert_eq!(to_drop, vec!["biopsy_note".to_string()]);
    }

    #[test]
    fn test_empty_frame() {
        assert!(analyze_missing_values(&DataFrame::empty()).unwrap().is_empty());
    }
}
