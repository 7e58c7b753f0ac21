//! Tests for stratified splitting and minority oversampling together

use oncorisk::pipeline::imbalance::{smote, SmoteConfig, SmoteOutcome};
use oncorisk::pipeline::split::stratified_split;

fn skewed(n_neg: usize, n_pos: usize) -> (Vec<Vec<f64>>, Vec<u8>) {
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for i in 0..n_neg {
        rows.push(vec![(i % 11) as f64, (i % 7) as f64 * 0.5]);
        labels.push(0);
    }
    for i in 0..n_pos {
        rows.push(vec![20.0 + (i % 5) as f64, 8.0 + (i % 3) as f64]);
        labels.push(1);
    }
    (rows, labels)
}

#[test]
fn test_split_then_resample_only_the_training_side() {
    let (rows, labels) = skewed(90, 10);
    let split = stratified_split(&labels, 0.2, 42);

    let train_rows: Vec<Vec<f64>> = split.train.iter().map(|&i| rows[i].clone()).collect();
    let train_labels: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
    let holdout_positives = split.holdout.iter().filter(|&&i| labels[i] == 1).count();

    let out = smote(&train_rows, &train_labels, &SmoteConfig::default(), 42);

    // 20% of each class held out, the rest balanced by synthesis
    assert_eq!(split.holdout.len(), 20);
    assert_eq!(holdout_positives, 2);
    let positives = out.labels.iter().filter(|&&l| l == 1).count();
    assert_eq!(positives, 72);
    assert_eq!(out.rows.len(), 144);
    assert!(matches!(out.outcome, SmoteOutcome::Applied { minority_class: 1, synthesized: 64, k: 5 }));
}

#[test]
fn test_resampling_is_seeded() {
    let (rows, labels) = skewed(40, 6);
    let a = smote(&rows, &labels, &SmoteConfig::default(), 9);
    let b = smote(&rows, &labels, &SmoteConfig::default(), 9);
    let c = smote(&rows, &labels, &SmoteConfig::default(), 10);
    assert_eq!(a.rows, b.rows);
    assert_ne!(a.rows, c.rows);
}

#[test]
fn test_majority_positive_class_oversamples_negatives() {
    let (rows, labels) = skewed(3, 12);
    let out = smote(&rows, &labels, &SmoteConfig::default(), 1);
    assert_eq!(
        out.outcome,
        SmoteOutcome::Applied {
            minority_class: 0,
            synthesized: 9,
            k: 2
        }
    );
    assert_eq!(out.labels.iter().filter(|&&l| l == 0).count(), 12);
}

#[test]
fn test_single_minority_row_is_left_alone() {
    let (rows, labels) = skewed(30, 1);
    let out = smote(&rows, &labels, &SmoteConfig::default(), 1);
    assert_eq!(
        out.outcome,
        SmoteOutcome::Skipped {
            minority_class: 1,
            minority_size: 1
        }
    );
    assert_eq!(out.rows, rows);
    assert_eq!(out.labels, labels);
}
