//! Held-out evaluation metrics
//!
//! ROC-AUC uses the Mann-Whitney rank statistic with tie groups sharing their
//! midpoint rank; PR-AUC is average precision.

use serde::{Deserialize, Serialize};

use crate::model::DecisionPolicy;

/// Precision, recall, F1 and support of one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class metrics plus accuracy, macro and weighted averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// (class label, metrics) in ascending label order
    pub classes: Vec<(usize, ClassMetrics)>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn class(&self, label: usize) -> Option<&ClassMetrics> {
        self.classes.iter().find(|(l, _)| *l == label).map(|(_, m)| m)
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    ratio(2.0 * precision * recall, precision + recall)
}

/// Classification report over every label seen in either vector
pub fn classification_report(y_true: &[usize], y_pred: &[usize]) -> ClassificationReport {
    let mut labels: Vec<usize> = y_true.iter().chain(y_pred).copied().collect();
    labels.sort_unstable();
    labels.dedup();

    let classes: Vec<(usize, ClassMetrics)> = labels
        .iter()
        .map(|&label| {
            let tp = y_true.iter().zip(y_pred).filter(|(&t, &p)| t == label && p == label).count();
            let predicted = y_pred.iter().filter(|&&p| p == label).count();
            let support = y_true.iter().filter(|&&t| t == label).count();
            let precision = ratio(tp as f64, predicted as f64);
            let recall = ratio(tp as f64, support as f64);
            (
                label,
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1(precision, recall),
                    support,
                },
            )
        })
        .collect();

    let total: usize = classes.iter().map(|(_, m)| m.support).sum();
    let k = classes.len().max(1) as f64;
    let average = |weight: &dyn Fn(&ClassMetrics) -> f64, norm: f64| ClassMetrics {
        precision: classes.iter().map(|(_, m)| weight(m) * m.precision).sum::<f64>() / norm,
        recall: classes.iter().map(|(_, m)| weight(m) * m.recall).sum::<f64>() / norm,
        f1_score: classes.iter().map(|(_, m)| weight(m) * m.f1_score).sum::<f64>() / norm,
        support: total,
    };
    let macro_avg = average(&|_| 1.0, k);
    let weighted_avg = average(&|m| m.support as f64, total.max(1) as f64);

    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    ClassificationReport {
        classes,
        accuracy: ratio(correct as f64, y_true.len() as f64),
        macro_avg,
        weighted_avg,
    }
}

/// Binary ROC-AUC of `scores` against 0/1 labels; 0.5 when a class is absent
pub fn roc_auc(scores: &[f64], labels: &[u8]) -> f64 {
    let mut pairs: Vec<(f64, u8)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total_pos = pairs.iter().filter(|(_, t)| *t == 1).count() as f64;
    let total_neg = pairs.len() as f64 - total_pos;
    if total_pos <= 0.0 || total_neg <= 0.0 {
        return 0.5;
    }

    let n = pairs.len();
    let mut rank_sum_pos = 0.0;
    let mut cumulative = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        // Tie group
        while j < n && pairs[j].0 == pairs[i].0 {
            j += 1;
        }
        let group = (j - i) as f64;
        let avg_rank = cumulative + group / 2.0;
        rank_sum_pos += avg_rank * pairs[i..j].iter().filter(|(_, t)| *t == 1).count() as f64;
        cumulative += group;
        i = j;
    }

    // Midpoint ranks are 0-based, hence the P²/2 correction
    let u = rank_sum_pos - total_pos * total_pos / 2.0;
    (u / (total_pos * total_neg)).clamp(0.0, 1.0)
}

/// Macro one-vs-rest ROC-AUC for multi-class probability rows
///
/// The training outcome is binary, so the pipeline itself scores with
/// [`roc_auc`]. This is the entry point for callers evaluating a multi-class
/// target (e.g. cancer subtype) with the same rank statistic; with two
/// classes it reduces to the binary AUC.
pub fn roc_auc_ovr(probabilities: &[Vec<f64>], labels: &[usize]) -> f64 {
    let n_classes = probabilities.first().map_or(0, Vec::len);
    if n_classes == 0 {
        return 0.5;
    }
    let aucs: Vec<f64> = (0..n_classes)
        .filter(|c| labels.contains(c))
        .map(|c| {
            let scores: Vec<f64> = probabilities.iter().map(|row| row[c]).collect();
            let binary: Vec<u8> = labels.iter().map(|&l| u8::from(l == c)).collect();
            roc_auc(&scores, &binary)
        })
        .collect();
    if aucs.is_empty() {
        0.5
    } else {
        aucs.iter().sum::<f64>() / aucs.len() as f64
    }
}

/// Average precision: sum over thresholds of precision times recall increment
pub fn average_precision(scores: &[f64], labels: &[u8]) -> f64 {
    let total_pos = labels.iter().filter(|&&l| l == 1).count() as f64;
    if total_pos == 0.0 {
        return 0.0;
    }
    let mut pairs: Vec<(f64, u8)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut ap = 0.0;
    let mut tp = 0.0;
    let mut seen = 0.0;
    let mut prev_recall = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let mut j = i;
        while j < pairs.len() && pairs[j].0 == pairs[i].0 {
            tp += f64::from(pairs[j].1);
            seen += 1.0;
            j += 1;
        }
        let recall = tp / total_pos;
        ap += (recall - prev_recall) * (tp / seen);
        prev_recall = recall;
        i = j;
    }
    ap
}

/// One point of the ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub fpr: f64,
    pub tpr: f64,
}

/// ROC curve from the strictest threshold down, starting at (0, 0)
pub fn roc_curve(scores: &[f64], labels: &[u8]) -> Vec<RocPoint> {
    let total_pos = labels.iter().filter(|&&l| l == 1).count() as f64;
    let total_neg = labels.len() as f64 - total_pos;
    let mut pairs: Vec<(f64, u8)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut points = vec![RocPoint {
        threshold: f64::INFINITY,
        fpr: 0.0,
        tpr: 0.0,
    }];
    let (mut tp, mut fp) = (0.0, 0.0);
    let mut i = 0;
    while i < pairs.len() {
        let mut j = i;
        while j < pairs.len() && pairs[j].0 == pairs[i].0 {
            if pairs[j].1 == 1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            j += 1;
        }
        points.push(RocPoint {
            threshold: pairs[i].0,
            fpr: ratio(fp, total_neg),
            tpr: ratio(tp, total_pos),
        });
        i = j;
    }
    points
}

/// Binary confusion matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (1, 1) => cm.true_positive += 1,
                (1, _) => cm.false_negative += 1,
                (_, 1) => cm.false_positive += 1,
                _ => cm.true_negative += 1,
            }
        }
        cm
    }
}

/// Positive-class F1 after thresholding probabilities
pub fn f1_at_threshold(probabilities: &[f64], labels: &[u8], threshold: f64) -> f64 {
    let cm = ConfusionMatrix::from_predictions(
        labels,
        &probabilities.iter().map(|&p| u8::from(p >= threshold)).collect::<Vec<_>>(),
    );
    let precision = ratio(cm.true_positive as f64, (cm.true_positive + cm.false_positive) as f64);
    let recall = ratio(cm.true_positive as f64, (cm.true_positive + cm.false_negative) as f64);
    f1(precision, recall)
}

/// Metric snapshot of a model on held-out rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub auc_roc: f64,
    pub pr_auc: f64,
    /// Positive-class metrics at the decision threshold
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
    pub threshold: f64,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
}

impl EvaluationMetrics {
    pub fn compute(probabilities: &[f64], labels: &[u8], policy: &DecisionPolicy) -> Self {
        let predicted: Vec<u8> = probabilities.iter().map(|&p| policy.classify(p)).collect();
        let report = classification_report(
            &labels.iter().map(|&l| usize::from(l)).collect::<Vec<_>>(),
            &predicted.iter().map(|&l| usize::from(l)).collect::<Vec<_>>(),
        );
        let positive = report.class(1).copied().unwrap_or(ClassMetrics {
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            support: 0,
        });

        Self {
            auc_roc: roc_auc(probabilities, labels),
            pr_auc: average_precision(probabilities, labels),
            precision: positive.precision,
            recall: positive.recall,
            f1_score: positive.f1_score,
            accuracy: report.accuracy,
            threshold: policy.threshold,
            confusion: ConfusionMatrix::from_predictions(labels, &predicted),
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_calculation() {
        // Perfect separation
        assert_eq!(roc_auc(&[1.0, 2.0, 3.0, 4.0], &[0, 0, 1, 1]), 1.0);
        // Ties between classes
        assert_eq!(roc_auc(&[1.0, 1.0, 2.0, 2.0], &[0, 1, 0, 1]), 0.5);
        // Alternating: 3 of 4 positive/negative pairs ordered correctly
        assert_eq!(roc_auc(&[1.0, 2.0, 3.0, 4.0], &[0, 1, 0, 1]), 0.75);
        // Single class
        assert_eq!(roc_auc(&[0.1, 0.2], &[1, 1]), 0.5);
    }

    #[test]
    fn test_auc_ovr() {
        let probs = vec![
            vec![0.8, 0.1, 0.1],
            vec![0.1, 0.8, 0.1],
            vec![0.1, 0.1, 0.8],
            vec![0.7, 0.2, 0.1],
        ];
        assert_eq!(roc_auc_ovr(&probs, &[0, 1, 2, 0]), 1.0);
    }

    #[test]
    fn test_auc_ovr_two_classes_matches_binary() {
        let p = [0.1, 0.2, 0.3, 0.4];
        let rows: Vec<Vec<f64>> = p.iter().map(|&x| vec![1.0 - x, x]).collect();
        assert_eq!(roc_auc_ovr(&rows, &[0, 1, 0, 1]), roc_auc(&p, &[0, 1, 0, 1]));
        assert_eq!(roc_auc_ovr(&rows, &[0, 1, 0, 1]), 0.75);
    }

    #[test]
    fn test_average_precision() {
        assert_eq!(average_precision(&[0.9, 0.8, 0.1], &[1, 1, 0]), 1.0);
        // Ranking 1,0,1: AP = 0.5*1 + 0.5*(2/3)
        let ap = average_precision(&[0.9, 0.5, 0.4], &[1, 0, 1]);
        assert!((ap - (0.5 + 1.0 / 3.0)).abs() < 1e-12);
        assert_eq!(average_precision(&[0.3], &[0]), 0.0);
    }

    #[test]
    fn test_classification_report() {
        let report = classification_report(&[0, 0, 1, 1], &[0, 1, 1, 1]);
        let zero = report.class(0).unwrap();
        let one = report.class(1).unwrap();
        assert_eq!(zero.precision, 1.0);
        assert_eq!(zero.recall, 0.5);
        assert!((one.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(one.recall, 1.0);
        assert_eq!(report.accuracy, 0.75);
        assert_eq!(report.macro_avg.support, 4);
        assert!((report.macro_avg.recall - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_and_threshold_f1() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1, 0], &[1, 1, 0, 0]);
        assert_eq!(cm.true_positive, 1);
        assert_eq!(cm.false_positive, 1);
        assert_eq!(cm.false_negative, 1);
        assert_eq!(cm.true_negative, 1);

        // At 0.30 both positives are caught and both negatives rejected
        let f1 = f1_at_threshold(&[0.35, 0.31, 0.29, 0.1], &[1, 1, 0, 0], 0.30);
        assert_eq!(f1, 1.0);
        assert_eq!(f1_at_threshold(&[0.1, 0.1], &[1, 0], 0.30), 0.0);
    }

    #[test]
    fn test_roc_curve_endpoints() {
        let curve = roc_curve(&[0.9, 0.4, 0.6, 0.1], &[1, 0, 1, 0]);
        assert_eq!(curve.first().map(|p| (p.fpr, p.tpr)), Some((0.0, 0.0)));
        assert_eq!(curve.last().map(|p| (p.fpr, p.tpr)), Some((1.0, 1.0)));
        assert_eq!(curve.len(), 5);
    }

    #[test]
    fn test_evaluation_uses_policy_threshold() {
        let policy = DecisionPolicy::default();
        let metrics = EvaluationMetrics::compute(&[0.31, 0.29, 0.9, 0.05], &[1, 1, 0, 0], &policy);
        assert_eq!(metrics.confusion.true_positive, 1);
        assert_eq!(metrics.confusion.false_positive, 1);
        assert_eq!(metrics.recall, 0.5);
        assert_eq!(metrics.threshold, 0.30);
    }
}
