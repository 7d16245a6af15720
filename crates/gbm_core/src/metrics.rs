//! Evaluation metrics for binary classification
//!
//! Every metric takes 0/1 labels and predicted probabilities of the positive
//! class.

use crate::errors::{BoostError, Result};

/// Probabilities are clamped to `[EPSILON, 1 - EPSILON]` before taking logs.
const LOGLOSS_EPSILON: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Fraction of rows classified correctly at the 0.5 cut
    Accuracy,
    /// Fraction of rows classified incorrectly at the 0.5 cut
    BinaryError,
    /// Area under the ROC curve
    Auc,
    /// Mean negative log-likelihood
    BinaryLogloss,
}

impl MetricKind {
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Accuracy => "accuracy",
            MetricKind::BinaryError => "binary_error",
            MetricKind::Auc => "auc",
            MetricKind::BinaryLogloss => "binary_logloss",
        }
    }

    /// Parse a single metric name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "accuracy" => Ok(MetricKind::Accuracy),
            "binary_error" => Ok(MetricKind::BinaryError),
            "auc" => Ok(MetricKind::Auc),
            "binary_logloss" | "binary" | "logloss" => Ok(MetricKind::BinaryLogloss),
            other => Err(BoostError::InvalidParameter(format!(
                "unknown metric: {other}"
            ))),
        }
    }

    /// Parse a comma-separated metric list, dropping duplicates.
    pub fn parse_list(value: &str) -> Result<Vec<Self>> {
        let mut metrics = Vec::new();
        for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if matches!(name, "none" | "null" | "na") {
                continue;
            }
            let metric = Self::parse(name)?;
            if !metrics.contains(&metric) {
                metrics.push(metric);
            }
        }
        Ok(metrics)
    }

    pub fn higher_is_better(&self) -> bool {
        matches!(self, MetricKind::Accuracy | MetricKind::Auc)
    }

    /// Evaluate the metric; `labels` and `probs` must have equal length.
    pub fn evaluate(&self, labels: &[f32], probs: &[f64]) -> f64 {
        debug_assert_eq!(labels.len(), probs.len());
        match self {
            MetricKind::Accuracy => 1.0 - binary_error(labels, probs),
            MetricKind::BinaryError => binary_error(labels, probs),
            MetricKind::Auc => auc(labels, probs),
            MetricKind::BinaryLogloss => binary_logloss(labels, probs),
        }
    }
}

fn is_positive(label: f32) -> bool {
    label > 0.0
}

fn binary_error(labels: &[f32], probs: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let wrong = labels
        .iter()
        .zip(probs)
        .filter(|(label, prob)| (**prob > 0.5) != is_positive(**label))
        .count();
    wrong as f64 / labels.len() as f64
}

fn binary_logloss(labels: &[f32], probs: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probs)
        .map(|(&label, &prob)| {
            let prob = prob.clamp(LOGLOSS_EPSILON, 1.0 - LOGLOSS_EPSILON);
            if is_positive(label) {
                -prob.ln()
            } else {
                -(1.0 - prob).ln()
            }
        })
        .sum();
    total / labels.len() as f64
}

/// Rank-based AUC; tied scores count as half. Returns 1.0 when only one
/// class is present.
fn auc(labels: &[f32], probs: &[f64]) -> f64 {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut negatives_below = 0.0f64;
    let mut accum = 0.0f64;
    let mut total_pos = 0.0f64;

    let mut i = 0;
    while i < order.len() {
        let score = probs[order[i]];
        let mut pos_in_group = 0.0;
        let mut neg_in_group = 0.0;
        while i < order.len() && probs[order[i]] == score {
            if is_positive(labels[order[i]]) {
                pos_in_group += 1.0;
            } else {
                neg_in_group += 1.0;
            }
            i += 1;
        }
        accum += pos_in_group * (negatives_below + 0.5 * neg_in_group);
        negatives_below += neg_in_group;
        total_pos += pos_in_group;
    }

    let total_neg = negatives_below;
    if total_pos == 0.0 || total_neg == 0.0 {
        return 1.0;
    }
    accum / (total_pos * total_neg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_accuracy_and_error() {
        let labels = [1.0, 0.0, 1.0, 0.0];
        let probs = [0.9, 0.2, 0.4, 0.5];

        // 0.4 misclassifies a positive; 0.5 is not above the cut so it is negative
        assert!(approx_eq(MetricKind::BinaryError.evaluate(&labels, &probs), 0.25));
        assert!(approx_eq(MetricKind::Accuracy.evaluate(&labels, &probs), 0.75));
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert!(approx_eq(MetricKind::Auc.evaluate(&labels, &[0.1, 0.2, 0.8, 0.9]), 1.0));
        assert!(approx_eq(MetricKind::Auc.evaluate(&labels, &[0.9, 0.8, 0.2, 0.1]), 0.0));
    }

    #[test]
    fn test_auc_counts_ties_as_half() {
        let labels = [0.0, 1.0];
        assert!(approx_eq(MetricKind::Auc.evaluate(&labels, &[0.5, 0.5]), 0.5));

        // pairs: (p=0.7 vs n=0.3) win, (p=0.7 vs n=0.7) tie, (p=0.2 vs both) lose
        let labels = [1.0, 0.0, 1.0, 0.0];
        let probs = [0.7, 0.3, 0.2, 0.7];
        assert!(approx_eq(MetricKind::Auc.evaluate(&labels, &probs), 1.5 / 4.0));
    }

    #[test]
    fn test_auc_single_class() {
        assert_eq!(MetricKind::Auc.evaluate(&[1.0, 1.0], &[0.2, 0.9]), 1.0);
        assert_eq!(MetricKind::Auc.evaluate(&[], &[]), 1.0);
    }

    #[test]
    fn test_logloss() {
        let labels = [1.0, 0.0];
        let probs = [0.8, 0.4];
        let expected = (-(0.8f64).ln() - (0.6f64).ln()) / 2.0;
        assert!(approx_eq(MetricKind::BinaryLogloss.evaluate(&labels, &probs), expected));

        // certain but wrong predictions stay finite
        let clamped = MetricKind::BinaryLogloss.evaluate(&[1.0], &[0.0]);
        assert!(clamped.is_finite());
        assert!(clamped > 30.0);
    }

    #[test]
    fn test_parse_list() {
        let metrics = MetricKind::parse_list("auc, logloss,auc").unwrap();
        assert_eq!(metrics, vec![MetricKind::Auc, MetricKind::BinaryLogloss]);
        assert!(MetricKind::parse_list("none").unwrap().is_empty());
        assert!(MetricKind::parse_list("rmse").is_err());
    }

    #[test]
    fn test_direction() {
        assert!(MetricKind::Accuracy.higher_is_better());
        assert!(MetricKind::Auc.higher_is_better());
        assert!(!MetricKind::BinaryLogloss.higher_is_better());
        assert!(!MetricKind::BinaryError.higher_is_better());
    }
}
