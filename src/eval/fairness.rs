//! Fairness metrics over sensitive-attribute groups
//!
//! Splits a classification result by the sensitive attribute and reports
//! the classic gap metrics. The positive class is label 1; gaps are the
//! max-min spread of a per-group rate, so 0 is perfectly fair.

use crate::eval::classification::ConfusionMatrix;
use std::collections::BTreeMap;

/// Per-group classification results plus the derived gap metrics.
#[derive(Clone, Debug)]
pub struct FairnessReport {
    /// Largest spread in positive-prediction rate across groups.
    pub demographic_parity_gap: f64,
    /// Largest spread in true-positive rate across groups.
    pub equal_opportunity_gap: f64,
    /// Largest spread in accuracy across groups.
    pub accuracy_parity_gap: f64,
    /// Sample count per group, keyed by attribute value.
    pub group_sizes: Vec<(i64, usize)>,
}

/// Positive class for rate-based fairness metrics.
const POSITIVE: usize = 1;

/// Split predictions by group and compute the gap metrics.
///
/// # Panics
///
/// Panics when the slices differ in length, or when fewer than two groups
/// are present (gaps are undefined for a single group).
pub fn fairness_report(
    y_pred: &[usize],
    y_true: &[usize],
    groups: &[i64],
    n_classes: usize,
) -> FairnessReport {
    assert_eq!(y_pred.len(), y_true.len(), "prediction/target length mismatch");
    assert_eq!(y_pred.len(), groups.len(), "prediction/group length mismatch");

    let mut per_group: BTreeMap<i64, ConfusionMatrix> = BTreeMap::new();
    for ((&pred, &truth), &group) in y_pred.iter().zip(y_true.iter()).zip(groups.iter()) {
        per_group
            .entry(group)
            .or_insert_with(|| ConfusionMatrix::new(n_classes))
            .record(pred, truth);
    }
    assert!(
        per_group.len() >= 2,
        "fairness gaps require at least two sensitive-attribute groups, got {}",
        per_group.len()
    );

    let selection_rates: Vec<f64> = per_group
        .values()
        .map(|cm| cm.selection_rate(POSITIVE))
        .collect();
    let recalls: Vec<f64> = per_group.values().map(|cm| cm.recall(POSITIVE)).collect();
    let accuracies: Vec<f64> = per_group.values().map(ConfusionMatrix::accuracy).collect();

    FairnessReport {
        demographic_parity_gap: spread(&selection_rates),
        equal_opportunity_gap: spread(&recalls),
        accuracy_parity_gap: spread(&accuracies),
        group_sizes: per_group
            .iter()
            .map(|(&g, cm)| (g, cm.total()))
            .collect(),
    }
}

fn spread(rates: &[f64]) -> f64 {
    let max = rates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = rates.iter().cloned().fold(f64::INFINITY, f64::min);
    max - min
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identical_groups_have_zero_gaps() {
        // Both groups see the same predictions and truths.
        let y_pred = [0, 1, 0, 1];
        let y_true = [0, 1, 0, 1];
        let groups = [0, 0, 1, 1];
        let report = fairness_report(&y_pred, &y_true, &groups, 2);

        assert_abs_diff_eq!(report.demographic_parity_gap, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(report.equal_opportunity_gap, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(report.accuracy_parity_gap, 0.0, epsilon = 1e-9);
        assert_eq!(report.group_sizes, vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_demographic_parity_gap_arithmetic() {
        // Group 0: positives predicted for 2 of 4; group 1: 1 of 4.
        let y_pred = [1, 1, 0, 0, 1, 0, 0, 0];
        let y_true = [1, 1, 0, 0, 1, 1, 0, 0];
        let groups = [0, 0, 0, 0, 1, 1, 1, 1];
        let report = fairness_report(&y_pred, &y_true, &groups, 2);

        assert_abs_diff_eq!(report.demographic_parity_gap, 0.25, epsilon = 1e-9);
        // TPR: group 0 = 1.0, group 1 = 0.5
        assert_abs_diff_eq!(report.equal_opportunity_gap, 0.5, epsilon = 1e-9);
    }

    #[test]
    #[should_panic(expected = "at least two")]
    fn test_single_group_panics() {
        fairness_report(&[0, 1], &[0, 1], &[0, 0], 2);
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn test_length_mismatch_panics() {
        fairness_report(&[0, 1], &[0, 1], &[0], 2);
    }
}
