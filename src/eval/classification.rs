//! Classification metrics
//!
//! Confusion-matrix based metrics for the downstream evaluation classifier:
//! accuracy, per-class precision/recall/F1, and macro aggregates.

use ndarray::Array2;
use std::fmt;

/// Confusion matrix for multi-class classification.
///
/// Element `[i, j]` counts samples with true label `i` predicted as `j`.
#[derive(Clone, Debug)]
pub struct ConfusionMatrix {
    counts: Array2<usize>,
    n_classes: usize,
}

impl ConfusionMatrix {
    /// An empty matrix over `n_classes` labels.
    pub fn new(n_classes: usize) -> Self {
        assert!(n_classes > 0, "class count must be > 0");
        Self {
            counts: Array2::zeros((n_classes, n_classes)),
            n_classes,
        }
    }

    /// Build from prediction/truth pairs.
    ///
    /// # Panics
    ///
    /// Panics when the slices differ in length or a label falls outside
    /// `0..n_classes`.
    pub fn from_predictions(y_pred: &[usize], y_true: &[usize], n_classes: usize) -> Self {
        assert_eq!(
            y_pred.len(),
            y_true.len(),
            "predictions and targets must have the same length"
        );
        let mut cm = Self::new(n_classes);
        for (&pred, &truth) in y_pred.iter().zip(y_true.iter()) {
            assert!(
                pred < n_classes && truth < n_classes,
                "label out of range: pred={pred}, true={truth}, classes={n_classes}"
            );
            cm.counts[(truth, pred)] += 1;
        }
        cm
    }

    /// Record one observation.
    pub fn record(&mut self, y_pred: usize, y_true: usize) {
        self.counts[(y_true, y_pred)] += 1;
    }

    /// Merge another matrix of the same shape into this one.
    pub fn merge(&mut self, other: &ConfusionMatrix) {
        assert_eq!(self.n_classes, other.n_classes, "class count mismatch");
        self.counts = &self.counts + &other.counts;
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Count at `[true_label, predicted_label]`.
    pub fn get(&self, true_label: usize, predicted_label: usize) -> usize {
        self.counts[(true_label, predicted_label)]
    }

    /// Total number of samples.
    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    /// True instances of a class.
    pub fn support(&self, class: usize) -> usize {
        self.counts.row(class).sum()
    }

    /// Fraction of predictions for `class` that were positive, i.e. how
    /// often the model selected this class.
    pub fn selection_rate(&self, class: usize) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.counts.column(class).sum() as f64 / total as f64
    }

    /// Overall accuracy.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.n_classes).map(|i| self.counts[(i, i)]).sum();
        correct as f64 / total as f64
    }

    /// Precision for one class.
    pub fn precision(&self, class: usize) -> f64 {
        let predicted = self.counts.column(class).sum();
        if predicted == 0 {
            return 0.0;
        }
        self.counts[(class, class)] as f64 / predicted as f64
    }

    /// Recall (true-positive rate) for one class.
    pub fn recall(&self, class: usize) -> f64 {
        let actual = self.support(class);
        if actual == 0 {
            return 0.0;
        }
        self.counts[(class, class)] as f64 / actual as f64
    }

    /// F1 for one class.
    pub fn f1(&self, class: usize) -> f64 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 {
            return 0.0;
        }
        2.0 * p * r / (p + r)
    }

    /// Unweighted mean F1 over all classes.
    pub fn macro_f1(&self) -> f64 {
        (0..self.n_classes).map(|c| self.f1(c)).sum::<f64>() / self.n_classes as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "confusion matrix ({} classes):", self.n_classes)?;
        for i in 0..self.n_classes {
            for j in 0..self.n_classes {
                write!(f, "{:>6}", self.counts[(i, j)])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
