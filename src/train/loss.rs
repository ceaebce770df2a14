//! Loss functions for training

use crate::autograd::BackwardOp;
use crate::Tensor;
use ndarray::Array1;
use std::rc::Rc;

/// Trait for loss functions.
pub trait LossFn {
    /// Compute loss given predictions and targets.
    ///
    /// Returns a scalar loss tensor with a backward op that accumulates the
    /// gradient into the predictions.
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor;

    /// Name of the loss function.
    fn name(&self) -> &str;
}

/// Backward op that pushes a precomputed gradient into the prediction
/// tensor's grad cell and continues down its tape.
pub(crate) struct PrecomputedGrad {
    pred: Tensor,
    grad: Array1<f32>,
}

impl PrecomputedGrad {
    pub(crate) fn attach(loss: &mut Tensor, pred: &Tensor, grad: Array1<f32>) {
        if pred.requires_grad() {
            loss.set_backward_op(Rc::new(PrecomputedGrad {
                pred: pred.clone(),
                grad,
            }));
        }
    }
}

impl BackwardOp for PrecomputedGrad {
    fn backward(&self) {
        self.pred.accumulate_grad(self.grad.clone());
        if let Some(op) = self.pred.backward_op() {
            op.backward();
        }
    }
}

/// Mean Squared Error loss: `L = mean((predictions - targets)^2)`.
pub struct MSELoss;

impl LossFn for MSELoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "predictions and targets must have the same length"
        );

        let diff = &*predictions.data() - &*targets.data();
        let mse = (&diff * &diff).mean().unwrap_or(0.0);
        let mut loss = Tensor::from_vec(vec![mse], true);

        // d(MSE)/d(pred) = 2 * (pred - target) / n
        let n = predictions.len() as f32;
        PrecomputedGrad::attach(&mut loss, predictions, &diff * (2.0 / n));
        loss
    }

    fn name(&self) -> &'static str {
        "MSE"
    }
}

/// Batched cross-entropy over logits.
///
/// Predictions are `batch * classes` logits row-major; targets are one-hot
/// rows of the same shape. The loss is the mean over rows of
/// `-sum(target * log softmax(logits))`.
pub struct CrossEntropyLoss {
    classes: usize,
}

impl CrossEntropyLoss {
    /// Create a cross-entropy loss over `classes` categories.
    pub fn new(classes: usize) -> Self {
        assert!(classes > 0, "class count must be > 0");
        Self { classes }
    }

    fn softmax_row(row: &[f32]) -> Vec<f32> {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let exps: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }
}

impl LossFn for CrossEntropyLoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "predictions and targets must have the same length"
        );
        assert_eq!(
            predictions.len() % self.classes,
            0,
            "prediction length {} is not a multiple of class count {}",
            predictions.len(),
            self.classes
        );

        let batch = predictions.len() / self.classes;
        let preds = predictions.to_vec();
        let targ = targets.to_vec();

        let mut total = 0.0f32;
        let mut grad = vec![0.0f32; preds.len()];
        for bi in 0..batch {
            let lo = bi * self.classes;
            let hi = lo + self.classes;
            let probs = Self::softmax_row(&preds[lo..hi]);
            for (k, &p) in probs.iter().enumerate() {
                total -= targ[lo + k] * (p + 1e-10).ln();
                // d(CE)/d(logits) = (probs - targets) / batch
                grad[lo + k] = (p - targ[lo + k]) / batch as f32;
            }
        }

        let mut loss = Tensor::from_vec(vec![total / batch as f32], true);
        PrecomputedGrad::attach(&mut loss, predictions, Array1::from_vec(grad));
        loss
    }

    fn name(&self) -> &'static str {
        "CrossEntropy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mse_value_and_grad() {
        let pred = Tensor::from_vec(vec![1.0, 2.0], true);
        let target = Tensor::from_vec(vec![0.0, 0.0], false);
        let mut loss = MSELoss.forward(&pred, &target);
        assert_abs_diff_eq!(loss.data()[0], 2.5, epsilon = 1e-6);

        backward(&mut loss, None);
        let grad = pred.grad().unwrap();
        assert_abs_diff_eq!(grad[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[1], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cross_entropy_prefers_correct_class() {
        let loss_fn = CrossEntropyLoss::new(2);
        let good = Tensor::from_vec(vec![5.0, -5.0], true);
        let bad = Tensor::from_vec(vec![-5.0, 5.0], true);
        let target = Tensor::from_vec(vec![1.0, 0.0], false);

        let l_good = loss_fn.forward(&good, &target).data()[0];
        let l_bad = loss_fn.forward(&bad, &target).data()[0];
        assert!(l_good < l_bad);
    }

    #[test]
    fn test_cross_entropy_batched_grad_shape() {
        let loss_fn = CrossEntropyLoss::new(3);
        let pred = Tensor::from_vec(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0], true);
        let target = Tensor::from_vec(vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0], false);
        let mut loss = loss_fn.forward(&pred, &target);
        backward(&mut loss, None);

        let grad = pred.grad().unwrap();
        assert_eq!(grad.len(), 6);
        // Gradient rows sum to ~0 for the correct-class row structure
        let row0: f32 = grad.iter().take(3).sum();
        assert_abs_diff_eq!(row0, 0.0, epsilon = 1e-5);
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn test_mse_length_mismatch_panics() {
        let pred = Tensor::zeros(2, true);
        let target = Tensor::zeros(3, false);
        MSELoss.forward(&pred, &target);
    }
}
