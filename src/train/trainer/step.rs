//! Training step operations

use super::core::Trainer;
use crate::optim::clip_grad_norm;
use crate::train::Batch;
use crate::Tensor;

impl Trainer {
    /// Perform a single training step: zero grads, forward, loss, backward,
    /// clip, optimizer step. Returns the scalar loss.
    ///
    /// # Panics
    ///
    /// Panics if no loss function has been set.
    pub fn train_step<F>(&mut self, batch: &Batch, forward_fn: F) -> f32
    where
        F: FnOnce(&Tensor) -> Tensor,
    {
        assert!(
            self.loss_fn.is_some(),
            "loss function must be set before training"
        );

        self.optimizer.zero_grad(&mut self.params);

        let predictions = forward_fn(&batch.inputs);
        let loss = self
            .loss_fn
            .as_ref()
            .expect("checked above")
            .forward(&predictions, &batch.targets);
        let loss_val = loss.data()[0];

        if let Some(backward_op) = loss.backward_op() {
            backward_op.backward();
        }

        if let Some(max_norm) = self.config.max_grad_norm {
            clip_grad_norm(&mut self.params, max_norm);
        }
        self.optimizer.step(&mut self.params);
        self.metrics.increment_step();

        loss_val
    }

    /// Forward and backward pass without an optimizer step, for gradient
    /// accumulation. Gradients build up across calls until `zero_grad`.
    pub(crate) fn accumulate_gradients<F>(&mut self, batch: &Batch, forward_fn: F) -> f32
    where
        F: FnOnce(&Tensor) -> Tensor,
    {
        assert!(
            self.loss_fn.is_some(),
            "loss function must be set before training"
        );

        let predictions = forward_fn(&batch.inputs);
        let loss = self
            .loss_fn
            .as_ref()
            .expect("checked above")
            .forward(&predictions, &batch.targets);
        let loss_val = loss.data()[0];

        if let Some(backward_op) = loss.backward_op() {
            backward_op.backward();
        }
        loss_val
    }
}
