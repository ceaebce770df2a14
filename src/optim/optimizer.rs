//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms.
pub trait Optimizer {
    /// Perform a single optimization step over the given parameters.
    fn step(&mut self, params: &mut [Tensor]);

    /// Zero out all gradients.
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Drop all per-parameter state (momenta, moment estimates).
    ///
    /// Called when a trainer is re-bound to a fresh parameter set, so state
    /// accumulated for the previous parameters cannot leak into the next
    /// run.
    fn reset(&mut self);

    /// Get learning rate.
    fn lr(&self) -> f32;

    /// Set learning rate.
    fn set_lr(&mut self, lr: f32);
}
