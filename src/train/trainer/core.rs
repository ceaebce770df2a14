//! Core Trainer struct and basic methods

use crate::optim::Optimizer;
use crate::train::callback::{CallbackContext, CallbackManager, TrainerCallback};
use crate::train::{LossFn, MetricsTracker, TrainConfig};
use crate::Tensor;
use std::time::Instant;

/// High-level trainer that orchestrates the fit loop.
///
/// A trainer owns a *binding* to a parameter set, an optimizer, a config and
/// a callback list. The same type serves as the outer training engine and as
/// the nested evaluation trainer: a nested instance is built from
/// [`TrainConfig::eval_copy`] and re-bound to each fresh evaluation
/// classifier via [`bind`](Trainer::bind).
pub struct Trainer {
    /// Bound model parameters
    pub(crate) params: Vec<Tensor>,

    /// Optimizer
    pub(crate) optimizer: Box<dyn Optimizer>,

    /// Loss function
    pub(crate) loss_fn: Option<Box<dyn LossFn>>,

    /// Training configuration
    pub(crate) config: TrainConfig,

    /// Metrics tracker
    pub metrics: MetricsTracker,

    /// Callback manager
    pub(crate) callbacks: CallbackManager,

    /// Best loss achieved during training
    pub(crate) best_loss: Option<f32>,

    /// Training start time
    pub(crate) start_time: Option<Instant>,
}

impl Trainer {
    /// Create a new trainer bound to `params`.
    pub fn new(params: Vec<Tensor>, optimizer: Box<dyn Optimizer>, config: TrainConfig) -> Self {
        Self {
            params,
            optimizer,
            loss_fn: None,
            config,
            metrics: MetricsTracker::new(),
            callbacks: CallbackManager::new(),
            best_loss: None,
            start_time: None,
        }
    }

    /// Re-bind the trainer to a fresh parameter set.
    ///
    /// Clears optimizer state and run metrics so nothing accumulated for the
    /// previous parameters leaks into the next fit.
    pub fn bind(&mut self, params: Vec<Tensor>) {
        self.params = params;
        self.optimizer.reset();
        self.metrics = MetricsTracker::new();
        self.best_loss = None;
    }

    /// Set the loss function.
    pub fn set_loss(&mut self, loss_fn: Box<dyn LossFn>) {
        self.loss_fn = Some(loss_fn);
    }

    /// Add a callback to the trainer.
    pub fn add_callback<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.add(callback);
    }

    /// Get current learning rate.
    pub fn lr(&self) -> f32 {
        self.optimizer.lr()
    }

    /// Set learning rate.
    pub fn set_lr(&mut self, lr: f32) {
        self.optimizer.set_lr(lr);
    }

    /// Get reference to bound parameters.
    pub fn params(&self) -> &[Tensor] {
        &self.params
    }

    /// Get the training configuration.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Get reference to callback manager.
    pub fn callbacks(&self) -> &CallbackManager {
        &self.callbacks
    }

    /// Get mutable reference to callback manager.
    pub fn callbacks_mut(&mut self) -> &mut CallbackManager {
        &mut self.callbacks
    }

    /// Build callback context from current state.
    pub(crate) fn build_context(
        &self,
        epoch: usize,
        step: usize,
        steps_per_epoch: usize,
        loss: f32,
    ) -> CallbackContext {
        CallbackContext {
            epoch,
            max_epochs: self.config.max_epochs,
            step,
            steps_per_epoch,
            global_step: self.metrics.steps,
            loss,
            lr: self.lr(),
            best_loss: self.best_loss,
            elapsed_secs: self.start_time.map_or(0.0, |t| t.elapsed().as_secs_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::SGD;

    #[test]
    fn test_trainer_creation() {
        let params = vec![Tensor::zeros(10, true)];
        let optimizer = SGD::new(0.001, 0.0);
        let trainer = Trainer::new(params, Box::new(optimizer), TrainConfig::default());

        assert_eq!(trainer.params().len(), 1);
        assert_eq!(trainer.lr(), 0.001);
    }

    #[test]
    fn test_set_lr() {
        let mut trainer = Trainer::new(
            vec![Tensor::zeros(10, true)],
            Box::new(SGD::new(0.001, 0.0)),
            TrainConfig::default(),
        );
        trainer.set_lr(0.01);
        assert_eq!(trainer.lr(), 0.01);
    }

    #[test]
    fn test_bind_replaces_params_and_resets_metrics() {
        let mut trainer = Trainer::new(
            vec![Tensor::zeros(2, true)],
            Box::new(SGD::new(0.1, 0.9)),
            TrainConfig::default(),
        );
        trainer.metrics.increment_step();

        let fresh = vec![Tensor::zeros(4, true), Tensor::zeros(4, true)];
        trainer.bind(fresh);

        assert_eq!(trainer.params().len(), 2);
        assert_eq!(trainer.metrics.steps, 0);
    }

    #[test]
    fn test_add_callback() {
        use crate::train::ProgressCallback;

        let mut trainer = Trainer::new(
            vec![Tensor::zeros(10, true)],
            Box::new(SGD::new(0.001, 0.0)),
            TrainConfig::default(),
        );
        assert!(trainer.callbacks().is_empty());
        trainer.add_callback(ProgressCallback::new(5));
        assert!(!trainer.callbacks().is_empty());
    }
}
