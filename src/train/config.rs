//! Training configuration and metrics tracking

use serde::{Deserialize, Serialize};

/// Budgets and knobs for a fit loop.
///
/// A nested (evaluation) trainer is configured from an outer trainer's
/// config via [`eval_copy`](TrainConfig::eval_copy), which swaps the epoch
/// budget, clears the step budget, and disables the sanity check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Maximum number of epochs to run.
    pub max_epochs: usize,
    /// Optional global step budget; the loop stops once reached.
    pub max_steps: Option<usize>,
    /// Number of batches to dry-run (forward only) before fitting.
    /// 0 disables the check.
    pub sanity_batches: usize,
    /// Number of steps over which to accumulate gradients.
    pub gradient_accumulation_steps: usize,
    /// Optional global gradient-norm clip.
    pub max_grad_norm: Option<f32>,
    /// Step-logging interval for progress callbacks.
    pub log_interval: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_epochs: 10,
            max_steps: None,
            sanity_batches: 2,
            gradient_accumulation_steps: 1,
            max_grad_norm: None,
            log_interval: 10,
        }
    }
}

impl TrainConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the epoch budget.
    pub fn with_max_epochs(mut self, max_epochs: usize) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    /// Set the global step budget.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Set the logging interval.
    pub fn with_log_interval(mut self, log_interval: usize) -> Self {
        self.log_interval = log_interval;
        self
    }

    /// Set the gradient clip.
    pub fn with_max_grad_norm(mut self, max_norm: f32) -> Self {
        self.max_grad_norm = Some(max_norm);
        self
    }

    /// Derive the configuration of a nested evaluation trainer: epoch budget
    /// replaced by `eval_epochs`, step budget cleared, sanity check
    /// disabled. Everything else is inherited.
    pub fn eval_copy(&self, eval_epochs: usize) -> Self {
        Self {
            max_epochs: eval_epochs,
            max_steps: None,
            sanity_batches: 0,
            ..self.clone()
        }
    }
}

/// Step/epoch counters and loss history for a trainer.
#[derive(Clone, Debug, Default)]
pub struct MetricsTracker {
    /// Global optimizer-step count.
    pub steps: usize,
    /// Completed epoch count.
    pub epoch: usize,
    /// Mean training loss per epoch.
    pub loss_history: Vec<f32>,
    /// Learning rate per epoch.
    pub lr_history: Vec<f32>,
}

impl MetricsTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one optimizer step.
    pub fn increment_step(&mut self) {
        self.steps += 1;
    }

    /// Record a completed epoch.
    pub fn record_epoch(&mut self, loss: f32, lr: f32) {
        self.epoch += 1;
        self.loss_history.push(loss);
        self.lr_history.push(lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_copy_swaps_budgets() {
        let outer = TrainConfig::new()
            .with_max_epochs(50)
            .with_max_steps(1_000)
            .with_max_grad_norm(5.0);
        let nested = outer.eval_copy(7);

        assert_eq!(nested.max_epochs, 7);
        assert_eq!(nested.max_steps, None);
        assert_eq!(nested.sanity_batches, 0);
        // Inherited knobs survive
        assert_eq!(nested.max_grad_norm, Some(5.0));
        // The source is untouched
        assert_eq!(outer.max_epochs, 50);
        assert_eq!(outer.max_steps, Some(1_000));
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = TrainConfig::new().with_max_epochs(3).with_log_interval(100);
        let json = serde_json::to_string(&config).unwrap();
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_epochs, 3);
        assert_eq!(back.log_interval, 100);
    }

    #[test]
    fn test_metrics_tracker_records() {
        let mut tracker = MetricsTracker::new();
        tracker.increment_step();
        tracker.increment_step();
        tracker.record_epoch(0.5, 0.001);
        assert_eq!(tracker.steps, 2);
        assert_eq!(tracker.epoch, 1);
        assert_eq!(tracker.loss_history, vec![0.5]);
    }
}
