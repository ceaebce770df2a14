//! Progress callbacks
//!
//! `ProgressCallback` logs while training runs. `PostHocProgress` is the
//! lightweight indicator used by nested evaluation fits: it stays silent
//! during the run and prints a single summary line when the fit completes,
//! so a nested run does not interleave its output with the outer loop's.

use super::traits::{CallbackAction, CallbackContext, TrainerCallback};

/// Progress callback for logging training progress.
#[derive(Clone, Debug)]
pub struct ProgressCallback {
    /// Log every N steps
    log_interval: usize,
}

impl ProgressCallback {
    /// Create progress callback.
    pub fn new(log_interval: usize) -> Self {
        Self { log_interval }
    }
}

impl Default for ProgressCallback {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

impl TrainerCallback for ProgressCallback {
    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        println!(
            "Epoch {}/{}: loss: {:.4} ({:.1}s)",
            ctx.epoch + 1,
            ctx.max_epochs,
            ctx.loss,
            ctx.elapsed_secs
        );
        CallbackAction::Continue
    }

    fn on_step_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        if ctx.step > 0 && ctx.step % self.log_interval == 0 {
            println!(
                "  Step {}/{}: loss: {:.4}",
                ctx.step, ctx.steps_per_epoch, ctx.loss
            );
        }
        CallbackAction::Continue
    }

    fn name(&self) -> &'static str {
        "ProgressCallback"
    }
}

/// Post-hoc indicator for nested fits: one line at the end, nothing during.
#[derive(Clone, Debug, Default)]
pub struct PostHocProgress;

impl PostHocProgress {
    /// Create the indicator.
    pub fn new() -> Self {
        Self
    }
}

impl TrainerCallback for PostHocProgress {
    fn on_train_end(&mut self, ctx: &CallbackContext) {
        println!(
            "probe fit: {} epochs, final loss {:.4} ({:.1}s)",
            ctx.epoch, ctx.loss, ctx.elapsed_secs
        );
    }

    fn name(&self) -> &'static str {
        "PostHocProgress"
    }
}
