//! Early stopping callback

use super::traits::{CallbackAction, CallbackContext, TrainerCallback};

/// Stop training when the epoch loss stops improving.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best: Option<f32>,
    stale_epochs: usize,
}

impl EarlyStopping {
    /// Create with a patience (epochs without improvement tolerated) and a
    /// minimum improvement delta.
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best: None,
            stale_epochs: 0,
        }
    }
}

impl TrainerCallback for EarlyStopping {
    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let improved = match self.best {
            None => true,
            Some(best) => ctx.loss < best - self.min_delta,
        };
        if improved {
            self.best = Some(ctx.loss);
            self.stale_epochs = 0;
            CallbackAction::Continue
        } else {
            self.stale_epochs += 1;
            if self.stale_epochs >= self.patience {
                CallbackAction::Stop
            } else {
                CallbackAction::Continue
            }
        }
    }

    fn name(&self) -> &'static str {
        "EarlyStopping"
    }
}
