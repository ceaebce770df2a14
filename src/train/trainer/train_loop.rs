//! Multi-epoch training loop

use super::core::Trainer;
use super::result::TrainResult;
use crate::optim::clip_grad_norm;
use crate::train::callback::CallbackAction;
use crate::train::Batch;
use crate::Tensor;
use std::time::Instant;

impl Trainer {
    /// Train for `config.max_epochs` epochs with full callback support.
    ///
    /// `batch_fn` supplies the batches for each epoch; `forward_fn` computes
    /// predictions from inputs. The loop honors gradient accumulation,
    /// gradient clipping, the optional global step budget
    /// (`config.max_steps`), and the pre-fit sanity check
    /// (`config.sanity_batches` forward-only passes).
    pub fn train<F, B, I>(&mut self, batch_fn: B, forward_fn: F) -> TrainResult
    where
        F: Fn(&Tensor) -> Tensor,
        B: Fn() -> I,
        I: IntoIterator<Item = Batch>,
    {
        self.start_time = Some(Instant::now());
        self.best_loss = None;
        let max_epochs = self.config.max_epochs;
        let mut stopped_early = false;
        let mut budget_reached = false;
        let mut final_loss = 0.0;

        if self.config.sanity_batches > 0 {
            self.sanity_check(&batch_fn, &forward_fn);
        }

        let ctx = self.build_context(0, 0, 0, 0.0);
        if self.callbacks.on_train_begin(&ctx) == CallbackAction::Stop {
            return TrainResult {
                final_epoch: 0,
                final_loss: 0.0,
                best_loss: 0.0,
                stopped_early: true,
                elapsed_secs: self.elapsed(),
            };
        }

        'epochs: for epoch in 0..max_epochs {
            let ctx = self.build_context(epoch, 0, 0, final_loss);
            match self.callbacks.on_epoch_begin(&ctx) {
                CallbackAction::Stop => {
                    stopped_early = true;
                    break;
                }
                CallbackAction::SkipEpoch => continue,
                CallbackAction::Continue => {}
            }

            let batches: Vec<Batch> = batch_fn().into_iter().collect();
            let steps_per_epoch = batches.len();
            let accum_steps = self.config.gradient_accumulation_steps.max(1);
            let mut total_loss = 0.0;
            let mut num_batches = 0;

            for (step, batch) in batches.into_iter().enumerate() {
                if let Some(max_steps) = self.config.max_steps {
                    if self.metrics.steps >= max_steps {
                        budget_reached = true;
                        break 'epochs;
                    }
                }

                let ctx = self.build_context(epoch, step, steps_per_epoch, final_loss);
                if self.callbacks.on_step_begin(&ctx) == CallbackAction::Stop {
                    stopped_early = true;
                    break 'epochs;
                }

                if step % accum_steps == 0 {
                    self.optimizer.zero_grad(&mut self.params);
                }

                let loss = self.accumulate_gradients(&batch, &forward_fn);
                total_loss += loss;
                num_batches += 1;

                let is_accum_boundary = (step + 1) % accum_steps == 0;
                let is_last_batch = step + 1 == steps_per_epoch;
                if is_accum_boundary || is_last_batch {
                    if let Some(max_norm) = self.config.max_grad_norm {
                        clip_grad_norm(&mut self.params, max_norm);
                    }
                    self.optimizer.step(&mut self.params);
                }

                self.metrics.increment_step();

                let ctx = self.build_context(epoch, step, steps_per_epoch, loss);
                if self.callbacks.on_step_end(&ctx) == CallbackAction::Stop {
                    stopped_early = true;
                    break 'epochs;
                }
            }

            let avg_loss = if num_batches > 0 {
                total_loss / num_batches as f32
            } else {
                0.0
            };
            final_loss = avg_loss;

            if self.best_loss.is_none_or(|best| avg_loss < best) {
                self.best_loss = Some(avg_loss);
            }
            self.metrics.record_epoch(avg_loss, self.lr());

            let ctx = self.build_context(epoch, steps_per_epoch, steps_per_epoch, avg_loss);
            if self.callbacks.on_epoch_end(&ctx) == CallbackAction::Stop {
                stopped_early = true;
                break;
            }
        }

        let ctx = self.build_context(self.metrics.epoch, 0, 0, final_loss);
        self.callbacks.on_train_end(&ctx);

        TrainResult {
            final_epoch: self.metrics.epoch,
            final_loss,
            best_loss: self.best_loss.unwrap_or(final_loss),
            stopped_early: stopped_early || budget_reached,
            elapsed_secs: self.elapsed(),
        }
    }

    /// Forward-only pass over the first `config.sanity_batches` batches.
    /// Catches shape and loss-wiring errors before any parameter moves.
    fn sanity_check<F, B, I>(&mut self, batch_fn: &B, forward_fn: &F)
    where
        F: Fn(&Tensor) -> Tensor,
        B: Fn() -> I,
        I: IntoIterator<Item = Batch>,
    {
        assert!(
            self.loss_fn.is_some(),
            "loss function must be set before training"
        );
        for batch in batch_fn().into_iter().take(self.config.sanity_batches) {
            let predictions = forward_fn(&batch.inputs);
            let loss = self
                .loss_fn
                .as_ref()
                .expect("checked above")
                .forward(&predictions, &batch.targets);
            assert!(
                loss.data()[0].is_finite(),
                "sanity check produced a non-finite loss"
            );
        }
        // The check must not leave gradients behind.
        self.optimizer.zero_grad(&mut self.params);
    }

    fn elapsed(&self) -> f64 {
        self.start_time.map_or(0.0, |t| t.elapsed().as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use crate::optim::SGD;
    use crate::train::{Batch, MSELoss, TrainConfig, Trainer};
    use crate::Tensor;

    fn identity_batches() -> Vec<Batch> {
        vec![Batch::new(
            Tensor::from_vec(vec![1.0, 2.0], false),
            Tensor::from_vec(vec![0.0, 0.0], false),
        )]
    }

    #[test]
    fn test_train_runs_all_epochs() {
        let params = vec![Tensor::from_vec(vec![0.5, 0.5], true)];
        let forward_param = params[0].clone();
        let mut trainer = Trainer::new(
            params,
            Box::new(SGD::new(0.1, 0.0)),
            TrainConfig::new().with_max_epochs(3).with_log_interval(1000),
        );
        trainer.set_loss(Box::new(MSELoss));

        // Predict the parameter itself: loss pulls it toward zero.
        let result = trainer.train(identity_batches, move |_x| forward_param.clone());

        assert_eq!(result.final_epoch, 3);
        assert!(!result.stopped_early);
        assert!(result.final_loss < 0.25, "loss should decrease from 0.25");
    }

    #[test]
    fn test_train_respects_step_budget() {
        let params = vec![Tensor::from_vec(vec![0.5], true)];
        let forward_param = params[0].clone();
        let mut trainer = Trainer::new(
            params,
            Box::new(SGD::new(0.01, 0.0)),
            TrainConfig::new().with_max_epochs(100).with_max_steps(5),
        );
        trainer.config.sanity_batches = 0;
        trainer.set_loss(Box::new(MSELoss));

        let batches = || {
            vec![
                Batch::new(Tensor::from_vec(vec![1.0], false), Tensor::zeros(1, false));
                3
            ]
        };
        let result = trainer.train(batches, move |_x| forward_param.clone());

        assert_eq!(trainer.metrics.steps, 5);
        assert!(result.stopped_early);
    }

    #[test]
    fn test_sanity_check_leaves_no_grads() {
        let params = vec![Tensor::from_vec(vec![0.5, 0.5], true)];
        let forward_param = params[0].clone();
        let mut trainer = Trainer::new(
            params,
            Box::new(SGD::new(0.0, 0.0)),
            TrainConfig::new().with_max_epochs(0),
        );
        trainer.config.sanity_batches = 2;
        trainer.set_loss(Box::new(MSELoss));

        trainer.train(identity_batches, move |_x| forward_param.clone());
        assert!(trainer.params()[0].grad().is_none());
    }
}
