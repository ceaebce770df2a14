//! Evaluation protocol orchestration
//!
//! Owns the nested trainer and the evaluation classifier, and runs the
//! pretrain-then-evaluate round: derive an evaluation data module, fit the
//! probe inside a blocking nested run, score it against the live module's
//! validation or test loaders, then discard the probe so no state survives
//! into the next round.

use crate::data::DataModule;
use crate::optim::AdamW;
use crate::selfsup::encoder::Encoder;
use crate::selfsup::probe::{to_supervised, EvalClassifier, EvalReport};
use crate::selfsup::Stage;
use crate::train::{Batch, CrossEntropyLoss, PostHocProgress, TrainConfig, Trainer};
use crate::transforms::ViewTransform;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Configuration of a self-supervised model's evaluation protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfSupConfig {
    /// Probe learning rate.
    pub lr: f32,
    /// Probe weight decay.
    pub weight_decay: f32,
    /// Training batch size for the evaluation data module copy; `None`
    /// inherits the live module's size.
    pub eval_batch_size: Option<usize>,
    /// Epoch budget for each nested probe fit.
    pub eval_epochs: usize,
}

impl Default for SelfSupConfig {
    fn default() -> Self {
        Self {
            lr: 3.0e-4,
            weight_decay: 0.0,
            eval_batch_size: None,
            eval_epochs: 100,
        }
    }
}

/// Protocol lifecycle. `Building` is the body of [`EvalProtocol::build`];
/// every other moment is one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolState {
    /// Constructed, not yet bound to an outer trainer.
    Idle,
    /// Bound; evaluation rounds may run.
    Ready,
    /// A nested evaluation round is in flight.
    Evaluating,
}

/// The evaluation orchestrator: state machine plus owned-optional handles
/// for the nested trainer and the probe.
pub struct EvalProtocol {
    config: SelfSupConfig,
    state: ProtocolState,
    outer_config: Option<TrainConfig>,
    nested: Option<Trainer>,
    probe: Option<EvalClassifier>,
    rounds: u64,
}

impl EvalProtocol {
    /// Create an idle protocol.
    pub fn new(config: SelfSupConfig) -> Self {
        Self {
            config,
            state: ProtocolState::Idle,
            outer_config: None,
            nested: None,
            probe: None,
            rounds: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// The protocol configuration.
    pub fn config(&self) -> &SelfSupConfig {
        &self.config
    }

    /// Completed evaluation rounds.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Whether a probe currently exists (only ever true mid-round).
    pub fn probe_is_live(&self) -> bool {
        self.probe.is_some()
    }

    /// Capture the outer trainer's configuration as the template for the
    /// nested trainer. Transitions `Idle -> Ready`.
    ///
    /// # Panics
    ///
    /// Panics when the protocol was already built.
    pub fn build(&mut self, outer_config: &TrainConfig) {
        assert_eq!(
            self.state,
            ProtocolState::Idle,
            "evaluation protocol is already built"
        );
        self.outer_config = Some(outer_config.clone());
        self.state = ProtocolState::Ready;
    }

    /// Run one evaluation round, blocking until the nested fit and the
    /// inference pass complete.
    ///
    /// Invoked by the outer loop's validation/test-start hooks. The nested
    /// trainer is constructed lazily from the outer configuration (epoch
    /// budget swapped, step budget cleared, sanity check off, a post-hoc
    /// indicator as its only callback) and kept across rounds; the probe is
    /// constructed fresh, fitted against the evaluation copy of `dm`,
    /// scored against the live `dm`'s loaders for `stage`, and discarded.
    ///
    /// Failures inside the nested fit propagate: there is no retry and no
    /// partial-evaluation recovery.
    ///
    /// # Panics
    ///
    /// Panics when the protocol has not been built or a round is already
    /// in flight.
    pub fn on_inference_start(
        &mut self,
        stage: Stage,
        dm: &DataModule,
        features: Rc<dyn Encoder>,
        eval_train_transform: Rc<dyn ViewTransform>,
    ) -> EvalReport {
        assert_eq!(
            self.state,
            ProtocolState::Ready,
            "on_inference_start requires a built protocol with no round in flight"
        );
        self.state = ProtocolState::Evaluating;

        let outer_config = self
            .outer_config
            .as_ref()
            .expect("Ready state implies a captured outer configuration");

        if self.nested.is_none() {
            let config = outer_config.eval_copy(self.config.eval_epochs);
            let optimizer = AdamW::with_defaults(self.config.lr, self.config.weight_decay);
            let mut nested = Trainer::new(Vec::new(), Box::new(optimizer), config);
            nested.add_callback(PostHocProgress::new());
            self.nested = Some(nested);
        }

        let n_classes = dm.card_y();
        if self.probe.is_none() {
            let seed = 0x5eed_ca5e ^ self.rounds;
            let mut probe = EvalClassifier::new(features.embed_dim(), n_classes, seed);
            probe.build(Rc::clone(&features));
            self.probe = Some(probe);
        }

        let dm_eval = dm.eval_variant(self.config.eval_batch_size, eval_train_transform);

        let probe = self.probe.as_ref().expect("probe constructed above");
        let nested = self.nested.as_mut().expect("nested trainer constructed above");
        nested.bind(probe.params());
        nested.set_loss(Box::new(CrossEntropyLoss::new(n_classes)));
        nested.train(
            || {
                dm_eval
                    .train_batches()
                    .iter()
                    .map(|batch| to_supervised(batch, n_classes))
                    .collect::<Vec<Batch>>()
            },
            |x| probe.forward(x),
        );

        let batches = match stage {
            Stage::Validate => dm.val_batches(),
            Stage::Test => dm.test_batches(),
        };
        let report = probe.inference_epoch(stage, &batches);

        // Drop the probe so its weights and the optimizer state bound to
        // them cannot leak into the next round.
        self.probe = None;
        self.rounds += 1;
        self.state = ProtocolState::Ready;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataModuleConfig, TabularDataModule, TabularDataset};
    use crate::selfsup::encoder::{EncoderHooks, MlpHooks};
    use crate::transforms::Identity;

    fn data_module() -> DataModule {
        let mut dm: DataModule = TabularDataModule::new(
            TabularDataset::synthetic(60, 4, Some(2), Some(2), 0),
            DataModuleConfig {
                train_batch_size: 8,
                stratified_sampling: true,
                ..Default::default()
            },
        )
        .unwrap()
        .into();
        dm.prepare();
        dm.setup().unwrap();
        dm
    }

    fn built_protocol(eval_epochs: usize) -> EvalProtocol {
        let mut protocol = EvalProtocol::new(SelfSupConfig {
            eval_epochs,
            lr: 0.05,
            ..Default::default()
        });
        protocol.build(&TrainConfig::new().with_max_epochs(50).with_log_interval(1_000));
        protocol
    }

    #[test]
    fn test_state_machine_round_trip() {
        let dm = data_module();
        let hooks = MlpHooks::new(4, 8, 4, 0);
        let features = hooks.init_encoder();

        let mut protocol = built_protocol(2);
        assert_eq!(protocol.state(), ProtocolState::Ready);
        assert!(!protocol.probe_is_live());

        let report =
            protocol.on_inference_start(Stage::Validate, &dm, features, Rc::new(Identity));

        assert_eq!(protocol.state(), ProtocolState::Ready);
        assert_eq!(protocol.rounds(), 1);
        // The probe was discarded at the end of the round.
        assert!(!protocol.probe_is_live());
        assert!(report.loss.is_finite());
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!(report.fairness.is_some());
    }

    #[test]
    fn test_successive_rounds_are_independent() {
        let dm = data_module();
        let hooks = MlpHooks::new(4, 8, 4, 0);
        let features = hooks.init_encoder();

        let mut protocol = built_protocol(1);
        protocol.on_inference_start(Stage::Validate, &dm, Rc::clone(&features), Rc::new(Identity));
        protocol.on_inference_start(Stage::Test, &dm, features, Rc::new(Identity));
        assert_eq!(protocol.rounds(), 2);
        assert!(!protocol.probe_is_live());
    }

    #[test]
    #[should_panic(expected = "already built")]
    fn test_double_build_panics() {
        let mut protocol = built_protocol(1);
        protocol.build(&TrainConfig::default());
    }

    #[test]
    #[should_panic(expected = "requires a built protocol")]
    fn test_inference_before_build_panics() {
        let dm = data_module();
        let hooks = MlpHooks::new(4, 8, 4, 0);
        let mut protocol = EvalProtocol::new(SelfSupConfig::default());
        protocol.on_inference_start(Stage::Validate, &dm, hooks.init_encoder(), Rc::new(Identity));
    }

    #[test]
    fn test_live_module_keeps_its_sampling_config() {
        let dm = data_module();
        let hooks = MlpHooks::new(4, 8, 4, 0);
        let mut protocol = built_protocol(1);
        protocol.on_inference_start(Stage::Validate, &dm, hooks.init_encoder(), Rc::new(Identity));
        // The evaluation copy disabled stratification on itself only.
        assert!(dm.config().stratified_sampling);
    }
}
