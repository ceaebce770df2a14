//! Instance discrimination
//!
//! The base self-supervised model: binds an encoder and a data module,
//! installs the instance-view transform into the live module, generates
//! positive view pairs for the contrastive objective, and fronts the
//! evaluation protocol for the outer loop's validation/test hooks.

use crate::data::{BatchInput, DataModule, TaggedBatch};
use crate::selfsup::contrastive::InfoNCELoss;
use crate::selfsup::encoder::{Encoder, EncoderHooks};
use crate::selfsup::orchestrator::{EvalProtocol, SelfSupConfig};
use crate::selfsup::probe::EvalReport;
use crate::selfsup::Stage;
use crate::train::{Batch, TrainResult, Trainer};
use crate::transforms::{MultiCropOutput, MultiCropTransform};
use crate::Tensor;
use std::rc::Rc;

/// A batch-level stochastic augmentation applied to already-collated
/// tensors. Implementations may share random state across the batch; the
/// duplicate-then-split path in [`InstanceDiscriminator::positive_views`]
/// exists precisely so one call covers both views.
pub trait BatchTransform {
    /// Transform a collated batch tensor.
    fn apply(&self, x: &Tensor) -> Tensor;
}

/// Default temperature for the instance-discrimination objective.
const INFO_NCE_TEMPERATURE: f32 = 0.1;

/// Self-supervised model trained by discriminating instances: every sample
/// is its own class, represented by two augmented views.
pub struct InstanceDiscriminator {
    hooks: Box<dyn EncoderHooks>,
    protocol: EvalProtocol,
    instance_transform: Option<MultiCropTransform>,
    batch_transform: Option<Rc<dyn BatchTransform>>,
    datamodule: Option<DataModule>,
    encoder: Option<Rc<dyn Encoder>>,
}

impl InstanceDiscriminator {
    /// Create an unbuilt model from its configuration and hooks.
    pub fn new(config: SelfSupConfig, hooks: Box<dyn EncoderHooks>) -> Self {
        Self {
            hooks,
            protocol: EvalProtocol::new(config),
            instance_transform: None,
            batch_transform: None,
            datamodule: None,
            encoder: None,
        }
    }

    /// Use a multi-crop transform as the per-sample instance view source.
    pub fn with_instance_transform(mut self, transform: MultiCropTransform) -> Self {
        self.instance_transform = Some(transform);
        self
    }

    /// Use a batch-level augmentation when generating positive views.
    pub fn with_batch_transform(mut self, transform: Rc<dyn BatchTransform>) -> Self {
        self.batch_transform = Some(transform);
        self
    }

    /// Bind the model: create the encoder via the factory hook, bind its
    /// parameters to the outer trainer, install the instance transform into
    /// the *live* data module (vision kind only — this mutation is in
    /// place, because this is the module the outer loop iterates), and
    /// ready the evaluation protocol.
    pub fn build(&mut self, dm: DataModule, trainer: &mut Trainer) {
        let encoder = self.hooks.init_encoder();
        self.build_with_encoder(dm, trainer, encoder);
    }

    pub(crate) fn build_with_encoder(
        &mut self,
        mut dm: DataModule,
        trainer: &mut Trainer,
        encoder: Rc<dyn Encoder>,
    ) {
        trainer.bind(encoder.params());
        if dm.is_vision() {
            if let Some(transform) = &mut self.instance_transform {
                transform.resolve_global_size(&dm.sample_dims());
                dm.install_train_transform(Rc::new(transform.clone()));
            }
        }
        self.protocol.build(trainer.config());
        self.encoder = Some(encoder);
        self.datamodule = Some(dm);
    }

    pub(crate) fn hooks(&self) -> &dyn EncoderHooks {
        &*self.hooks
    }

    /// The current feature extractor.
    ///
    /// # Panics
    ///
    /// Panics before `build`.
    pub fn features(&self) -> Rc<dyn Encoder> {
        Rc::clone(
            self.encoder
                .as_ref()
                .expect("features requested before build()"),
        )
    }

    /// The bound data module.
    ///
    /// # Panics
    ///
    /// Panics before `build`.
    pub fn datamodule(&self) -> &DataModule {
        self.datamodule
            .as_ref()
            .expect("data module requested before build()")
    }

    /// The evaluation protocol.
    pub fn protocol(&self) -> &EvalProtocol {
        &self.protocol
    }

    /// Resolved global crop size.
    ///
    /// # Panics
    ///
    /// Panics before `build` and on non-vision data modules, where crop
    /// geometry has no meaning.
    pub fn global_crop_size(&self) -> (usize, usize) {
        let dm = self.datamodule();
        assert!(
            dm.is_vision(),
            "global_crop_size is only applicable to vision data modules"
        );
        match &self.instance_transform {
            Some(transform) => transform.global_crop_size(),
            None => {
                let dims = dm.sample_dims();
                (dims[1], dims[2])
            }
        }
    }

    /// Local crop size derived from the global size.
    pub fn local_crop_size(&self) -> (usize, usize) {
        match &self.instance_transform {
            Some(transform) => transform.local_crop_size(),
            None => {
                let (h, w) = self.global_crop_size();
                let factor = 0.43;
                (
                    ((h as f64 * factor).round() as usize).max(1),
                    ((w as f64 * factor).round() as usize).max(1),
                )
            }
        }
    }

    /// Produce exactly two positive views (plus any existing local crops)
    /// from a batch.
    ///
    /// A flat input with no batch transform duplicates into two
    /// bit-identical views; with a transform, one call over the
    /// concatenated pair is split back into the two views so both share the
    /// transform's per-call random state. An already-multi-cropped input
    /// passes through, with the batch transform applied to each crop
    /// independently when present.
    ///
    /// # Panics
    ///
    /// Panics on any other input payload.
    pub fn positive_views(&self, batch: &TaggedBatch) -> MultiCropOutput {
        match batch.x() {
            BatchInput::Flat(x) => match &self.batch_transform {
                None => MultiCropOutput::pair(x.clone(), x.clone()),
                Some(transform) => {
                    let doubled = Tensor::cat(&[x, x]);
                    let (first, second) = transform.apply(&doubled).chunk2();
                    MultiCropOutput::pair(first, second)
                }
            },
            BatchInput::Views(views) => match &self.batch_transform {
                None => views.clone(),
                Some(transform) => MultiCropOutput {
                    global_crops: views
                        .global_crops
                        .iter()
                        .map(|crop| transform.apply(crop))
                        .collect(),
                    local_crops: views
                        .local_crops
                        .iter()
                        .map(|crop| transform.apply(crop))
                        .collect(),
                },
            },
            other => panic!(
                "positive views require a flat tensor or multi-crop views, got {}",
                other.kind()
            ),
        }
    }

    /// One outer pass of contrastive batches: positive views packed as
    /// anchor rows followed by positive rows, with a dummy target.
    pub(crate) fn contrastive_batches(&self) -> Vec<Batch> {
        self.datamodule()
            .train_batches()
            .iter()
            .map(|batch| {
                let views = self.positive_views(batch);
                views.assert_contrastive();
                let combined = Tensor::cat(&[&views.global_crops[0], &views.global_crops[1]]);
                Batch::new(combined, Tensor::zeros(1, false))
            })
            .collect()
    }

    /// Outer self-supervised fit: both views pass through the single
    /// encoder and the InfoNCE objective pulls positives together.
    pub fn fit(&self, trainer: &mut Trainer) -> TrainResult {
        let encoder = self.features();
        trainer.set_loss(Box::new(InfoNCELoss::new(
            INFO_NCE_TEMPERATURE,
            encoder.embed_dim(),
        )));
        trainer.train(
            || self.contrastive_batches(),
            move |x| encoder.forward(x),
        )
    }

    /// The outer loop's validation-start hook: run an evaluation round
    /// against the validation loaders.
    pub fn validate(&mut self) -> EvalReport {
        self.trigger(Stage::Validate)
    }

    /// The outer loop's test-start hook: run an evaluation round against
    /// the test loaders.
    pub fn test(&mut self) -> EvalReport {
        self.trigger(Stage::Test)
    }

    fn trigger(&mut self, stage: Stage) -> EvalReport {
        let features = self.features();
        let transform = self.hooks.eval_train_transform();
        let dm = self
            .datamodule
            .as_ref()
            .expect("evaluation triggered before build()");
        self.protocol.on_inference_start(stage, dm, features, transform)
    }
}
