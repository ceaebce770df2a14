//! Momentum-teacher self-distillation
//!
//! Extends instance discrimination with a student/teacher encoder pair:
//! the student trains by gradient descent while the teacher follows it
//! through an exponential moving average applied after every optimizer
//! step. Inference routes through the student only.

use crate::autograd::concat_rows;
use crate::data::DataModule;
use crate::selfsup::contrastive::InfoNCELoss;
use crate::selfsup::discriminator::{BatchTransform, InstanceDiscriminator};
use crate::selfsup::encoder::{Encoder, EncoderHooks};
use crate::selfsup::momentum::{EmaWeightSync, TeacherEncoder};
use crate::selfsup::orchestrator::{EvalProtocol, SelfSupConfig};
use crate::selfsup::probe::EvalReport;
use crate::train::{TrainResult, Trainer};
use crate::transforms::MultiCropTransform;
use crate::Tensor;
use std::rc::Rc;

/// Default temperature for the distillation objective.
const INFO_NCE_TEMPERATURE: f32 = 0.1;

/// Instance discriminator with a gradient-isolated momentum teacher.
pub struct MomentumTeacherModel {
    base: InstanceDiscriminator,
    teacher: Option<Rc<TeacherEncoder>>,
}

impl MomentumTeacherModel {
    /// Create an unbuilt model from its configuration and hooks.
    pub fn new(config: SelfSupConfig, hooks: Box<dyn EncoderHooks>) -> Self {
        Self {
            base: InstanceDiscriminator::new(config, hooks),
            teacher: None,
        }
    }

    /// Use a multi-crop transform as the per-sample instance view source.
    pub fn with_instance_transform(mut self, transform: MultiCropTransform) -> Self {
        self.base = self.base.with_instance_transform(transform);
        self
    }

    /// Use a batch-level augmentation when generating positive views.
    pub fn with_batch_transform(mut self, transform: Rc<dyn BatchTransform>) -> Self {
        self.base = self.base.with_batch_transform(transform);
        self
    }

    /// Bind the model: construct the student/teacher pair via the factory
    /// hook, disable gradient tracking on the teacher (one-time, before any
    /// forward pass), register the weight-synchronization callback on the
    /// outer trainer, and complete the base build with the student as the
    /// feature extractor.
    ///
    /// # Panics
    ///
    /// Panics when the factory returns structurally incompatible encoders
    /// (parameter counts or shapes differ in iteration order).
    pub fn build(&mut self, dm: DataModule, trainer: &mut Trainer) {
        let (student, teacher_encoder) = self.base.hooks().init_encoder_pair();

        let student_params = student.params();
        let teacher_params = teacher_encoder.params();
        assert_eq!(
            student_params.len(),
            teacher_params.len(),
            "student and teacher must expose the same number of parameters"
        );
        for (s, t) in student_params.iter().zip(teacher_params.iter()) {
            assert_eq!(
                s.len(),
                t.len(),
                "student and teacher parameter shapes must match in iteration order"
            );
        }

        let teacher = Rc::new(TeacherEncoder::new(teacher_encoder));
        let schedule = self.base.hooks().momentum_schedule();

        self.base.build_with_encoder(dm, trainer, Rc::clone(&student));
        trainer.add_callback(EmaWeightSync::new(
            student.params(),
            Rc::clone(&teacher),
            schedule,
        ));
        self.teacher = Some(teacher);
    }

    /// The student encoder (the model's feature extractor).
    pub fn student(&self) -> Rc<dyn Encoder> {
        self.base.features()
    }

    /// The momentum teacher.
    ///
    /// # Panics
    ///
    /// Panics before `build`.
    pub fn teacher(&self) -> &Rc<TeacherEncoder> {
        self.teacher
            .as_ref()
            .expect("teacher requested before build()")
    }

    /// Forward for inference purposes: the student only.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        self.student().forward(x)
    }

    /// The bound data module.
    pub fn datamodule(&self) -> &DataModule {
        self.base.datamodule()
    }

    /// The evaluation protocol.
    pub fn protocol(&self) -> &EvalProtocol {
        self.base.protocol()
    }

    /// Outer self-supervised fit: anchors embed through the student,
    /// positives through the teacher (no tape), and InfoNCE aligns them.
    /// The registered callback keeps the teacher trailing the student after
    /// every optimizer step.
    pub fn fit(&self, trainer: &mut Trainer) -> TrainResult {
        let student = self.student();
        let teacher = Rc::clone(self.teacher());
        trainer.set_loss(Box::new(InfoNCELoss::new(
            INFO_NCE_TEMPERATURE,
            student.embed_dim(),
        )));
        trainer.train(
            || self.base.contrastive_batches(),
            move |x| {
                let (anchors, positives) = x.chunk2();
                let student_embeddings = student.forward(&anchors);
                let teacher_embeddings = teacher.forward(&positives);
                concat_rows(&student_embeddings, &teacher_embeddings)
            },
        )
    }

    /// The outer loop's validation-start hook.
    pub fn validate(&mut self) -> EvalReport {
        self.base.validate()
    }

    /// The outer loop's test-start hook.
    pub fn test(&mut self) -> EvalReport {
        self.base.test()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataModuleConfig, TabularDataModule, TabularDataset};
    use crate::optim::AdamW;
    use crate::selfsup::encoder::MlpHooks;
    use crate::train::TrainConfig;
    use approx::assert_abs_diff_eq;

    fn built_model() -> (MomentumTeacherModel, Trainer) {
        let mut dm: DataModule = TabularDataModule::new(
            TabularDataset::synthetic(40, 4, Some(2), Some(2), 0),
            DataModuleConfig {
                train_batch_size: 8,
                ..Default::default()
            },
        )
        .unwrap()
        .into();
        dm.prepare();
        dm.setup().unwrap();

        let mut trainer = Trainer::new(
            Vec::new(),
            Box::new(AdamW::with_defaults(1e-3, 0.0)),
            TrainConfig::new().with_max_epochs(1).with_log_interval(1_000),
        );
        let mut model = MomentumTeacherModel::new(
            SelfSupConfig {
                eval_epochs: 1,
                ..Default::default()
            },
            Box::new(MlpHooks::new(4, 8, 4, 0)),
        );
        model.build(dm, &mut trainer);
        (model, trainer)
    }

    #[test]
    fn test_teacher_gradients_disabled_at_build() {
        let (model, _trainer) = built_model();
        assert!(model
            .teacher()
            .params()
            .iter()
            .all(|p| !p.requires_grad()));
        // The student still trains.
        assert!(model.student().params().iter().all(Tensor::requires_grad));
    }

    #[test]
    fn test_build_registers_sync_callback() {
        let (_model, trainer) = built_model();
        assert_eq!(trainer.callbacks().len(), 1);
    }

    #[test]
    fn test_fit_moves_teacher_toward_student() {
        let (model, mut trainer) = built_model();
        let before = model.teacher().params()[0].to_vec();

        let result = model.fit(&mut trainer);
        assert!(result.final_loss.is_finite());

        let after = model.teacher().params()[0].to_vec();
        assert_ne!(before, after, "EMA sync should have moved the teacher");
        // Teacher parameters still carry no gradients after the run.
        assert!(model.teacher().params().iter().all(|p| p.grad().is_none()));
    }

    #[test]
    fn test_fit_leaves_student_and_teacher_distinct() {
        let (model, mut trainer) = built_model();
        model.fit(&mut trainer);
        let student = model.student().params()[0].to_vec();
        let teacher = model.teacher().params()[0].to_vec();
        assert_ne!(student, teacher, "momentum < 1 keeps the teacher trailing");
    }

    #[test]
    fn test_momentum_arithmetic_through_model() {
        let (model, _trainer) = built_model();
        let student = model.student();
        let teacher = model.teacher();

        let s0 = student.params()[0].to_vec()[0];
        let t0 = teacher.params()[0].to_vec()[0];
        teacher.momentum_update(&student.params(), 0.9);
        let updated = teacher.params()[0].to_vec()[0];
        assert_abs_diff_eq!(updated, 0.9 * t0 + 0.1 * s0, epsilon = 1e-6);
    }

    #[test]
    fn test_validation_after_fit() {
        let (mut model, mut trainer) = built_model();
        model.fit(&mut trainer);
        let report = model.validate();
        assert!(report.accuracy >= 0.0);
        assert!(model.protocol().rounds() == 1);
    }
}
