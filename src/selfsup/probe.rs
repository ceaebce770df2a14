//! Downstream evaluation classifier
//!
//! A linear probe over a shared feature extractor. The extractor is
//! borrowed from the self-supervised model, never copied, and the probe
//! detaches its features before the head so probe training cannot push
//! gradients into encoder parameters.

use crate::autograd::linear;
use crate::data::{BatchInput, TaggedBatch};
use crate::eval::{fairness_report, FairnessReport};
use crate::eval::ConfusionMatrix;
use crate::selfsup::encoder::Encoder;
use crate::selfsup::Stage;
use crate::train::{Batch, CrossEntropyLoss, LossFn};
use crate::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;

/// Aggregated metrics from one inference epoch.
#[derive(Clone, Debug)]
pub struct EvalReport {
    /// Which loaders produced the metrics.
    pub stage: Stage,
    /// Mean cross-entropy over the inference batches.
    pub loss: f32,
    /// Overall accuracy.
    pub accuracy: f64,
    /// Unweighted mean F1 over classes.
    pub macro_f1: f64,
    /// Fairness gaps, when the batches carry a sensitive attribute with at
    /// least two groups.
    pub fairness: Option<FairnessReport>,
}

/// Per-batch inference output, aggregated by
/// [`inference_epoch_end`](EvalClassifier::inference_epoch_end).
#[derive(Clone, Debug)]
pub struct InferenceStep {
    pub predictions: Vec<usize>,
    pub targets: Vec<usize>,
    pub groups: Option<Vec<i64>>,
    pub loss: f32,
}

/// A supervised linear head bound to a frozen feature extractor.
pub struct EvalClassifier {
    weight: Tensor,
    bias: Tensor,
    embed_dim: usize,
    n_classes: usize,
    features: Option<Rc<dyn Encoder>>,
}

impl EvalClassifier {
    /// Create a freshly initialized head. Each construction draws new
    /// weights from `seed`, so successive evaluation rounds start from
    /// independent states.
    pub fn new(embed_dim: usize, n_classes: usize, seed: u64) -> Self {
        assert!(
            embed_dim > 0 && n_classes > 1,
            "probe needs embed_dim > 0 and at least two classes"
        );
        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (embed_dim as f32).sqrt();
        let weight = Tensor::from_vec(
            (0..n_classes * embed_dim)
                .map(|_| rng.gen_range(-bound..bound))
                .collect(),
            true,
        );
        Self {
            weight,
            bias: Tensor::zeros(n_classes, true),
            embed_dim,
            n_classes,
            features: None,
        }
    }

    /// Bind the probe to a feature extractor.
    ///
    /// # Panics
    ///
    /// Panics when the extractor's feature width does not match the head.
    pub fn build(&mut self, features: Rc<dyn Encoder>) {
        assert_eq!(
            features.embed_dim(),
            self.embed_dim,
            "feature width {} does not match the probe head ({})",
            features.embed_dim(),
            self.embed_dim
        );
        self.features = Some(features);
    }

    /// Whether `build` has run.
    pub fn is_built(&self) -> bool {
        self.features.is_some()
    }

    /// Trainable head parameters.
    pub fn params(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    /// Snapshot of the head weights, for state-independence checks.
    pub fn head_weights(&self) -> Vec<f32> {
        self.weight.to_vec()
    }

    /// Class logits for a flat input batch: detached features through the
    /// linear head.
    ///
    /// # Panics
    ///
    /// Panics when called before [`build`](Self::build).
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let features = self
            .features
            .as_ref()
            .expect("inference before build: bind the probe to a feature extractor first");
        let feats = features.forward(x).detach();
        linear(&feats, &self.weight, &self.bias, self.embed_dim, self.n_classes)
    }

    /// Run one inference batch: logits, argmax predictions, and the batch
    /// cross-entropy.
    ///
    /// # Panics
    ///
    /// Panics before `build`, on a non-flat input payload, or when the
    /// batch carries no targets.
    pub fn inference_step(&self, batch: &TaggedBatch) -> InferenceStep {
        assert!(
            self.is_built(),
            "inference before build: bind the probe to a feature extractor first"
        );
        let BatchInput::Flat(x) = batch.x() else {
            panic!(
                "probe inference requires flat batches, got {}",
                batch.x().kind()
            );
        };
        let y = batch.require_y();

        let logits = self.forward(x);
        let predictions = argmax_rows(&logits, self.n_classes);
        let targets: Vec<usize> = y.to_vec().iter().map(|&v| v as usize).collect();
        let one_hot = one_hot(y, self.n_classes);
        let loss = CrossEntropyLoss::new(self.n_classes)
            .forward(&logits, &one_hot)
            .data()[0];

        InferenceStep {
            predictions,
            targets,
            groups: batch.s().map(|s| s.to_vec().iter().map(|&v| v as i64).collect()),
            loss,
        }
    }

    /// Aggregate per-batch outputs into an [`EvalReport`]. Fairness gaps
    /// are included when every batch carried the sensitive attribute and at
    /// least two groups are present.
    pub fn inference_epoch_end(&self, stage: Stage, outputs: &[InferenceStep]) -> EvalReport {
        assert!(
            self.is_built(),
            "inference before build: bind the probe to a feature extractor first"
        );
        let mut matrix = ConfusionMatrix::new(self.n_classes);
        let mut predictions = Vec::new();
        let mut targets = Vec::new();
        let mut groups: Option<Vec<i64>> = Some(Vec::new());
        let mut loss = 0.0f32;
        let mut samples = 0usize;

        for step in outputs {
            for (&p, &t) in step.predictions.iter().zip(step.targets.iter()) {
                matrix.record(p, t);
            }
            predictions.extend_from_slice(&step.predictions);
            targets.extend_from_slice(&step.targets);
            match (&mut groups, &step.groups) {
                (Some(all), Some(batch_groups)) => all.extend_from_slice(batch_groups),
                _ => groups = None,
            }
            loss += step.loss * step.predictions.len() as f32;
            samples += step.predictions.len();
        }

        let fairness = groups.filter(|g| has_multiple_groups(g)).map(|g| {
            fairness_report(&predictions, &targets, &g, self.n_classes)
        });

        EvalReport {
            stage,
            loss: if samples > 0 { loss / samples as f32 } else { 0.0 },
            accuracy: matrix.accuracy(),
            macro_f1: matrix.macro_f1(),
            fairness,
        }
    }

    /// Inference over a full loader pass.
    pub fn inference_epoch(&self, stage: Stage, batches: &[TaggedBatch]) -> EvalReport {
        let outputs: Vec<InferenceStep> =
            batches.iter().map(|b| self.inference_step(b)).collect();
        self.inference_epoch_end(stage, &outputs)
    }
}

fn has_multiple_groups(groups: &[i64]) -> bool {
    groups.first().is_some_and(|f| groups.iter().any(|g| g != f))
}

fn argmax_rows(logits: &Tensor, classes: usize) -> Vec<usize> {
    logits
        .to_vec()
        .chunks(classes)
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0, |(i, _)| i)
        })
        .collect()
}

/// One-hot encode integer-valued targets.
pub(crate) fn one_hot(y: &Tensor, classes: usize) -> Tensor {
    let values = y.to_vec();
    let mut out = vec![0.0f32; values.len() * classes];
    for (i, &v) in values.iter().enumerate() {
        let class = v as usize;
        assert!(class < classes, "target {class} out of range for {classes} classes");
        out[i * classes + class] = 1.0;
    }
    Tensor::from_vec(out, false)
}

/// Convert a tagged batch into the supervised pair consumed by the nested
/// trainer: flat inputs plus one-hot targets.
pub(crate) fn to_supervised(batch: &TaggedBatch, classes: usize) -> Batch {
    let BatchInput::Flat(x) = batch.x() else {
        panic!(
            "probe training requires flat batches, got {}",
            batch.x().kind()
        );
    };
    Batch::new(x.clone(), one_hot(batch.require_y(), classes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selfsup::encoder::MlpEncoder;

    fn built_probe() -> EvalClassifier {
        let mut probe = EvalClassifier::new(3, 2, 0);
        probe.build(Rc::new(MlpEncoder::new(4, 6, 3, 0)));
        probe
    }

    fn labeled_batch() -> TaggedBatch {
        TaggedBatch::from_parts(
            BatchInput::Flat(Tensor::zeros(2 * 4, false)),
            Some(Tensor::from_vec(vec![0.0, 1.0], false)),
            Some(Tensor::from_vec(vec![0.0, 1.0], false)),
        )
    }

    #[test]
    fn test_probe_forward_and_inference() {
        let probe = built_probe();
        let step = probe.inference_step(&labeled_batch());
        assert_eq!(step.predictions.len(), 2);
        assert_eq!(step.targets, vec![0, 1]);
        assert!(step.loss.is_finite());
    }

    #[test]
    #[should_panic(expected = "inference before build")]
    fn test_inference_before_build_panics() {
        let probe = EvalClassifier::new(3, 2, 0);
        probe.inference_step(&labeled_batch());
    }

    #[test]
    #[should_panic(expected = "requires flat batches")]
    fn test_inference_rejects_raw_images() {
        let probe = built_probe();
        let batch = TaggedBatch::from_parts(
            BatchInput::Images(Vec::new()),
            Some(Tensor::zeros(1, false)),
            None,
        );
        probe.inference_step(&batch);
    }

    #[test]
    fn test_probe_training_cannot_reach_encoder() {
        let encoder = Rc::new(MlpEncoder::new(4, 6, 3, 0));
        let mut probe = EvalClassifier::new(3, 2, 1);
        probe.build(encoder.clone());

        // Forward + backward through the probe's loss.
        let batch = labeled_batch();
        let supervised = to_supervised(&batch, 2);
        let logits = probe.forward(&supervised.inputs);
        let mut loss = CrossEntropyLoss::new(2).forward(&logits, &supervised.targets);
        crate::autograd::backward(&mut loss, None);

        // The head received gradients; the encoder did not.
        assert!(probe.params().iter().all(|p| p.grad().is_some()));
        assert!(encoder.params().iter().all(|p| p.grad().is_none()));
    }

    #[test]
    fn test_distinct_seeds_give_distinct_heads() {
        let a = EvalClassifier::new(3, 2, 10);
        let b = EvalClassifier::new(3, 2, 11);
        assert_ne!(a.head_weights(), b.head_weights());
    }

    #[test]
    fn test_epoch_end_aggregates_fairness() {
        let probe = built_probe();
        let outputs = vec![probe.inference_step(&labeled_batch())];
        let report = probe.inference_epoch_end(Stage::Validate, &outputs);
        assert!(report.fairness.is_some());
        assert!((0.0..=1.0).contains(&report.accuracy));
    }

    #[test]
    fn test_one_hot() {
        let y = Tensor::from_vec(vec![1.0, 0.0], false);
        let encoded = one_hot(&y, 3);
        assert_eq!(encoded.to_vec(), vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    }
}
