//! Feature extractors and the abstract hooks supplied by concrete methods

use crate::autograd::{linear, relu};
use crate::selfsup::momentum::MomentumSchedule;
use crate::transforms::{Identity, ViewTransform};
use crate::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;

/// A batched feature extractor.
///
/// `forward` maps a flattened `batch x in_dim` tensor to `batch x
/// embed_dim` features; `params` returns aliasing handles suitable for
/// binding to a trainer or a weight-synchronization callback.
pub trait Encoder {
    /// Compute features for a batch.
    fn forward(&self, x: &Tensor) -> Tensor;

    /// Parameter handles, in a stable iteration order.
    fn params(&self) -> Vec<Tensor>;

    /// Flattened input size.
    fn in_dim(&self) -> usize;

    /// Feature dimensionality.
    fn embed_dim(&self) -> usize;
}

/// Two-layer MLP encoder over the autograd ops.
pub struct MlpEncoder {
    w1: Tensor,
    b1: Tensor,
    w2: Tensor,
    b2: Tensor,
    in_dim: usize,
    hidden_dim: usize,
    embed_dim: usize,
}

impl MlpEncoder {
    /// Create with uniform init scaled by fan-in.
    pub fn new(in_dim: usize, hidden_dim: usize, embed_dim: usize, seed: u64) -> Self {
        assert!(
            in_dim > 0 && hidden_dim > 0 && embed_dim > 0,
            "encoder dimensions must be > 0"
        );
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            w1: init_layer(hidden_dim * in_dim, in_dim, &mut rng),
            b1: Tensor::zeros(hidden_dim, true),
            w2: init_layer(embed_dim * hidden_dim, hidden_dim, &mut rng),
            b2: Tensor::zeros(embed_dim, true),
            in_dim,
            hidden_dim,
            embed_dim,
        }
    }
}

fn init_layer(len: usize, fan_in: usize, rng: &mut StdRng) -> Tensor {
    let bound = 1.0 / (fan_in as f32).sqrt();
    Tensor::from_vec(
        (0..len).map(|_| rng.gen_range(-bound..bound)).collect(),
        true,
    )
}

impl Encoder for MlpEncoder {
    fn forward(&self, x: &Tensor) -> Tensor {
        let hidden = relu(&linear(x, &self.w1, &self.b1, self.in_dim, self.hidden_dim));
        linear(&hidden, &self.w2, &self.b2, self.hidden_dim, self.embed_dim)
    }

    fn params(&self) -> Vec<Tensor> {
        vec![
            self.w1.clone(),
            self.b1.clone(),
            self.w2.clone(),
            self.b2.clone(),
        ]
    }

    fn in_dim(&self) -> usize {
        self.in_dim
    }

    fn embed_dim(&self) -> usize {
        self.embed_dim
    }
}

/// Abstract hooks a concrete self-supervised method supplies: encoder
/// factories, the momentum schedule, and the probe-time training transform.
pub trait EncoderHooks {
    /// Construct a single feature extractor.
    fn init_encoder(&self) -> Rc<dyn Encoder>;

    /// Construct a student/teacher pair.
    ///
    /// The two encoders must be structurally compatible for momentum
    /// copying: identical parameter shapes in iteration order.
    fn init_encoder_pair(&self) -> (Rc<dyn Encoder>, Rc<dyn Encoder>) {
        (self.init_encoder(), self.init_encoder())
    }

    /// Momentum schedule for teacher updates.
    fn momentum_schedule(&self) -> MomentumSchedule {
        MomentumSchedule::Constant(0.996)
    }

    /// Training transform for the evaluation data module copy.
    fn eval_train_transform(&self) -> Rc<dyn ViewTransform> {
        Rc::new(Identity)
    }
}

/// Hooks for an MLP encoder of fixed geometry; successive factory calls
/// produce independently initialized instances of one architecture.
pub struct MlpHooks {
    in_dim: usize,
    hidden_dim: usize,
    embed_dim: usize,
    seed: std::cell::Cell<u64>,
}

impl MlpHooks {
    /// Hooks producing `in_dim -> hidden_dim -> embed_dim` encoders.
    pub fn new(in_dim: usize, hidden_dim: usize, embed_dim: usize, seed: u64) -> Self {
        Self {
            in_dim,
            hidden_dim,
            embed_dim,
            seed: std::cell::Cell::new(seed),
        }
    }
}

impl EncoderHooks for MlpHooks {
    fn init_encoder(&self) -> Rc<dyn Encoder> {
        let seed = self.seed.get();
        self.seed.set(seed.wrapping_add(1));
        Rc::new(MlpEncoder::new(
            self.in_dim,
            self.hidden_dim,
            self.embed_dim,
            seed,
        ))
    }
}
