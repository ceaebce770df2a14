//! Self-supervised models and their evaluation protocol
//!
//! The pretrain-then-evaluate pattern: an unsupervised encoder trains in
//! the outer loop, and on every validation/test start a nested trainer fits
//! a fresh linear probe over the frozen features to produce the metrics.

mod contrastive;
mod discriminator;
mod distiller;
mod encoder;
mod momentum;
mod orchestrator;
mod probe;

pub use contrastive::InfoNCELoss;
pub use discriminator::{BatchTransform, InstanceDiscriminator};
pub use distiller::MomentumTeacherModel;
pub use encoder::{Encoder, EncoderHooks, MlpEncoder, MlpHooks};
pub use momentum::{ema_update, EmaWeightSync, MomentumSchedule, TeacherEncoder};
pub use orchestrator::{EvalProtocol, ProtocolState, SelfSupConfig};
pub use probe::{EvalClassifier, EvalReport, InferenceStep};

/// Which loaders an evaluation round scores against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Validation loaders.
    Validate,
    /// Test loaders.
    Test,
}
