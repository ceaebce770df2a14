//! Optimizers for training neural networks

mod adamw;
mod clip;
mod optimizer;
mod sgd;

pub use adamw::AdamW;
pub use clip::clip_grad_norm;
pub use optimizer::Optimizer;
pub use sgd::SGD;
