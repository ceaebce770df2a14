//! # sondear
//!
//! Fairness-aware data modules and self-supervised evaluation protocols
//! for representation learning.
//!
//! The crate provides:
//! - **Data modules** ([`data`]) that split tabular and vision datasets
//!   deterministically and expose sensitive-attribute-aware batches under a
//!   declarative sampling configuration.
//! - **Multi-crop view generation** ([`transforms`]) for
//!   instance-discrimination objectives.
//! - **A training engine** ([`train`]) with lifecycle callbacks, used both
//!   as the outer loop and, recursively, as the nested evaluation trainer.
//! - **Self-supervised models** ([`selfsup`]) implementing the
//!   pretrain-then-evaluate pattern: on every validation/test start, a
//!   nested trainer fits a fresh linear probe over the frozen features and
//!   reports accuracy plus fairness gaps.
//!
//! # Example
//!
//! ```no_run
//! use sondear::data::{DataModule, DataModuleConfig, TabularDataModule, TabularDataset};
//! use sondear::optim::AdamW;
//! use sondear::selfsup::{MlpHooks, MomentumTeacherModel, SelfSupConfig};
//! use sondear::train::{TrainConfig, Trainer};
//!
//! let mut dm: DataModule = TabularDataModule::new(
//!     TabularDataset::synthetic(1_000, 16, Some(2), Some(2), 0),
//!     DataModuleConfig::default(),
//! )
//! .unwrap()
//! .into();
//! dm.prepare();
//! dm.setup().unwrap();
//!
//! let mut trainer = Trainer::new(
//!     Vec::new(),
//!     Box::new(AdamW::with_defaults(3e-4, 0.0)),
//!     TrainConfig::new().with_max_epochs(10),
//! );
//! let mut model = MomentumTeacherModel::new(
//!     SelfSupConfig::default(),
//!     Box::new(MlpHooks::new(16, 64, 32, 0)),
//! );
//! model.build(dm, &mut trainer);
//!
//! model.fit(&mut trainer);
//! let report = model.validate();
//! println!("probe accuracy: {:.3}", report.accuracy);
//! ```

pub mod autograd;
pub mod data;
pub mod eval;
pub mod optim;
pub mod selfsup;
pub mod train;
pub mod transforms;

pub use autograd::Tensor;
