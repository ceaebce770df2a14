//! Fairness-aware data layer
//!
//! Datasets carry optional target (`y`) and sensitive-attribute (`s`)
//! columns; data modules split them deterministically and produce tagged
//! batches under a declarative sampling configuration.

mod datamodule;
mod dataset;
mod error;
mod loader;
mod module;
mod sample;
mod tabular;
mod vision;

pub use datamodule::{DataModuleConfig, TrainingMode};
pub use dataset::{
    ImageStore, InputStore, TabularDataset, TabularStore, TaggedDataset, TrainValTestSplit,
    VisionDataset,
};
pub use error::{DataError, Result};
pub use module::DataModule;
pub use sample::{BatchInput, TaggedBatch};
pub use tabular::TabularDataModule;
pub use vision::VisionDataModule;
