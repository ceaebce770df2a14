//! Unified data module handle
//!
//! The self-supervised layer works against this tagged wrapper so that
//! vision-specific behavior (transform installation, crop geometry) is a
//! `match` on the module kind rather than a downcast.

use crate::data::datamodule::{DataModuleConfig, TrainingMode};
use crate::data::sample::TaggedBatch;
use crate::data::tabular::TabularDataModule;
use crate::data::vision::VisionDataModule;
use crate::data::Result;
use crate::transforms::ViewTransform;
use std::rc::Rc;

/// A tabular or vision data module behind one interface.
pub enum DataModule {
    Tabular(TabularDataModule),
    Vision(VisionDataModule),
}

impl DataModule {
    /// Whether this is the vision-with-transforms kind.
    pub fn is_vision(&self) -> bool {
        matches!(self, DataModule::Vision(_))
    }

    /// One-time materialization. Idempotent.
    pub fn prepare(&mut self) {
        match self {
            DataModule::Tabular(dm) => dm.prepare(),
            DataModule::Vision(dm) => dm.prepare(),
        }
    }

    /// Compute splits; idempotent; panics before `prepare`.
    pub fn setup(&mut self) -> Result<()> {
        match self {
            DataModule::Tabular(dm) => dm.setup(),
            DataModule::Vision(dm) => dm.setup(),
        }
    }

    /// The module configuration.
    pub fn config(&self) -> &DataModuleConfig {
        match self {
            DataModule::Tabular(dm) => dm.config(),
            DataModule::Vision(dm) => dm.config(),
        }
    }

    /// Per-sample input shape.
    pub fn sample_dims(&self) -> Vec<usize> {
        match self {
            DataModule::Tabular(dm) => dm.sample_dims(),
            DataModule::Vision(dm) => dm.sample_dims(),
        }
    }

    /// Flattened per-sample input size.
    pub fn sample_size(&self) -> usize {
        self.sample_dims().iter().product()
    }

    /// Number of target classes.
    pub fn card_y(&self) -> usize {
        match self {
            DataModule::Tabular(dm) => dm.card_y(),
            DataModule::Vision(dm) => dm.card_y(),
        }
    }

    /// Number of sensitive-attribute groups.
    pub fn card_s(&self) -> usize {
        match self {
            DataModule::Tabular(dm) => dm.card_s(),
            DataModule::Vision(dm) => dm.card_s(),
        }
    }

    /// Training split size.
    pub fn train_len(&self) -> usize {
        match self {
            DataModule::Tabular(dm) => dm.train_len(),
            DataModule::Vision(dm) => dm.train_len(),
        }
    }

    /// Set the training batch size.
    pub fn set_train_batch_size(&mut self, batch_size: usize) {
        match self {
            DataModule::Tabular(dm) => dm.set_train_batch_size(batch_size),
            DataModule::Vision(dm) => dm.set_train_batch_size(batch_size),
        }
    }

    /// Set the training iteration mode.
    pub fn set_training_mode(&mut self, mode: TrainingMode) {
        match self {
            DataModule::Tabular(dm) => dm.set_training_mode(mode),
            DataModule::Vision(dm) => dm.set_training_mode(mode),
        }
    }

    /// Install a training transform on a vision module, in place. Tabular
    /// modules have no transform pipeline, so this is a no-op for them.
    pub fn install_train_transform(&mut self, transform: Rc<dyn ViewTransform>) {
        if let DataModule::Vision(dm) = self {
            dm.install_train_transform(transform);
        }
    }

    /// One training pass of batches.
    pub fn train_batches(&self) -> Vec<TaggedBatch> {
        match self {
            DataModule::Tabular(dm) => dm.train_batches(),
            DataModule::Vision(dm) => dm.train_batches(),
        }
    }

    /// Sequential batches over the validation split.
    pub fn val_batches(&self) -> Vec<TaggedBatch> {
        match self {
            DataModule::Tabular(dm) => dm.val_batches(),
            DataModule::Vision(dm) => dm.val_batches(),
        }
    }

    /// Sequential batches over the test split.
    pub fn test_batches(&self) -> Vec<TaggedBatch> {
        match self {
            DataModule::Tabular(dm) => dm.test_batches(),
            DataModule::Vision(dm) => dm.test_batches(),
        }
    }

    /// Shallow evaluation copy: stratified sampling off, full-epoch
    /// iteration, training batch size optionally overridden, and — on the
    /// vision kind — the training transform replaced by
    /// `eval_train_transform`.
    pub fn eval_variant(
        &self,
        train_batch_override: Option<usize>,
        eval_train_transform: Rc<dyn ViewTransform>,
    ) -> DataModule {
        match self {
            DataModule::Tabular(dm) => {
                DataModule::Tabular(dm.eval_variant(train_batch_override))
            }
            DataModule::Vision(dm) => {
                DataModule::Vision(dm.eval_variant(train_batch_override, eval_train_transform))
            }
        }
    }
}

impl From<TabularDataModule> for DataModule {
    fn from(dm: TabularDataModule) -> Self {
        DataModule::Tabular(dm)
    }
}

impl From<VisionDataModule> for DataModule {
    fn from(dm: VisionDataModule) -> Self {
        DataModule::Vision(dm)
    }
}
