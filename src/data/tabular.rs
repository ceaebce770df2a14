//! Tabular data module

use crate::data::datamodule::{DataModuleConfig, DataModuleCore, TrainingMode};
use crate::data::dataset::{TabularDataset, TabularStore, TaggedDataset};
use crate::data::sample::{BatchInput, TaggedBatch};
use crate::data::Result;
use crate::Tensor;

/// Data module over in-memory tabular features with optional target and
/// sensitive-attribute columns.
pub struct TabularDataModule {
    core: DataModuleCore<TabularStore>,
}

impl TabularDataModule {
    /// Create a module over `dataset` with the given configuration.
    pub fn new(dataset: TabularDataset, config: DataModuleConfig) -> Result<Self> {
        Ok(Self {
            core: DataModuleCore::new(dataset, config)?,
        })
    }

    /// One-time materialization. Idempotent.
    pub fn prepare(&mut self) {
        self.core.prepare();
    }

    /// Whether `prepare` has run.
    pub fn is_prepared(&self) -> bool {
        self.core.is_prepared()
    }

    /// Compute splits; idempotent; panics before `prepare`.
    pub fn setup(&mut self) -> Result<()> {
        self.core.setup()
    }

    /// The module configuration.
    pub fn config(&self) -> &DataModuleConfig {
        self.core.config()
    }

    /// Set the training batch size.
    pub fn set_train_batch_size(&mut self, batch_size: usize) {
        self.core.config_mut().train_batch_size = batch_size;
    }

    /// Set the training iteration mode.
    pub fn set_training_mode(&mut self, mode: TrainingMode) {
        self.core.config_mut().training_mode = mode;
    }

    /// Per-sample input shape.
    pub fn sample_dims(&self) -> Vec<usize> {
        self.core.sample_dims()
    }

    /// Number of target classes in the source dataset.
    pub fn card_y(&self) -> usize {
        self.core.source().card_y()
    }

    /// Number of sensitive-attribute groups in the source dataset.
    pub fn card_s(&self) -> usize {
        self.core.source().card_s()
    }

    /// Training split size.
    pub fn train_len(&self) -> usize {
        self.core.splits().train.len()
    }

    /// One training pass of batches.
    pub fn train_batches(&self) -> Vec<TaggedBatch> {
        let splits = self.core.splits();
        self.core
            .train_index_batches()
            .iter()
            .map(|idx| assemble(&splits.train, idx))
            .collect()
    }

    /// Sequential batches over the validation split.
    pub fn val_batches(&self) -> Vec<TaggedBatch> {
        let splits = self.core.splits();
        self.core
            .eval_index_batches(splits.val.len())
            .iter()
            .map(|idx| assemble(&splits.val, idx))
            .collect()
    }

    /// Sequential batches over the test split.
    pub fn test_batches(&self) -> Vec<TaggedBatch> {
        let splits = self.core.splits();
        self.core
            .eval_index_batches(splits.test.len())
            .iter()
            .map(|idx| assemble(&splits.test, idx))
            .collect()
    }

    /// Shallow evaluation copy (shared dataset and splits, overridden
    /// sampling configuration).
    pub fn eval_variant(&self, train_batch_override: Option<usize>) -> Self {
        Self {
            core: self.core.eval_core(train_batch_override),
        }
    }
}

/// Collate selected rows into a tagged batch.
fn assemble(dataset: &TaggedDataset<TabularStore>, indices: &[usize]) -> TaggedBatch {
    let dim: usize = dataset.sample_dims().iter().product();
    let mut flat = Vec::with_capacity(indices.len() * dim);
    for &i in indices {
        flat.extend(dataset.x().row(i).iter().copied());
    }
    let x = BatchInput::Flat(Tensor::from_vec(flat, false));
    TaggedBatch::from_parts(x, label_column(dataset.y(), indices), label_column(dataset.s(), indices))
}

pub(crate) fn label_column(
    column: Option<&ndarray::Array1<i64>>,
    indices: &[usize],
) -> Option<Tensor> {
    column.map(|values| {
        Tensor::from_vec(indices.iter().map(|&i| values[i] as f32).collect(), false)
    })
}
