//! Vision data module with installable view transforms

use crate::data::datamodule::{DataModuleConfig, DataModuleCore, TrainingMode};
use crate::data::dataset::{ImageStore, TaggedDataset, VisionDataset};
use crate::data::sample::{BatchInput, TaggedBatch};
use crate::data::tabular::label_column;
use crate::data::Result;
use crate::transforms::{Identity, MultiCropOutput, TransformedView, ViewTransform};
use crate::Tensor;
use rand::rngs::StdRng;
use std::rc::Rc;

/// Data module over in-memory images with optional target and
/// sensitive-attribute columns.
///
/// A training transform can be installed after construction (the
/// self-supervised build step does this in place); evaluation loaders use a
/// separate transform that defaults to the identity.
pub struct VisionDataModule {
    core: DataModuleCore<ImageStore>,
    train_transform: Option<Rc<dyn ViewTransform>>,
    eval_transform: Rc<dyn ViewTransform>,
}

impl VisionDataModule {
    /// Create a module over `dataset` with the given configuration and no
    /// transforms installed.
    pub fn new(dataset: VisionDataset, config: DataModuleConfig) -> Result<Self> {
        Ok(Self {
            core: DataModuleCore::new(dataset, config)?,
            train_transform: None,
            eval_transform: Rc::new(Identity),
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

    /// Install (or replace) the training transform in place.
    pub fn install_train_transform(&mut self, transform: Rc<dyn ViewTransform>) {
        self.train_transform = Some(transform);
    }

    /// The currently installed training transform.
    pub fn train_transform(&self) -> Option<&Rc<dyn ViewTransform>> {
        self.train_transform.as_ref()
    }

    /// Replace the evaluation transform.
    pub fn set_eval_transform(&mut self, transform: Rc<dyn ViewTransform>) {
        self.eval_transform = transform;
    }

    /// Per-sample input shape (`[channels, height, width]`).
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

    /// One training pass of batches, run through the installed training
    /// transform.
    pub fn train_batches(&self) -> Vec<TaggedBatch> {
        let splits = self.core.splits();
        let mut rng = self.core.next_rng();
        self.core
            .train_index_batches()
            .iter()
            .map(|idx| assemble(&splits.train, idx, self.train_transform.as_deref(), &mut rng))
            .collect()
    }

    /// Sequential batches over the validation split, run through the
    /// evaluation transform.
    pub fn val_batches(&self) -> Vec<TaggedBatch> {
        let splits = self.core.splits();
        let mut rng = self.core.next_rng();
        self.core
            .eval_index_batches(splits.val.len())
            .iter()
            .map(|idx| assemble(&splits.val, idx, Some(&*self.eval_transform), &mut rng))
            .collect()
    }

    /// Sequential batches over the test split, run through the evaluation
    /// transform.
    pub fn test_batches(&self) -> Vec<TaggedBatch> {
        let splits = self.core.splits();
        let mut rng = self.core.next_rng();
        self.core
            .eval_index_batches(splits.test.len())
            .iter()
            .map(|idx| assemble(&splits.test, idx, Some(&*self.eval_transform), &mut rng))
            .collect()
    }

    /// Shallow evaluation copy: shared dataset and splits, overridden
    /// sampling configuration, and the training transform replaced by
    /// `train_transform` (the probe-time augmentation policy).
    pub fn eval_variant(
        &self,
        train_batch_override: Option<usize>,
        train_transform: Rc<dyn ViewTransform>,
    ) -> Self {
        Self {
            core: self.core.eval_core(train_batch_override),
            train_transform: Some(train_transform),
            eval_transform: Rc::clone(&self.eval_transform),
        }
    }
}

/// Collate selected images into a tagged batch, applying `transform` when
/// installed. With no transform the batch stays a raw image list; an
/// image-yielding transform collates to a flat matrix; a view-yielding
/// transform collates crop-wise into a batch-level multi-crop structure.
fn assemble(
    dataset: &TaggedDataset<ImageStore>,
    indices: &[usize],
    transform: Option<&dyn ViewTransform>,
    rng: &mut StdRng,
) -> TaggedBatch {
    let y = label_column(dataset.y(), indices);
    let s = label_column(dataset.s(), indices);

    let Some(transform) = transform else {
        let images = indices
            .iter()
            .map(|&i| dataset.x().image(i).clone())
            .collect();
        return TaggedBatch::from_parts(BatchInput::Images(images), y, s);
    };

    let mut flat_rows: Vec<Tensor> = Vec::new();
    let mut view_rows: Vec<MultiCropOutput> = Vec::new();
    for &i in indices {
        match transform.apply(dataset.x().image(i), rng) {
            TransformedView::Image(image) => flat_rows.push(image.to_tensor()),
            TransformedView::Views(views) => view_rows.push(views),
        }
    }

    let x = if view_rows.is_empty() {
        let refs: Vec<&Tensor> = flat_rows.iter().collect();
        BatchInput::Flat(Tensor::cat(&refs))
    } else {
        BatchInput::Views(collate_views(&view_rows))
    };
    TaggedBatch::from_parts(x, y, s)
}

/// Stack per-sample view sets crop-wise: slot `j` of the result is the
/// concatenation of every sample's crop `j`, in batch order.
fn collate_views(rows: &[MultiCropOutput]) -> MultiCropOutput {
    let globals = rows[0].global_crops.len();
    let locals = rows[0].local_crops.len();

    let global_crops = (0..globals)
        .map(|j| {
            let parts: Vec<&Tensor> = rows.iter().map(|r| &r.global_crops[j]).collect();
            Tensor::cat(&parts)
        })
        .collect();
    let local_crops = (0..locals)
        .map(|j| {
            let parts: Vec<&Tensor> = rows.iter().map(|r| &r.local_crops[j]).collect();
            Tensor::cat(&parts)
        })
        .collect();

    MultiCropOutput {
        global_crops,
        local_crops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::MultiCropTransform;

    fn module() -> VisionDataModule {
        let config = DataModuleConfig {
            train_batch_size: 4,
            ..Default::default()
        };
        let mut dm = VisionDataModule::new(
            VisionDataset::synthetic(20, 3, 8, 8, Some(2), Some(2), 9),
            config,
        )
        .unwrap();
        dm.prepare();
        dm.setup().unwrap();
        dm
    }

    #[test]
    fn test_without_transform_batches_are_raw_images() {
        let dm = module();
        let batches = dm.train_batches();
        let BatchInput::Images(images) = batches[0].x() else {
            panic!("expected raw images without an installed transform");
        };
        assert_eq!(images.len(), 4);
        assert_eq!(images[0].dims(), vec![3, 8, 8]);
    }

    #[test]
    fn test_multicrop_transform_collates_views() {
        let mut dm = module();
        let mut transform = MultiCropTransform::new().with_local_crop_count(2);
        transform.resolve_global_size(&dm.sample_dims());
        dm.install_train_transform(Rc::new(transform));

        let batches = dm.train_batches();
        let BatchInput::Views(views) = batches[0].x() else {
            panic!("expected multi-crop views");
        };
        assert_eq!(views.global_crops.len(), 2);
        assert_eq!(views.local_crops.len(), 2);
        // Each global slot holds the whole batch: 4 * 3*8*8
        assert_eq!(views.global_crops[0].len(), 4 * 3 * 8 * 8);
    }

    #[test]
    fn test_eval_batches_are_flat() {
        let dm = module();
        let batches = dm.val_batches();
        let BatchInput::Flat(x) = batches[0].x() else {
            panic!("identity eval transform must collate to a flat matrix");
        };
        assert_eq!(x.len(), 4 * 3 * 8 * 8);
    }

    #[test]
    fn test_eval_variant_replaces_train_transform_only() {
        let mut dm = module();
        let mut multicrop = MultiCropTransform::new();
        multicrop.resolve_global_size(&dm.sample_dims());
        dm.install_train_transform(Rc::new(multicrop));

        let eval = dm.eval_variant(Some(8), Rc::new(Identity));
        let batches = eval.train_batches();
        assert!(matches!(batches[0].x(), BatchInput::Flat(_)));
        assert_eq!(eval.config().train_batch_size, 8);

        // The live module still produces views at its own batch size.
        let batches = dm.train_batches();
        assert!(matches!(batches[0].x(), BatchInput::Views(_)));
        assert_eq!(dm.config().train_batch_size, 4);
    }
}
