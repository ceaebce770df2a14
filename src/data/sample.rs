//! Tagged batches
//!
//! A batch materializes exactly one of four shapes depending on which of
//! the target (`y`) and sensitive attribute (`s`) columns the dataset
//! carries — never a superset with absent fields coerced to placeholders.

use crate::transforms::{ImageTensor, MultiCropOutput};
use crate::Tensor;

/// The input payload of a batch.
#[derive(Clone, Debug)]
pub enum BatchInput {
    /// Collated feature matrix, row-major `batch x dim`.
    Flat(Tensor),
    /// Multi-crop views produced by an installed instance-view transform.
    Views(MultiCropOutput),
    /// Raw, un-collated vision samples (no transform pipeline installed).
    Images(Vec<ImageTensor>),
}

impl BatchInput {
    /// Short description of the payload shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            BatchInput::Flat(_) => "flat tensor",
            BatchInput::Views(_) => "multi-crop views",
            BatchInput::Images(_) => "raw images",
        }
    }
}

/// A batch tagged by which annotation columns it carries.
#[derive(Clone, Debug)]
pub enum TaggedBatch {
    /// Inputs only.
    Plain { x: BatchInput },
    /// Inputs with prediction targets.
    Labeled { x: BatchInput, y: Tensor },
    /// Inputs with sensitive-attribute annotations.
    Grouped { x: BatchInput, s: Tensor },
    /// Inputs with both targets and sensitive attributes.
    Full {
        x: BatchInput,
        y: Tensor,
        s: Tensor,
    },
}

impl TaggedBatch {
    /// Assemble the appropriate variant from optional columns.
    pub fn from_parts(x: BatchInput, y: Option<Tensor>, s: Option<Tensor>) -> Self {
        match (y, s) {
            (None, None) => TaggedBatch::Plain { x },
            (Some(y), None) => TaggedBatch::Labeled { x, y },
            (None, Some(s)) => TaggedBatch::Grouped { x, s },
            (Some(y), Some(s)) => TaggedBatch::Full { x, y, s },
        }
    }

    /// The input payload.
    pub fn x(&self) -> &BatchInput {
        match self {
            TaggedBatch::Plain { x }
            | TaggedBatch::Labeled { x, .. }
            | TaggedBatch::Grouped { x, .. }
            | TaggedBatch::Full { x, .. } => x,
        }
    }

    /// Targets, when the batch carries them.
    pub fn y(&self) -> Option<&Tensor> {
        match self {
            TaggedBatch::Labeled { y, .. } | TaggedBatch::Full { y, .. } => Some(y),
            _ => None,
        }
    }

    /// Sensitive attributes, when the batch carries them.
    pub fn s(&self) -> Option<&Tensor> {
        match self {
            TaggedBatch::Grouped { s, .. } | TaggedBatch::Full { s, .. } => Some(s),
            _ => None,
        }
    }

    /// Targets, panicking when absent.
    ///
    /// # Panics
    ///
    /// Panics if the batch has no target column.
    pub fn require_y(&self) -> &Tensor {
        self.y()
            .expect("batch carries no targets; supervised evaluation requires a labeled dataset")
    }
}
