//! Batch data structure

use crate::Tensor;

/// A training batch containing inputs and targets.
#[derive(Clone)]
pub struct Batch {
    /// Input features
    pub inputs: Tensor,
    /// Target labels/values
    pub targets: Tensor,
}

impl Batch {
    /// Create a new batch.
    pub fn new(inputs: Tensor, targets: Tensor) -> Self {
        Self { inputs, targets }
    }

    /// Number of input elements.
    pub fn size(&self) -> usize {
        self.inputs.len()
    }
}
