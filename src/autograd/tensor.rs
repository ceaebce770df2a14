//! Shared-storage tensor handle
//!
//! A [`Tensor`] is a cheap-clone handle over reference-counted storage:
//! cloning aliases the underlying data, gradient cell, and grad-tracking
//! flag. An optimizer stepping a cloned handle therefore updates the model
//! that owns the original — this is what lets a trainer, a loss function,
//! and a weight-synchronization callback all operate on the same parameters
//! without copying.

use crate::autograd::BackwardOp;
use ndarray::Array1;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

/// 1-D tensor of `f32` values with optional gradient tracking.
///
/// Higher-rank data (batches, matrices, images) is stored flattened in
/// row-major order; the operations that need shape information take explicit
/// dimensions.
#[derive(Clone)]
pub struct Tensor {
    data: Rc<RefCell<Array1<f32>>>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    requires_grad: Rc<Cell<bool>>,
    backward_op: Rc<RefCell<Option<Rc<dyn BackwardOp>>>>,
}

impl Tensor {
    /// Create a tensor from an ndarray.
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        Self {
            data: Rc::new(RefCell::new(data)),
            grad: Rc::new(RefCell::new(None)),
            requires_grad: Rc::new(Cell::new(requires_grad)),
            backward_op: Rc::new(RefCell::new(None)),
        }
    }

    /// Create a tensor from a `Vec`.
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from_vec(data), requires_grad)
    }

    /// Create a zero-filled tensor of length `n`.
    pub fn zeros(n: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(n), requires_grad)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable view of the data.
    pub fn data(&self) -> Ref<'_, Array1<f32>> {
        self.data.borrow()
    }

    /// Mutable view of the data.
    pub fn data_mut(&self) -> RefMut<'_, Array1<f32>> {
        self.data.borrow_mut()
    }

    /// Copy the data out as a `Vec`.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.borrow().to_vec()
    }

    /// Whether gradients are tracked for this tensor.
    pub fn requires_grad(&self) -> bool {
        self.requires_grad.get()
    }

    /// Enable or disable gradient tracking.
    ///
    /// The flag is shared across all handles to the same storage, so
    /// detaching one handle detaches every alias.
    pub fn set_requires_grad(&self, requires_grad: bool) {
        self.requires_grad.set(requires_grad);
    }

    /// Current gradient, if one has been accumulated.
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// The shared gradient cell, for backward ops that accumulate directly.
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        Rc::clone(&self.grad)
    }

    /// Overwrite the gradient.
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add `delta` into the gradient, initializing it if absent.
    pub fn accumulate_grad(&self, delta: Array1<f32>) {
        let mut slot = self.grad.borrow_mut();
        match slot.as_mut() {
            Some(existing) => *existing = &*existing + &delta,
            None => *slot = Some(delta),
        }
    }

    /// Clear the gradient.
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// The backward op attached to this tensor, if any.
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.borrow().clone()
    }

    /// Attach a backward op.
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        *self.backward_op.borrow_mut() = Some(op);
    }

    /// A grad-free tensor over a *copy* of the data.
    ///
    /// The result shares nothing with `self`: no gradient cell, no backward
    /// op, no storage. Used to cut the tape between a feature extractor and
    /// a downstream head.
    pub fn detach(&self) -> Tensor {
        Tensor::new(self.data.borrow().clone(), false)
    }

    /// Whether two handles alias the same storage.
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// Concatenate tensors along the only axis, at the data level.
    ///
    /// The result is a fresh grad-free tensor; use the autograd `concat_rows`
    /// op when gradients must flow through the concatenation.
    pub fn cat(parts: &[&Tensor]) -> Tensor {
        let total: usize = parts.iter().map(|t| t.len()).sum();
        let mut out = Vec::with_capacity(total);
        for part in parts {
            out.extend(part.data().iter().copied());
        }
        Tensor::from_vec(out, false)
    }

    /// Split a tensor into two equal halves, at the data level.
    ///
    /// # Panics
    ///
    /// Panics if the length is odd.
    pub fn chunk2(&self) -> (Tensor, Tensor) {
        let n = self.len();
        assert!(n % 2 == 0, "chunk2 requires an even length, got {n}");
        let data = self.to_vec();
        let half = n / 2;
        let first = Tensor::from_vec(data[..half].to_vec(), false);
        let second = Tensor::from_vec(data[half..].to_vec(), false);
        (first, second)
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("len", &self.len())
            .field("requires_grad", &self.requires_grad())
            .finish()
    }
}
