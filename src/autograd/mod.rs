//! Tape-based autograd engine
//!
//! Provides automatic differentiation using a computational graph with
//! gradient tape. Tensors are cheap-clone handles over shared storage; see
//! [`Tensor`] for the aliasing rules.

mod backward;
mod ops;
mod tensor;

pub use backward::BackwardOp;
pub use ops::{concat_rows, linear, relu};
pub use tensor::Tensor;

/// Perform backward pass on a tensor.
///
/// Seeds the gradient with `grad_output` (ones if absent, the convention for
/// scalar losses) and walks the tape.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        let ones = ndarray::Array1::ones(tensor.len());
        tensor.set_grad(ones);
    }

    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}
