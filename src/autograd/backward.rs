//! Backward-op trait for the gradient tape

/// A node on the gradient tape.
///
/// Each differentiable operation stores one of these on its output tensor.
/// Calling [`backward`](BackwardOp::backward) propagates the output's
/// gradient to the operation's inputs and recurses into their own ops.
pub trait BackwardOp {
    /// Propagate gradients to the inputs of this operation.
    fn backward(&self);
}
