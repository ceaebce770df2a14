//! Differentiable operations: batched linear, relu, row concatenation

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Batched affine map: `out[b, o] = sum_k x[b, k] * w[o, k] + bias[o]`.
///
/// `x` is `batch * in_dim` elements row-major, `w` is `out_dim * in_dim`,
/// `bias` is `out_dim`. Gradients are accumulated into whichever of the
/// three inputs requires them.
///
/// # Panics
///
/// Panics when the element counts do not match the stated dimensions.
pub fn linear(x: &Tensor, w: &Tensor, bias: &Tensor, in_dim: usize, out_dim: usize) -> Tensor {
    assert!(in_dim > 0 && out_dim > 0, "linear dimensions must be > 0");
    assert_eq!(
        x.len() % in_dim,
        0,
        "input length {} is not a multiple of in_dim {}",
        x.len(),
        in_dim
    );
    assert_eq!(w.len(), out_dim * in_dim, "weight length mismatch");
    assert_eq!(bias.len(), out_dim, "bias length mismatch");

    let batch = x.len() / in_dim;
    let x_data = x.to_vec();
    let w_data = w.to_vec();
    let b_data = bias.to_vec();

    let mut out = vec![0.0f32; batch * out_dim];
    for bi in 0..batch {
        let row = &x_data[bi * in_dim..(bi + 1) * in_dim];
        for o in 0..out_dim {
            let weights = &w_data[o * in_dim..(o + 1) * in_dim];
            let mut acc = b_data[o];
            for k in 0..in_dim {
                acc += row[k] * weights[k];
            }
            out[bi * out_dim + o] = acc;
        }
    }

    let requires_grad = x.requires_grad() || w.requires_grad() || bias.requires_grad();
    let mut result = Tensor::from_vec(out, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(LinearBackward {
            x: x.clone(),
            w: w.clone(),
            bias: bias.clone(),
            x_data,
            w_data,
            in_dim,
            out_dim,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct LinearBackward {
    x: Tensor,
    w: Tensor,
    bias: Tensor,
    x_data: Vec<f32>,
    w_data: Vec<f32>,
    in_dim: usize,
    out_dim: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for LinearBackward {
    fn backward(&self) {
        let guard = self.result_grad.borrow();
        let Some(grad) = guard.as_ref() else {
            return;
        };
        let batch = self.x_data.len() / self.in_dim;

        if self.w.requires_grad() {
            let mut grad_w = vec![0.0f32; self.out_dim * self.in_dim];
            for bi in 0..batch {
                for o in 0..self.out_dim {
                    let g = grad[bi * self.out_dim + o];
                    for k in 0..self.in_dim {
                        grad_w[o * self.in_dim + k] += g * self.x_data[bi * self.in_dim + k];
                    }
                }
            }
            self.w.accumulate_grad(Array1::from_vec(grad_w));
        }
        if self.bias.requires_grad() {
            let mut grad_b = vec![0.0f32; self.out_dim];
            for bi in 0..batch {
                for o in 0..self.out_dim {
                    grad_b[o] += grad[bi * self.out_dim + o];
                }
            }
            self.bias.accumulate_grad(Array1::from_vec(grad_b));
        }
        if self.x.requires_grad() {
            let mut grad_x = vec![0.0f32; self.x_data.len()];
            for bi in 0..batch {
                for o in 0..self.out_dim {
                    let g = grad[bi * self.out_dim + o];
                    for k in 0..self.in_dim {
                        grad_x[bi * self.in_dim + k] += g * self.w_data[o * self.in_dim + k];
                    }
                }
            }
            self.x.accumulate_grad(Array1::from_vec(grad_x));
        }
        drop(guard);

        if let Some(op) = self.x.backward_op() {
            op.backward();
        }
    }
}

/// Element-wise rectified linear unit.
pub fn relu(x: &Tensor) -> Tensor {
    let data: Vec<f32> = x.data().iter().map(|&v| v.max(0.0)).collect();
    let requires_grad = x.requires_grad();
    let mut result = Tensor::from_vec(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ReluBackward {
            x: x.clone(),
            mask: x.data().iter().map(|&v| v > 0.0).collect(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct ReluBackward {
    x: Tensor,
    mask: Vec<bool>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ReluBackward {
    fn backward(&self) {
        let guard = self.result_grad.borrow();
        let Some(grad) = guard.as_ref() else {
            return;
        };
        let masked: Vec<f32> = grad
            .iter()
            .zip(self.mask.iter())
            .map(|(&g, &m)| if m { g } else { 0.0 })
            .collect();
        self.x.accumulate_grad(Array1::from_vec(masked));
        drop(guard);

        if let Some(op) = self.x.backward_op() {
            op.backward();
        }
    }
}

/// Concatenate two tensors along the row axis with gradient flow.
///
/// The output gradient splits at `a.len()`: the head flows into `a`, the
/// tail into `b`.
pub fn concat_rows(a: &Tensor, b: &Tensor) -> Tensor {
    let mut data = a.to_vec();
    data.extend(b.to_vec());
    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::from_vec(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(ConcatBackward {
            a: a.clone(),
            b: b.clone(),
            split: a.len(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct ConcatBackward {
    a: Tensor,
    b: Tensor,
    split: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ConcatBackward {
    fn backward(&self) {
        let guard = self.result_grad.borrow();
        let Some(grad) = guard.as_ref() else {
            return;
        };
        if self.a.requires_grad() {
            self.a
                .accumulate_grad(Array1::from_vec(grad.iter().take(self.split).copied().collect()));
        }
        if self.b.requires_grad() {
            self.b
                .accumulate_grad(Array1::from_vec(grad.iter().skip(self.split).copied().collect()));
        }
        drop(guard);

        if let Some(op) = self.a.backward_op() {
            op.backward();
        }
        if let Some(op) = self.b.backward_op() {
            op.backward();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_forward() {
        // 2x2 input, 2 -> 1 map: out = x0 + 2*x1 + 0.5
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let w = Tensor::from_vec(vec![1.0, 2.0], false);
        let b = Tensor::from_vec(vec![0.5], false);
        let out = linear(&x, &w, &b, 2, 1);
        assert_eq!(out.to_vec(), vec![5.5, 11.5]);
        assert!(!out.requires_grad());
    }

    #[test]
    fn test_linear_backward_accumulates_weight_and_bias_grads() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let w = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = Tensor::from_vec(vec![0.5], true);
        let mut out = linear(&x, &w, &b, 2, 1);
        backward(&mut out, None);

        // d/dw = sum over batch of x rows; d/db = batch size
        let gw = w.grad().unwrap();
        assert_abs_diff_eq!(gw[0], 4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(gw[1], 6.0, epsilon = 1e-6);
        assert_abs_diff_eq!(b.grad().unwrap()[0], 2.0, epsilon = 1e-6);
        assert!(x.grad().is_none());
    }

    #[test]
    fn test_relu_masks_gradient() {
        let x = Tensor::from_vec(vec![-1.0, 2.0], true);
        let mut out = relu(&x);
        assert_eq!(out.to_vec(), vec![0.0, 2.0]);
        backward(&mut out, None);
        assert_eq!(x.grad().unwrap().to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_concat_rows_splits_gradient() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = Tensor::from_vec(vec![3.0], true);
        let mut out = concat_rows(&a, &b);
        assert_eq!(out.to_vec(), vec![1.0, 2.0, 3.0]);
        out.set_grad(ndarray::arr1(&[0.1, 0.2, 0.3]));
        out.backward_op().unwrap().backward();
        assert_eq!(a.grad().unwrap().to_vec(), vec![0.1, 0.2]);
        assert_eq!(b.grad().unwrap().to_vec(), vec![0.3]);
    }

    #[test]
    fn test_chained_linear_relu_reaches_first_layer() {
        let x = Tensor::from_vec(vec![1.0, -1.0], false);
        let w1 = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], true);
        let b1 = Tensor::zeros(2, true);
        let w2 = Tensor::from_vec(vec![1.0, 1.0], true);
        let b2 = Tensor::zeros(1, true);
        let h = relu(&linear(&x, &w1, &b1, 2, 2));
        let mut out = linear(&h, &w2, &b2, 2, 1);
        backward(&mut out, None);
        assert!(w1.grad().is_some());
        assert!(w2.grad().is_some());
    }
}
