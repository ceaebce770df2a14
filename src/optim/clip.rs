//! Gradient clipping

use crate::Tensor;

/// Clip gradients in place so their global L2 norm does not exceed
/// `max_norm`. Returns the pre-clip norm.
pub fn clip_grad_norm(params: &mut [Tensor], max_norm: f32) -> f32 {
    let mut total_sq = 0.0f64;
    for param in params.iter() {
        if let Some(grad) = param.grad() {
            total_sq += grad.iter().map(|&g| f64::from(g) * f64::from(g)).sum::<f64>();
        }
    }
    let total_norm = total_sq.sqrt() as f32;

    if total_norm > max_norm && total_norm > 0.0 {
        let scale = max_norm / total_norm;
        for param in params.iter() {
            if let Some(grad) = param.grad() {
                param.set_grad(grad * scale);
            }
        }
    }
    total_norm
}
