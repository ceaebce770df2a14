//! AdamW optimizer with decoupled weight decay

use super::Optimizer;
use crate::Tensor;
use ndarray::Array1;

/// AdamW: Adam with decoupled weight decay.
///
/// Weight decay is applied directly to the parameters rather than folded
/// into the gradient, following Loshchilov & Hutter.
pub struct AdamW {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    t: u64,
    moments: Vec<Option<(Array1<f32>, Array1<f32>)>>,
}

impl AdamW {
    /// Create a new AdamW optimizer.
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
            t: 0,
            moments: Vec::new(),
        }
    }

    /// AdamW with the customary betas/epsilon.
    pub fn with_defaults(lr: f32, weight_decay: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8, weight_decay)
    }

    fn ensure_moments(&mut self, params: &[Tensor]) {
        if self.moments.len() != params.len() {
            self.moments = params.iter().map(|_| None).collect();
        }
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_moments(params);
        self.t += 1;
        let t = self.t as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);

        for (i, param) in params.iter_mut().enumerate() {
            let Some(grad) = param.grad() else {
                continue;
            };
            let (m, v) = self.moments[i].get_or_insert_with(|| {
                (Array1::zeros(grad.len()), Array1::zeros(grad.len()))
            });

            *m = &*m * self.beta1 + &grad * (1.0 - self.beta1);
            *v = &*v * self.beta2 + &(&grad * &grad) * (1.0 - self.beta2);

            let mut data = param.data_mut();
            for k in 0..data.len() {
                let m_hat = m[k] / bias1;
                let v_hat = v[k] / bias2;
                let update = m_hat / (v_hat.sqrt() + self.eps);
                let decay = self.weight_decay * data[k];
                data[k] -= self.lr * (update + decay);
            }
        }
    }

    fn reset(&mut self) {
        self.moments.clear();
        self.t = 0;
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_adamw_first_step_magnitude() {
        // With a constant gradient, the bias-corrected first step is ~lr.
        let mut opt = AdamW::with_defaults(0.01, 0.0);
        let param = Tensor::from_vec(vec![1.0], true);
        param.set_grad(arr1(&[0.5]));
        opt.step(&mut [param.clone()]);
        assert!((param.to_vec()[0] - (1.0 - 0.01)).abs() < 1e-4);
    }

    #[test]
    fn test_adamw_weight_decay_shrinks_params() {
        let mut opt = AdamW::with_defaults(0.1, 0.5);
        let param = Tensor::from_vec(vec![2.0], true);
        param.set_grad(arr1(&[0.0]));
        opt.step(&mut [param.clone()]);
        // Pure decay: 2.0 - 0.1 * 0.5 * 2.0 = 1.9
        assert!((param.to_vec()[0] - 1.9).abs() < 1e-5);
    }

    #[test]
    fn test_adamw_reset_restarts_timestep() {
        let mut opt = AdamW::with_defaults(0.01, 0.0);
        let param = Tensor::from_vec(vec![1.0], true);
        param.set_grad(arr1(&[0.5]));
        opt.step(&mut [param.clone()]);

        opt.reset();
        assert_eq!(opt.t, 0);
        assert!(opt.moments.is_empty());
    }

    #[test]
    fn test_adamw_converges_on_quadratic() {
        // Minimize f(x) = x^2; grad = 2x.
        let mut opt = AdamW::with_defaults(0.1, 0.0);
        let param = Tensor::from_vec(vec![3.0], true);
        for _ in 0..200 {
            let x = param.to_vec()[0];
            param.set_grad(arr1(&[2.0 * x]));
            opt.step(&mut [param.clone()]);
            param.zero_grad();
        }
        assert!(param.to_vec()[0].abs() < 0.1);
    }
}
