//! InfoNCE contrastive objective
//!
//! Consumes a combined embedding tensor whose first half holds anchor rows
//! and second half positive rows (the packing produced by the instance
//! discriminators), normalizes both sides, and scores every anchor against
//! every positive. The gradient is computed in the forward pass and pushed
//! through the prediction tensor's tape on backward.

use crate::train::{LossFn, PrecomputedGrad};
use crate::Tensor;
use ndarray::Array1;

/// InfoNCE loss over L2-normalized embeddings.
pub struct InfoNCELoss {
    temperature: f32,
    embed_dim: usize,
}

impl InfoNCELoss {
    /// Create with a softmax temperature and the embedding width used to
    /// slice the combined prediction tensor into rows.
    pub fn new(temperature: f32, embed_dim: usize) -> Self {
        assert!(
            temperature.is_finite() && temperature > 0.0,
            "temperature must be > 0, got {temperature}"
        );
        assert!(embed_dim > 0, "embedding dimension must be > 0");
        Self {
            temperature,
            embed_dim,
        }
    }

    fn normalize_rows(rows: &[f32], dim: usize) -> (Vec<f32>, Vec<f32>) {
        let n = rows.len() / dim;
        let mut hat = vec![0.0f32; rows.len()];
        let mut norms = vec![0.0f32; n];
        for i in 0..n {
            let row = &rows[i * dim..(i + 1) * dim];
            let norm = row
                .iter()
                .map(|&v| f64::from(v) * f64::from(v))
                .sum::<f64>()
                .sqrt() as f32;
            let norm = norm.max(f32::EPSILON);
            norms[i] = norm;
            for k in 0..dim {
                hat[i * dim + k] = row[k] / norm;
            }
        }
        (hat, norms)
    }
}

impl LossFn for InfoNCELoss {
    fn forward(&self, predictions: &Tensor, _targets: &Tensor) -> Tensor {
        let dim = self.embed_dim;
        assert_eq!(
            predictions.len() % dim,
            0,
            "prediction length {} is not a multiple of the embedding dim {dim}",
            predictions.len()
        );
        let rows = predictions.len() / dim;
        assert!(
            rows >= 2 && rows % 2 == 0,
            "InfoNCE requires an even number of anchor+positive rows, got {rows}"
        );
        let batch = rows / 2;

        let data = predictions.to_vec();
        let (anchors, anchor_norms) = Self::normalize_rows(&data[..batch * dim], dim);
        let (positives, positive_norms) = Self::normalize_rows(&data[batch * dim..], dim);

        // Pairwise cosine logits, temperature-scaled.
        let mut logits = vec![0.0f32; batch * batch];
        for i in 0..batch {
            for j in 0..batch {
                let mut dot = 0.0f32;
                for k in 0..dim {
                    dot += anchors[i * dim + k] * positives[j * dim + k];
                }
                logits[i * batch + j] = dot / self.temperature;
            }
        }

        // Row-wise softmax cross-entropy with the diagonal as the target,
        // accumulating both the loss and d(loss)/d(hat) as we go.
        let mut loss = 0.0f32;
        let mut grad_anchor_hat = vec![0.0f32; batch * dim];
        let mut grad_positive_hat = vec![0.0f32; batch * dim];
        let scale = 1.0 / (self.temperature * batch as f32);
        for i in 0..batch {
            let row = &logits[i * batch..(i + 1) * batch];
            let max_logit = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = row.iter().map(|&v| (v - max_logit).exp()).collect();
            let sum: f32 = exps.iter().sum();
            loss += -(row[i] - max_logit - sum.ln());

            for j in 0..batch {
                let weight = exps[j] / sum - if i == j { 1.0 } else { 0.0 };
                for k in 0..dim {
                    grad_anchor_hat[i * dim + k] += weight * positives[j * dim + k] * scale;
                    grad_positive_hat[j * dim + k] += weight * anchors[i * dim + k] * scale;
                }
            }
        }
        loss /= batch as f32;

        // Back through the normalization: d/dx = (g - hat * (g . hat)) / |x|.
        let mut grad = vec![0.0f32; data.len()];
        for i in 0..batch {
            through_normalization(
                &grad_anchor_hat[i * dim..(i + 1) * dim],
                &anchors[i * dim..(i + 1) * dim],
                anchor_norms[i],
                &mut grad[i * dim..(i + 1) * dim],
            );
            through_normalization(
                &grad_positive_hat[i * dim..(i + 1) * dim],
                &positives[i * dim..(i + 1) * dim],
                positive_norms[i],
                &mut grad[(batch + i) * dim..(batch + i + 1) * dim],
            );
        }

        let mut loss_tensor = Tensor::from_vec(vec![loss], true);
        PrecomputedGrad::attach(&mut loss_tensor, predictions, Array1::from_vec(grad));
        loss_tensor
    }

    fn name(&self) -> &'static str {
        "InfoNCE"
    }
}

fn through_normalization(grad_hat: &[f32], hat: &[f32], norm: f32, out: &mut [f32]) {
    let dot: f32 = grad_hat.iter().zip(hat.iter()).map(|(g, h)| g * h).sum();
    for k in 0..hat.len() {
        out[k] = (grad_hat[k] - hat[k] * dot) / norm;
    }
}
