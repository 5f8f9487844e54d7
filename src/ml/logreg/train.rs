use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::config::TrainingSettings;
use crate::ml::math::softmax;

/// Training options for the logistic regression head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOptions {
    pub epochs: usize,
    /// Step size before scaling by the mean squared input norm.
    pub learning_rate: f32,
    pub l2: f32,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self::from(&TrainingSettings::default())
    }
}

impl From<&TrainingSettings> for TrainOptions {
    fn from(settings: &TrainingSettings) -> Self {
        Self {
            epochs: settings.logreg_epochs,
            learning_rate: settings.logreg_learning_rate,
            l2: settings.logreg_l2,
            batch_size: 32,
            seed: settings.seed,
        }
    }
}

/// Mini-batch softmax regression. Inputs are assumed validated by the caller.
///
/// Returns `(weights, bias)` with weights laid out `[class][feature]`.
pub fn train_logreg(
    x: &[Vec<f32>],
    y: &[u8],
    classes: &[u8],
    dim: usize,
    options: &TrainOptions,
) -> (Vec<f32>, Vec<f32>) {
    let n_classes = classes.len();
    let targets: Vec<usize> = y
        .iter()
        .map(|label| classes.iter().position(|c| c == label).unwrap_or(0))
        .collect();

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut weights = vec![0.0f32; n_classes * dim];
    let mut bias = vec![0.0f32; n_classes];
    for w in &mut weights {
        *w = (rng.random::<f32>() - 0.5) * 0.01;
    }

    // Raw pixel rows have large norms; scale the step so one update moves logits by ~lr.
    let mean_sq_norm =
        x.iter().map(|row| row.iter().map(|v| v * v).sum::<f32>()).sum::<f32>() / x.len() as f32;
    let lr = options.learning_rate / mean_sq_norm.max(1.0);
    let l2 = options.l2.max(0.0);
    let batch_size = options.batch_size.max(1);
    let mut indices: Vec<usize> = (0..x.len()).collect();

    for _epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        for chunk in indices.chunks(batch_size) {
            let mut grad_w = vec![0.0f32; weights.len()];
            let mut grad_b = vec![0.0f32; bias.len()];
            for &idx in chunk {
                let row = &x[idx];
                let mut logits = vec![0.0f32; n_classes];
                for c in 0..n_classes {
                    let base = c * dim;
                    let mut sum = bias[c];
                    for i in 0..dim {
                        sum += weights[base + i] * row[i];
                    }
                    logits[c] = sum;
                }
                let probs = softmax(&logits);
                for c in 0..n_classes {
                    let diff = probs[c] - if c == targets[idx] { 1.0 } else { 0.0 };
                    let base = c * dim;
                    for i in 0..dim {
                        grad_w[base + i] += diff * row[i];
                    }
                    grad_b[c] += diff;
                }
            }
            let inv = 1.0 / chunk.len() as f32;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= lr * (g * inv + l2 * *w);
            }
            for (b, g) in bias.iter_mut().zip(&grad_b) {
                *b -= lr * g * inv;
            }
        }
    }
    (weights, bias)
}
