//! Linear support vector machine, one-vs-rest, trained with hinge-loss SGD.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::math::{argmax, axpy, dot};
use super::{Classifier, FitError, check_query, check_training_set};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    pub epochs: usize,
    pub learning_rate: f32,
    pub l2: f32,
    pub seed: u64,
    pub classes: Vec<u8>,
    pub feature_len: usize,
    /// Row-major `[class][feature]` hyperplane normals.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl LinearSvm {
    pub fn new(epochs: usize, learning_rate: f32, l2: f32, seed: u64) -> Self {
        Self {
            epochs: epochs.max(1),
            learning_rate,
            l2,
            seed,
            classes: Vec::new(),
            feature_len: 0,
            weights: Vec::new(),
            bias: Vec::new(),
        }
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    /// Check that weight and bias buffers match the declared classes and width.
    pub fn validate(&self) -> Result<(), String> {
        let classes = self.classes.len();
        if classes == 0 {
            return Err("No classes defined".to_string());
        }
        if self.weights.len() != classes * self.feature_len {
            return Err(format!(
                "weights length {} does not match {classes} x {}",
                self.weights.len(),
                self.feature_len
            ));
        }
        if self.bias.len() != classes {
            return Err(format!("bias length {} for {classes} classes", self.bias.len()));
        }
        Ok(())
    }

    /// Signed distance-like score of `features` for each class.
    pub fn decision_function(&self, features: &[f32]) -> Vec<f32> {
        self.bias
            .iter()
            .enumerate()
            .map(|(c, b)| {
                let base = c * self.feature_len;
                dot(&self.weights[base..base + self.feature_len], features) + b
            })
            .collect()
    }

    fn fit_binary(&self, x: &[Vec<f32>], targets: &[f32], seed: u64) -> (Vec<f32>, f32) {
        let dim = x[0].len();
        let mut w = vec![0.0f32; dim];
        let mut b = 0.0f32;
        let mut order: Vec<usize> = (0..x.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let lr = self.learning_rate;
        let decay = 1.0 - lr * self.l2;
        for _epoch in 0..self.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                let target = targets[i];
                let margin = target * (dot(&w, &x[i]) + b);
                if decay < 1.0 {
                    for v in &mut w {
                        *v *= decay;
                    }
                }
                if margin < 1.0 {
                    axpy(&mut w, lr * target, &x[i]);
                    b += lr * target;
                }
            }
        }
        (w, b)
    }
}

impl Classifier for LinearSvm {
    fn fit(&mut self, x: &[Vec<f32>], y: &[u8]) -> Result<(), FitError> {
        let (dim, classes) = check_training_set(x, y)?;
        let mut weights = vec![0.0f32; classes.len() * dim];
        let mut bias = vec![0.0f32; classes.len()];
        if classes.len() > 1 {
            for (c, &class) in classes.iter().enumerate() {
                let targets: Vec<f32> = y
                    .iter()
                    .map(|&label| if label == class { 1.0 } else { -1.0 })
                    .collect();
                let (w, b) = self.fit_binary(x, &targets, self.seed.wrapping_add(c as u64));
                weights[c * dim..(c + 1) * dim].copy_from_slice(&w);
                bias[c] = b;
            }
        }
        self.classes = classes;
        self.feature_len = dim;
        self.weights = weights;
        self.bias = bias;
        Ok(())
    }

    fn predict(&self, features: &[f32]) -> Result<u8, FitError> {
        check_query(self.feature_len, features)?;
        let scores = self.decision_function(features);
        Ok(self.classes[argmax(&scores)])
    }

    fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }
}
