//! Multinomial logistic regression classifier for drawing vectors.

use serde::{Deserialize, Serialize};

use super::math::{argmax, softmax};
use super::{Classifier, FitError, check_query, check_training_set};

mod train;
pub use train::{TrainOptions, train_logreg};

/// Logistic regression weights plus the options they were trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRegModel {
    pub options: TrainOptions,
    pub classes: Vec<u8>,
    pub feature_len: usize,
    /// Row-major `[class][feature]`.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl LogRegModel {
    pub fn new(options: TrainOptions) -> Self {
        Self {
            options,
            classes: Vec::new(),
            feature_len: 0,
            weights: Vec::new(),
            bias: Vec::new(),
        }
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    /// Validate the model dimensions.
    pub fn validate(&self) -> Result<(), String> {
        let classes = self.classes.len();
        if classes == 0 {
            return Err("No classes defined".to_string());
        }
        if self.weights.len() != classes * self.feature_len {
            return Err("weights length mismatch".to_string());
        }
        if self.bias.len() != classes {
            return Err("bias length mismatch".to_string());
        }
        Ok(())
    }

    /// Compute class probabilities for a single feature vector.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        if features.len() != self.feature_len || self.classes.is_empty() {
            return Vec::new();
        }
        let logits: Vec<f32> = (0..self.classes.len())
            .map(|c| {
                let base = c * self.feature_len;
                let mut sum = self.bias[c];
                for i in 0..self.feature_len {
                    sum += self.weights[base + i] * features[i];
                }
                sum
            })
            .collect();
        softmax(&logits)
    }
}

impl Classifier for LogRegModel {
    fn fit(&mut self, x: &[Vec<f32>], y: &[u8]) -> Result<(), FitError> {
        let (dim, classes) = check_training_set(x, y)?;
        let (weights, bias) = train_logreg(x, y, &classes, dim, &self.options);
        self.classes = classes;
        self.feature_len = dim;
        self.weights = weights;
        self.bias = bias;
        Ok(())
    }

    fn predict(&self, features: &[f32]) -> Result<u8, FitError> {
        check_query(self.feature_len, features)?;
        let proba = self.predict_proba(features);
        Ok(self.classes[argmax(&proba)])
    }

    fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::testing::{probe, toy_dataset};

    #[test]
    fn fitted_model_validates_and_normalizes() {
        let (x, y) = toy_dataset();
        let mut model = LogRegModel::new(TrainOptions::default());
        model.fit(&x, &y).unwrap();
        model.validate().unwrap();
        let proba = model.predict_proba(&probe(1));
        let sum: f32 = proba.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(argmax(&proba), 0);
    }

    #[test]
    fn unfitted_model_does_not_validate() {
        let model = LogRegModel::new(TrainOptions::default());
        assert!(model.validate().is_err());
        assert!(model.predict_proba(&[0.0; 4]).is_empty());
    }
}
