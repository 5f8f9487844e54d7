//! Gaussian naive Bayes.

use serde::{Deserialize, Serialize};

use super::math::argmax;
use super::{Classifier, FitError, check_query, check_training_set};

/// Fraction of the largest feature variance added to every variance.
const VAR_SMOOTHING: f64 = 1e-9;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaussianNb {
    pub classes: Vec<u8>,
    pub feature_len: usize,
    pub log_priors: Vec<f64>,
    /// Row-major `[class][feature]`.
    pub means: Vec<f64>,
    /// Row-major `[class][feature]`, already smoothed.
    pub variances: Vec<f64>,
}

impl GaussianNb {
    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn validate(&self) -> Result<(), String> {
        let classes = self.classes.len();
        if classes == 0 {
            return Err("No classes defined".to_string());
        }
        if self.log_priors.len() != classes {
            return Err(format!("{} priors for {classes} classes", self.log_priors.len()));
        }
        let cells = classes * self.feature_len;
        if self.means.len() != cells || self.variances.len() != cells {
            return Err("mean/variance table size mismatch".to_string());
        }
        if self.variances.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err("variances must be positive".to_string());
        }
        Ok(())
    }

    /// Unnormalised joint log likelihood per class.
    pub fn joint_log_likelihood(&self, features: &[f32]) -> Vec<f64> {
        let dim = self.feature_len;
        (0..self.classes.len())
            .map(|c| {
                let base = c * dim;
                let mut total = self.log_priors[c];
                for (i, &value) in features.iter().enumerate().take(dim) {
                    let var = self.variances[base + i];
                    let diff = value as f64 - self.means[base + i];
                    total -= 0.5 * ((2.0 * std::f64::consts::PI * var).ln() + diff * diff / var);
                }
                total
            })
            .collect()
    }
}

impl Classifier for GaussianNb {
    fn fit(&mut self, x: &[Vec<f32>], y: &[u8]) -> Result<(), FitError> {
        let (dim, classes) = check_training_set(x, y)?;
        let n_classes = classes.len();
        let mut counts = vec![0usize; n_classes];
        let mut means = vec![0.0f64; n_classes * dim];
        let mut variances = vec![0.0f64; n_classes * dim];

        for (row, label) in x.iter().zip(y) {
            let c = classes.binary_search(label).unwrap_or(0);
            counts[c] += 1;
            for (m, &v) in means[c * dim..(c + 1) * dim].iter_mut().zip(row) {
                *m += v as f64;
            }
        }
        for c in 0..n_classes {
            let n = counts[c].max(1) as f64;
            means[c * dim..(c + 1) * dim].iter_mut().for_each(|m| *m /= n);
        }
        for (row, label) in x.iter().zip(y) {
            let c = classes.binary_search(label).unwrap_or(0);
            let base = c * dim;
            for (i, &v) in row.iter().enumerate() {
                let diff = v as f64 - means[base + i];
                variances[base + i] += diff * diff;
            }
        }
        for c in 0..n_classes {
            let n = counts[c].max(1) as f64;
            variances[c * dim..(c + 1) * dim].iter_mut().for_each(|v| *v /= n);
        }

        // Blank canvas regions have zero variance everywhere; keep the floor positive.
        let max_var = variances.iter().copied().fold(0.0f64, f64::max);
        let epsilon = (VAR_SMOOTHING * max_var).max(VAR_SMOOTHING);
        variances.iter_mut().for_each(|v| *v += epsilon);

        let total = x.len() as f64;
        self.log_priors = counts.iter().map(|&n| (n as f64 / total).ln()).collect();
        self.classes = classes;
        self.feature_len = dim;
        self.means = means;
        self.variances = variances;
        Ok(())
    }

    fn predict(&self, features: &[f32]) -> Result<u8, FitError> {
        check_query(self.feature_len, features)?;
        let scores = self.joint_log_likelihood(features);
        Ok(self.classes[argmax(&scores)])
    }

    fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }
}
