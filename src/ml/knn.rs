//! k-nearest-neighbours classifier with Euclidean distance and uniform votes.

use serde::{Deserialize, Serialize};

use super::math::squared_distance;
use super::{Classifier, FitError, check_query, check_training_set};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNearest {
    pub neighbors: usize,
    pub feature_len: usize,
    pub samples: Vec<Vec<f32>>,
    pub labels: Vec<u8>,
}

impl KNearest {
    pub fn new(neighbors: usize) -> Self {
        Self {
            neighbors: neighbors.max(1),
            feature_len: 0,
            samples: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.samples.len() != self.labels.len() {
            return Err(format!(
                "{} samples but {} labels",
                self.samples.len(),
                self.labels.len()
            ));
        }
        if let Some(row) = self.samples.iter().position(|s| s.len() != self.feature_len) {
            return Err(format!("sample {row} is not {} wide", self.feature_len));
        }
        Ok(())
    }
}

impl Classifier for KNearest {
    fn fit(&mut self, x: &[Vec<f32>], y: &[u8]) -> Result<(), FitError> {
        let (dim, _) = check_training_set(x, y)?;
        self.feature_len = dim;
        self.samples = x.to_vec();
        self.labels = y.to_vec();
        Ok(())
    }

    fn predict(&self, features: &[f32]) -> Result<u8, FitError> {
        check_query(self.feature_len, features)?;
        let mut ranked: Vec<(f32, usize)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(idx, sample)| (squared_distance(sample, features), idx))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let k = self.neighbors.min(ranked.len());

        // (label, votes, rank of the closest voter)
        let mut tally: Vec<(u8, usize, usize)> = Vec::new();
        for (rank, &(_, idx)) in ranked.iter().take(k).enumerate() {
            let label = self.labels[idx];
            match tally.iter_mut().find(|(l, _, _)| *l == label) {
                Some(entry) => entry.1 += 1,
                None => tally.push((label, 1, rank)),
            }
        }
        tally
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)))
            .map(|(label, _, _)| label)
            .ok_or(FitError::NotFitted)
    }

    fn is_fitted(&self) -> bool {
        !self.samples.is_empty()
    }
}
