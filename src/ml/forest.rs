//! Bagged ensemble of CART trees with per-split feature subsampling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, FeatureSampler, grow};
use super::{Classifier, FitError, check_query, check_training_set};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_trees: usize,
    pub seed: u64,
    pub classes: Vec<u8>,
    pub feature_len: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(n_trees: usize, seed: u64) -> Self {
        Self {
            n_trees: n_trees.max(1),
            seed,
            classes: Vec::new(),
            feature_len: 0,
            trees: Vec::new(),
        }
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() || !self.classes.windows(2).all(|w| w[0] < w[1]) {
            return Err("classes must be non-empty and sorted".to_string());
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            if tree.feature_len != self.feature_len {
                return Err(format!("tree {idx} is {} wide", tree.feature_len));
            }
            tree.validate().map_err(|err| format!("tree {idx}: {err}"))?;
        }
        Ok(())
    }

    /// Number of trees voting for each entry of `classes`.
    pub fn votes(&self, features: &[f32]) -> Vec<usize> {
        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            let Some(label) = tree.leaf_label(features) else {
                continue;
            };
            if let Ok(idx) = self.classes.binary_search(&label) {
                votes[idx] += 1;
            }
        }
        votes
    }
}

/// Features considered per split: `round(sqrt(dim))`, at least one.
fn features_per_split(dim: usize) -> usize {
    ((dim as f64).sqrt().round() as usize).max(1)
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &[Vec<f32>], y: &[u8]) -> Result<(), FitError> {
        let (dim, classes) = check_training_set(x, y)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let per_split = features_per_split(dim);
        let n = x.len();

        let mut trees = Vec::with_capacity(self.n_trees);
        for _ in 0..self.n_trees {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
            let mut sampler = FeatureSampler::Random {
                rng: &mut rng,
                per_split,
            };
            let nodes = grow(x, y, &classes, bootstrap, &mut sampler);
            trees.push(DecisionTree::from_parts(classes.clone(), dim, nodes));
        }

        self.classes = classes;
        self.feature_len = dim;
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, features: &[f32]) -> Result<u8, FitError> {
        check_query(self.feature_len, features)?;
        let votes = self.votes(features);
        Ok(self.classes[super::math::argmax(&votes)])
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
