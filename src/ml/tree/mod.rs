//! CART decision tree with Gini impurity.

use serde::{Deserialize, Serialize};

use super::{Classifier, FitError, check_query, check_training_set};

mod build;
pub(crate) use build::{FeatureSampler, grow};

/// Flattened tree node; children are indices into [`DecisionTree::nodes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        label: u8,
    },
    Split {
        feature: u32,
        /// Samples with `value <= threshold` go left.
        threshold: f32,
        left: u32,
        right: u32,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTree {
    pub classes: Vec<u8>,
    pub feature_len: usize,
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    /// Reject node tables that point outside the tree, backwards, or past the feature width.
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature as usize >= self.feature_len {
                    return Err(format!("node {idx} splits on feature {feature}"));
                }
                for child in [*left as usize, *right as usize] {
                    if child <= idx || child >= len {
                        return Err(format!("node {idx} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Longest root-to-leaf path, counted in edges.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + walk(nodes, *left as usize).max(walk(nodes, *right as usize))
                }
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    pub(crate) fn from_parts(classes: Vec<u8>, feature_len: usize, nodes: Vec<Node>) -> Self {
        Self {
            classes,
            feature_len,
            nodes,
        }
    }

    /// Walk the tree for an already validated query.
    pub(crate) fn leaf_label(&self, features: &[f32]) -> Option<u8> {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx)? {
                Node::Leaf { label } => return Some(*label),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(*feature as usize).copied().unwrap_or(0.0);
                    idx = if value <= *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
            }
        }
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &[Vec<f32>], y: &[u8]) -> Result<(), FitError> {
        let (dim, classes) = check_training_set(x, y)?;
        let indices: Vec<usize> = (0..x.len()).collect();
        let nodes = grow(x, y, &classes, indices, &mut FeatureSampler::All);
        *self = Self::from_parts(classes, dim, nodes);
        Ok(())
    }

    fn predict(&self, features: &[f32]) -> Result<u8, FitError> {
        check_query(self.feature_len, features)?;
        self.leaf_label(features).ok_or(FitError::NotFitted)
    }

    fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::testing::toy_dataset;

    #[test]
    fn fits_training_points_exactly() {
        let (x, y) = toy_dataset();
        let mut tree = DecisionTree::default();
        tree.fit(&x, &y).unwrap();
        for (row, &label) in x.iter().zip(&y) {
            assert_eq!(tree.predict(row).unwrap(), label);
        }
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn pure_input_is_a_single_leaf() {
        let mut tree = DecisionTree::default();
        tree.fit(&[vec![1.0, 2.0], vec![3.0, 4.0]], &[2, 2]).unwrap();
        assert_eq!(tree.nodes, vec![Node::Leaf { label: 2 }]);
        assert_eq!(tree.predict(&[9.0, 9.0]).unwrap(), 2);
    }

    #[test]
    fn identical_rows_with_different_labels_fall_back_to_majority() {
        let mut tree = DecisionTree::default();
        let x = vec![vec![1.0], vec![1.0], vec![1.0]];
        tree.fit(&x, &[3, 1, 3]).unwrap();
        assert_eq!(tree.predict(&[1.0]).unwrap(), 3);
    }
}
