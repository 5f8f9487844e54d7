//! Classical classifiers for flattened drawing vectors.
//!
//! Each variant implements the same [`Classifier`] capability so the training and
//! prediction pipelines never branch on the concrete algorithm. Variants are
//! selected by [`VariantTag`] and built through [`FittedModel::untrained`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TrainingSettings;

pub mod artifact;
pub mod forest;
pub mod knn;
pub mod logreg;
pub mod math;
pub mod naive_bayes;
pub mod registry;
pub mod svm;
pub mod tree;

pub use forest::RandomForest;
pub use knn::KNearest;
pub use logreg::LogRegModel;
pub use naive_bayes::GaussianNb;
pub use registry::ModelRegistry;
pub use svm::LinearSvm;
pub use tree::DecisionTree;

/// Errors raised while fitting or querying a classifier.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    /// No training rows were supplied.
    #[error("Empty training set")]
    EmptyDataset,
    /// Feature rows and labels differ in count.
    #[error("Mismatched training inputs/labels ({rows} rows, {labels} labels)")]
    LengthMismatch { rows: usize, labels: usize },
    /// A feature row differs in width from the first row.
    #[error("Row {row} has {found} features (expected {expected})")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },
    /// A feature value is NaN or infinite.
    #[error("Row {row} contains a non-finite feature value")]
    NonFinite { row: usize },
    /// Prediction was requested before a successful fit.
    #[error("Model has not been fitted")]
    NotFitted,
    /// Prediction input width differs from the training width.
    #[error("Expected {expected} features, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Uniform fit/predict capability shared by every variant.
pub trait Classifier {
    /// Fit on row-major features and their class labels, replacing any previous fit.
    fn fit(&mut self, x: &[Vec<f32>], y: &[u8]) -> Result<(), FitError>;
    /// Predict the class label of a single feature vector.
    fn predict(&self, features: &[f32]) -> Result<u8, FitError>;
    /// True once `fit` has succeeded.
    fn is_fitted(&self) -> bool;
}

/// Identifier of a classifier variant, in rotation order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum VariantTag {
    #[default]
    #[serde(rename = "SVM")]
    Svm,
    #[serde(rename = "KNN")]
    Knn,
    LogisticRegression,
    DecisionTree,
    RandomForest,
    NaiveBayes,
}

impl VariantTag {
    /// All variants in rotation order.
    pub const ALL: [VariantTag; 6] = [
        VariantTag::Svm,
        VariantTag::Knn,
        VariantTag::LogisticRegression,
        VariantTag::DecisionTree,
        VariantTag::RandomForest,
        VariantTag::NaiveBayes,
    ];

    /// The variant that follows `self` in the rotation cycle.
    pub fn next(self) -> VariantTag {
        match self {
            VariantTag::Svm => VariantTag::Knn,
            VariantTag::Knn => VariantTag::LogisticRegression,
            VariantTag::LogisticRegression => VariantTag::DecisionTree,
            VariantTag::DecisionTree => VariantTag::RandomForest,
            VariantTag::RandomForest => VariantTag::NaiveBayes,
            VariantTag::NaiveBayes => VariantTag::Svm,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantTag::Svm => "SVM",
            VariantTag::Knn => "KNN",
            VariantTag::LogisticRegression => "LogisticRegression",
            VariantTag::DecisionTree => "DecisionTree",
            VariantTag::RandomForest => "RandomForest",
            VariantTag::NaiveBayes => "NaiveBayes",
        }
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VariantTag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown classifier variant '{s}'"))
    }
}

/// A classifier instance of any variant, fitted or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedModel {
    Svm(LinearSvm),
    Knn(KNearest),
    LogisticRegression(LogRegModel),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    NaiveBayes(GaussianNb),
}

impl FittedModel {
    /// Build an untrained instance of `tag` configured from `settings`.
    pub fn untrained(tag: VariantTag, settings: &TrainingSettings) -> Self {
        match tag {
            VariantTag::Svm => FittedModel::Svm(LinearSvm::new(
                settings.svm_epochs,
                settings.svm_learning_rate,
                settings.svm_l2,
                settings.seed,
            )),
            VariantTag::Knn => FittedModel::Knn(KNearest::new(settings.knn_neighbors)),
            VariantTag::LogisticRegression => FittedModel::LogisticRegression(LogRegModel::new(
                logreg::TrainOptions::from(settings),
            )),
            VariantTag::DecisionTree => FittedModel::DecisionTree(DecisionTree::default()),
            VariantTag::RandomForest => {
                FittedModel::RandomForest(RandomForest::new(settings.forest_trees, settings.seed))
            }
            VariantTag::NaiveBayes => FittedModel::NaiveBayes(GaussianNb::default()),
        }
    }

    pub fn tag(&self) -> VariantTag {
        match self {
            FittedModel::Svm(_) => VariantTag::Svm,
            FittedModel::Knn(_) => VariantTag::Knn,
            FittedModel::LogisticRegression(_) => VariantTag::LogisticRegression,
            FittedModel::DecisionTree(_) => VariantTag::DecisionTree,
            FittedModel::RandomForest(_) => VariantTag::RandomForest,
            FittedModel::NaiveBayes(_) => VariantTag::NaiveBayes,
        }
    }

    /// Feature width the model was fitted on (0 when untrained).
    pub fn feature_len(&self) -> usize {
        match self {
            FittedModel::Svm(m) => m.feature_len(),
            FittedModel::Knn(m) => m.feature_len(),
            FittedModel::LogisticRegression(m) => m.feature_len(),
            FittedModel::DecisionTree(m) => m.feature_len(),
            FittedModel::RandomForest(m) => m.feature_len(),
            FittedModel::NaiveBayes(m) => m.feature_len(),
        }
    }

    /// Check internal buffer sizes of a deserialized model.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            FittedModel::Svm(m) => m.validate(),
            FittedModel::Knn(m) => m.validate(),
            FittedModel::LogisticRegression(m) => m.validate(),
            FittedModel::DecisionTree(m) => m.validate(),
            FittedModel::RandomForest(m) => m.validate(),
            FittedModel::NaiveBayes(m) => m.validate(),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            FittedModel::Svm(m) => m,
            FittedModel::Knn(m) => m,
            FittedModel::LogisticRegression(m) => m,
            FittedModel::DecisionTree(m) => m,
            FittedModel::RandomForest(m) => m,
            FittedModel::NaiveBayes(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            FittedModel::Svm(m) => m,
            FittedModel::Knn(m) => m,
            FittedModel::LogisticRegression(m) => m,
            FittedModel::DecisionTree(m) => m,
            FittedModel::RandomForest(m) => m,
            FittedModel::NaiveBayes(m) => m,
        }
    }
}

impl Classifier for FittedModel {
    fn fit(&mut self, x: &[Vec<f32>], y: &[u8]) -> Result<(), FitError> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, features: &[f32]) -> Result<u8, FitError> {
        self.inner().predict(features)
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }
}

/// Validate a training set and return its feature width and sorted class labels.
pub(crate) fn check_training_set(x: &[Vec<f32>], y: &[u8]) -> Result<(usize, Vec<u8>), FitError> {
    if x.is_empty() || y.is_empty() {
        return Err(FitError::EmptyDataset);
    }
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            rows: x.len(),
            labels: y.len(),
        });
    }
    let dim = x[0].len();
    for (row, values) in x.iter().enumerate() {
        if values.len() != dim {
            return Err(FitError::RaggedRows {
                row,
                expected: dim,
                found: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite { row });
        }
    }
    Ok((dim, math::distinct_labels(y)))
}

/// Reject prediction input that does not match the fitted width.
pub(crate) fn check_query(expected: usize, features: &[f32]) -> Result<(), FitError> {
    if expected == 0 {
        return Err(FitError::NotFitted);
    }
    if features.len() != expected {
        return Err(FitError::DimensionMismatch {
            expected,
            found: features.len(),
        });
    }
    Ok(())
}
