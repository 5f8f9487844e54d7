//! Error types surfaced by the project engine.

use thiserror::Error;

use crate::ml::FitError;
use crate::ml::artifact::ArtifactError;
use crate::store::StoreError;

/// Result alias used by the engine-facing operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by engine operations.
///
/// Precondition failures (`MinimumSamples`, `NotFitted`, `MismatchedClassLabels`, ...) never
/// mutate project state. Persistence failures abort the call but leave committed state intact.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A project with this name already exists in the store or in a live session.
    #[error("Project '{0}' already exists, choose a different name")]
    DuplicateProjectName(String),
    /// No project with this name is stored.
    #[error("No project found with name '{0}'")]
    ProjectNotFound(String),
    /// Labels passed to a load do not match the stored project labels.
    #[error("Provided class names {provided:?} do not match saved project classes {stored:?}")]
    MismatchedClassLabels {
        /// Labels supplied by the caller.
        provided: [String; 3],
        /// Labels stored with the project.
        stored: [String; 3],
    },
    /// Labels are empty or not pairwise distinct.
    #[error("Invalid class labels: {0}")]
    InvalidClassLabels(String),
    /// At least one class has fewer than the minimum number of samples.
    #[error("Each class must have at least {required} samples before training (have {counts:?})")]
    MinimumSamples {
        /// Minimum samples per class.
        required: u64,
        /// Current per-class sample counts.
        counts: [u64; 3],
    },
    /// The active variant has no fitted instance.
    #[error("Train the {0} model first")]
    NotFitted(String),
    /// A class index outside `1..=3` was supplied.
    #[error("Class index {0} is out of range (expected 1, 2 or 3)")]
    InvalidClassIndex(i64),
    /// A fitted model produced an index that does not map to a class label.
    #[error("Model predicted unknown class index {0}")]
    InvalidLabel(u8),
    /// An image payload could not be decoded.
    #[error("Failed to decode image: {0}")]
    SampleDecode(String),
    /// Discarding a permanently saved project is not allowed.
    #[error("Cannot discard permanent project '{0}'")]
    DiscardForbidden(String),
    /// Fitting the active variant failed.
    #[error("Training failed: {0}")]
    Fit(#[from] FitError),
    /// A stored or imported model blob could not be used.
    #[error("Model artifact error: {0}")]
    Artifact(#[from] ArtifactError),
    /// The storage backend failed.
    #[error("Persistence failure: {0}")]
    PersistenceIo(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => EngineError::ProjectNotFound(name),
            StoreError::AlreadyExists(name) => EngineError::DuplicateProjectName(name),
            other => EngineError::PersistenceIo(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_engine_kinds() {
        let err = EngineError::from(StoreError::NotFound("cats".into()));
        assert!(matches!(err, EngineError::ProjectNotFound(name) if name == "cats"));
        let err = EngineError::from(StoreError::AlreadyExists("cats".into()));
        assert!(matches!(err, EngineError::DuplicateProjectName(_)));
        let err = EngineError::from(StoreError::Busy);
        assert!(matches!(err, EngineError::PersistenceIo(StoreError::Busy)));
    }
}
