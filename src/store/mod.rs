//! Storage contract for projects, samples and model artifacts.
//!
//! Engine logic is written once against [`ProjectStore`]; [`LocalStore`] keeps
//! projects as plain files and [`DocumentStore`] keeps them as JSON documents in
//! SQLite. Both must behave identically from the caller's point of view.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::app_dirs::AppDirError;
use crate::ml::VariantTag;
use crate::project::{ClassIndex, ProjectMeta};

/// Filesystem-backed store.
pub mod local;
/// SQLite-backed document store.
pub mod document;

pub use document::DocumentStore;
pub use local::LocalStore;

/// Serialized fitted models keyed by variant.
pub type ArtifactMap = BTreeMap<VariantTag, Vec<u8>>;

/// Lazy stream of a project's samples, ordered by class then sequence.
pub type SampleStream<'a> = Box<dyn Iterator<Item = Result<StoredSample, StoreError>> + 'a>;

/// One persisted sample as stored by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSample {
    pub class_index: ClassIndex,
    /// 1-based rank of insertion within the class.
    pub sequence: u64,
    /// Encoded image payload.
    pub blob: Vec<u8>,
}

/// Errors returned by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("Could not access {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// SQLite query failed.
    #[error("Database query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    /// A stored document could not be (de)serialized.
    #[error("Invalid project document: {0}")]
    Json(#[from] serde_json::Error),
    /// Database is locked or busy past the configured timeout.
    #[error("Database is busy, please retry")]
    Busy,
    /// No project with this name exists.
    #[error("Project not found: {0}")]
    NotFound(String),
    /// A project with this name already exists.
    #[error("Project already exists: {0}")]
    AlreadyExists(String),
    /// Stored data exists but cannot be interpreted.
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
    /// The project name cannot be used as a storage key.
    #[error("Invalid project name: {0:?}")]
    InvalidName(String),
    /// Default storage location could not be resolved.
    #[error(transparent)]
    Location(#[from] AppDirError),
}

/// Persistence operations shared by every backend.
///
/// Per-class counters are owned by [`save_sample`](Self::save_sample): `save_meta`
/// never lowers them and `load_meta` reports the highest sequence issued.
pub trait ProjectStore: Send + Sync {
    /// Human readable backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Create a new project record. Fails with `AlreadyExists` when the name is taken.
    fn create_project(&self, meta: &ProjectMeta) -> Result<(), StoreError>;

    fn project_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Persist an encoded sample and return its sequence number.
    fn save_sample(&self, name: &str, class: ClassIndex, blob: &[u8]) -> Result<u64, StoreError>;

    /// Stream every stored sample. Calling again restarts from the beginning.
    fn stream_samples(&self, name: &str) -> Result<SampleStream<'_>, StoreError>;

    /// Replace the stored artifact map.
    fn save_artifacts(&self, name: &str, artifacts: &ArtifactMap) -> Result<(), StoreError>;

    fn load_artifacts(&self, name: &str) -> Result<ArtifactMap, StoreError>;

    /// Update labels, persistence flag and active variant of an existing project.
    fn save_meta(&self, meta: &ProjectMeta) -> Result<(), StoreError>;

    fn load_meta(&self, name: &str) -> Result<ProjectMeta, StoreError>;

    /// Remove the project and all of its samples, returning how many samples were removed.
    fn delete_project(&self, name: &str) -> Result<u64, StoreError>;
}

/// Reject names that are empty or would escape a single path segment.
pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.trim() != name || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_accepted() {
        validate_name("animals").unwrap();
        validate_name("my drawings 2").unwrap();
    }

    #[test]
    fn path_like_names_are_rejected() {
        for bad in ["", ".", "..", "../up", "a/b", "a\\b", ".hidden", " padded"] {
            assert!(
                matches!(validate_name(bad), Err(StoreError::InvalidName(_))),
                "{bad:?}"
            );
        }
    }
}
