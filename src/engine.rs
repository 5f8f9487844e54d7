//! Engine facade exposing the project operations over a configured store.

use std::path::Path;
use std::sync::Arc;

use crate::app_dirs;
use crate::config::{Settings, StorageBackend, TrainingSettings};
use crate::error::{EngineError, EngineResult};
use crate::features::{self, FEATURE_LEN};
use crate::ml::{VariantTag, artifact};
use crate::prediction;
use crate::project::{ClassIndex, ClassLabels, ProjectMeta, ProjectState, ProjectSummary};
use crate::samples;
use crate::session::{self, SessionHandle, SessionManager};
use crate::store::{DocumentStore, LocalStore, ProjectStore, StoreError};
use crate::training::{self, TrainOutcome};

/// Default database file name for the document backend.
pub const DOCUMENT_DB_FILE_NAME: &str = "projects.db";

/// Entry point for every project operation.
///
/// Safe to share across threads: operations on the same project serialize on that
/// project's session lock, different projects run independently.
pub struct Engine {
    store: Arc<dyn ProjectStore>,
    sessions: SessionManager,
    training: TrainingSettings,
}

impl Engine {
    pub fn new(store: Arc<dyn ProjectStore>, settings: &Settings) -> Self {
        Self {
            store,
            sessions: SessionManager::new(settings.sessions.max_live_sessions),
            training: settings.training.clone(),
        }
    }

    /// Build the backend named in `settings`, falling back to the app data directory.
    pub fn from_settings(settings: &Settings) -> EngineResult<Self> {
        let storage = &settings.storage;
        let store: Arc<dyn ProjectStore> = match storage.backend {
            StorageBackend::Local => {
                let root = match &storage.root {
                    Some(root) => root.clone(),
                    None => app_dirs::projects_dir().map_err(StoreError::from)?,
                };
                Arc::new(LocalStore::open(root)?)
            }
            StorageBackend::Document => {
                let path = match &storage.document_path {
                    Some(path) => path.clone(),
                    None => app_dirs::app_root_dir()
                        .map_err(StoreError::from)?
                        .join(DOCUMENT_DB_FILE_NAME),
                };
                Arc::new(DocumentStore::open(path, storage.io_timeout())?)
            }
        };
        tracing::info!(backend = store.backend_name(), "Storage ready");
        Ok(Self::new(store, settings))
    }

    pub fn store(&self) -> &dyn ProjectStore {
        self.store.as_ref()
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.live_count()
    }

    fn session(&self, name: &str) -> EngineResult<SessionHandle> {
        self.sessions.get_or_load(name, || self.load_state(name))
    }

    fn load_state(&self, name: &str) -> EngineResult<ProjectState> {
        let meta = self.store.load_meta(name)?;
        let artifacts = self.store.load_artifacts(name)?;
        Ok(ProjectState::hydrate(meta, artifacts))
    }

    /// True when a project with this name is live or stored.
    pub fn project_exists(&self, name: &str) -> EngineResult<bool> {
        Ok(self.sessions.contains(name) || self.store.project_exists(name)?)
    }

    /// Create a project with three class labels and no samples.
    pub fn init_project(
        &self,
        name: &str,
        labels: [String; 3],
        persistent: bool,
    ) -> EngineResult<ProjectSummary> {
        let labels = ClassLabels::new(labels)?;
        if self.project_exists(name)? {
            return Err(EngineError::DuplicateProjectName(name.to_string()));
        }
        let meta = ProjectMeta::new(name, labels, persistent);
        self.store.create_project(&meta)?;
        let handle = self
            .sessions
            .insert_new(name, ProjectState::new(meta))
            .ok_or_else(|| EngineError::DuplicateProjectName(name.to_string()))?;
        let summary = session::lock(&handle).summary();
        tracing::info!(project = name, persistent, "Initialized project");
        Ok(summary)
    }

    /// Store a labelled drawing and return its 1-based sequence number within the class.
    pub fn save_sample(&self, name: &str, class: i64, image: &[u8]) -> EngineResult<u64> {
        let class = ClassIndex::try_from(class)?;
        let blob = samples::encode_sample(image)?;
        let handle = self.session(name)?;
        let mut state = session::lock(&handle);
        samples::save(self.store.as_ref(), &mut state, class, &blob)
    }

    /// Fit the active variant on all stored samples.
    pub fn train(&self, name: &str) -> EngineResult<TrainOutcome> {
        let handle = self.session(name)?;
        let mut state = session::lock(&handle);
        training::train(self.store.as_ref(), &mut state, &self.training)
    }

    /// Classify a drawing with the active variant and return the class label.
    pub fn predict(&self, name: &str, image: &[u8]) -> EngineResult<String> {
        let features = features::normalize(image)?;
        let handle = self.session(name)?;
        let state = session::lock(&handle);
        prediction::predict(&state, &features)
    }

    /// Switch to the next classifier variant; it starts untrained.
    pub fn rotate_variant(&self, name: &str) -> EngineResult<VariantTag> {
        let handle = self.session(name)?;
        let mut state = session::lock(&handle);
        let staged_artifacts = state.artifacts_after_rotate();
        let mut staged_meta = state.meta.clone();
        staged_meta.active_variant = state.active_variant().next();
        if staged_artifacts.len() != state.artifacts.len() {
            self.store.save_artifacts(name, &staged_artifacts)?;
        }
        self.store.save_meta(&staged_meta)?;
        let next = state.rotate();
        tracing::info!(project = name, variant = %next, "Rotated classifier variant");
        Ok(next)
    }

    /// Persist metadata and artifacts and mark the project permanent.
    pub fn save_project_permanently(&self, name: &str) -> EngineResult<ProjectSummary> {
        let handle = self.session(name)?;
        let mut state = session::lock(&handle);
        self.store.save_artifacts(name, &state.artifacts)?;
        let mut staged = state.meta.clone();
        staged.persistent = true;
        self.store.save_meta(&staged)?;
        state.meta.persistent = true;
        tracing::info!(project = name, "Saved project permanently");
        Ok(state.summary())
    }

    /// Delete a temporary project and its samples, returning how many samples were removed.
    pub fn discard_project(&self, name: &str) -> EngineResult<u64> {
        let handle = self.session(name)?;
        let state = session::lock(&handle);
        if state.meta.persistent {
            return Err(EngineError::DiscardForbidden(name.to_string()));
        }
        let removed = self.store.delete_project(name)?;
        drop(state);
        self.sessions.remove(name);
        tracing::info!(project = name, removed, "Discarded project");
        Ok(removed)
    }

    /// Open a stored project, optionally checking that its labels match.
    pub fn load_project(
        &self,
        name: &str,
        labels: Option<[String; 3]>,
    ) -> EngineResult<ProjectSummary> {
        let handle = match self.sessions.get(name) {
            Some(handle) => handle,
            None => {
                let state = self.load_state(name)?;
                check_labels(&state, labels.as_ref())?;
                self.sessions.insert_if_absent(name, state)
            }
        };
        let state = session::lock(&handle);
        check_labels(&state, labels.as_ref())?;
        tracing::info!(project = name, variant = %state.active_variant(), "Loaded project");
        Ok(state.summary())
    }

    pub fn summary(&self, name: &str) -> EngineResult<ProjectSummary> {
        let handle = self.session(name)?;
        let state = session::lock(&handle);
        Ok(state.summary())
    }

    /// Write the active variant's stored artifact to `path`.
    pub fn export_active_model(&self, name: &str, path: &Path) -> EngineResult<VariantTag> {
        let handle = self.session(name)?;
        let state = session::lock(&handle);
        let active = state.active_variant();
        if state.registry.fitted().is_none() {
            return Err(EngineError::NotFitted(active.to_string()));
        }
        let blob = state
            .artifacts
            .get(&active)
            .ok_or_else(|| EngineError::NotFitted(active.to_string()))?;
        crate::fs_util::atomic_write(path, blob).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(project = name, variant = %active, path = %path.display(), "Exported model");
        Ok(active)
    }

    /// Install a model blob from `path`, making its variant active and live.
    pub fn import_model(&self, name: &str, path: &Path) -> EngineResult<VariantTag> {
        let blob = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = artifact::decode(&blob, FEATURE_LEN)?;
        let variant = model.tag();

        let handle = self.session(name)?;
        let mut state = session::lock(&handle);
        let mut staged_artifacts = state.artifacts.clone();
        staged_artifacts.insert(variant, blob);
        let mut staged_meta = state.meta.clone();
        staged_meta.active_variant = variant;
        self.store.save_artifacts(name, &staged_artifacts)?;
        self.store.save_meta(&staged_meta)?;

        state.artifacts = staged_artifacts;
        state.meta.active_variant = variant;
        state.registry.install(model);
        tracing::info!(project = name, variant = %variant, path = %path.display(), "Imported model");
        Ok(variant)
    }
}

fn check_labels(state: &ProjectState, labels: Option<&[String; 3]>) -> EngineResult<()> {
    match labels {
        Some(provided) if !state.meta.class_labels.matches(provided) => {
            Err(EngineError::MismatchedClassLabels {
                provided: provided.clone(),
                stored: state.meta.class_labels.as_array().clone(),
            })
        }
        _ => Ok(()),
    }
}
