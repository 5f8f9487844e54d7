use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::{
    MAX_FOREST_TREES, clamp_io_timeout_ms, clamp_non_negative, clamp_positive_rate,
    default_forest_trees, default_io_timeout_ms, default_knn_neighbors, default_log_level,
    default_log_to_file, default_logreg_epochs, default_logreg_l2, default_logreg_learning_rate,
    default_max_live_sessions, default_max_log_files, default_seed, default_svm_epochs,
    default_svm_l2, default_svm_learning_rate,
};

/// Top-level engine settings persisted as `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Where and how projects are stored.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Live session registry limits.
    #[serde(default)]
    pub sessions: SessionSettings,
    /// Classifier hyperparameters.
    #[serde(default)]
    pub training: TrainingSettings,
    /// Log filtering and file output.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Clamp out-of-range values to something the engine can run with.
    pub fn normalized(mut self) -> Self {
        self.storage.io_timeout_ms = clamp_io_timeout_ms(self.storage.io_timeout_ms);
        self.training = self.training.normalized();
        self.logging.max_files = self.logging.max_files.max(1);
        self
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One directory per project with numbered image files and a snapshot file.
    #[default]
    Local,
    /// Document-store layout (project documents plus image sub-collections) in SQLite.
    Document,
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the local backend (defaults to `<app root>/projects`).
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Database file for the document backend (defaults to `<app root>/projects.db`).
    #[serde(default)]
    pub document_path: Option<PathBuf>,
    /// Upper bound for a single blocking storage call, in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: None,
            document_path: None,
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

impl StorageSettings {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

/// Session registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Maximum number of live sessions kept in memory (0 = unbounded).
    #[serde(default = "default_max_live_sessions")]
    pub max_live_sessions: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_live_sessions: default_max_live_sessions(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `info` or `scribble=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write a per-launch log file.
    #[serde(default = "default_log_to_file")]
    pub to_file: bool,
    /// Log directory (defaults to `<app root>/logs`).
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Log files kept after pruning.
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: default_log_to_file(),
            directory: None,
            max_files: default_max_log_files(),
        }
    }
}

/// Hyperparameters handed to the classifier factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Seed for every randomized step (shuffling, bootstrapping, initialization).
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_knn_neighbors")]
    pub knn_neighbors: usize,
    #[serde(default = "default_forest_trees")]
    pub forest_trees: usize,
    #[serde(default = "default_svm_epochs")]
    pub svm_epochs: usize,
    #[serde(default = "default_svm_learning_rate")]
    pub svm_learning_rate: f32,
    #[serde(default = "default_svm_l2")]
    pub svm_l2: f32,
    #[serde(default = "default_logreg_epochs")]
    pub logreg_epochs: usize,
    #[serde(default = "default_logreg_learning_rate")]
    pub logreg_learning_rate: f32,
    #[serde(default = "default_logreg_l2")]
    pub logreg_l2: f32,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            knn_neighbors: default_knn_neighbors(),
            forest_trees: default_forest_trees(),
            svm_epochs: default_svm_epochs(),
            svm_learning_rate: default_svm_learning_rate(),
            svm_l2: default_svm_l2(),
            logreg_epochs: default_logreg_epochs(),
            logreg_learning_rate: default_logreg_learning_rate(),
            logreg_l2: default_logreg_l2(),
        }
    }
}

impl TrainingSettings {
    pub fn normalized(mut self) -> Self {
        self.knn_neighbors = self.knn_neighbors.max(1);
        self.forest_trees = self.forest_trees.clamp(1, MAX_FOREST_TREES);
        self.svm_epochs = self.svm_epochs.max(1);
        self.logreg_epochs = self.logreg_epochs.max(1);
        self.svm_learning_rate =
            clamp_positive_rate(self.svm_learning_rate, default_svm_learning_rate());
        self.logreg_learning_rate =
            clamp_positive_rate(self.logreg_learning_rate, default_logreg_learning_rate());
        self.svm_l2 = clamp_non_negative(self.svm_l2);
        self.logreg_l2 = clamp_non_negative(self.logreg_l2);
        self
    }
}
