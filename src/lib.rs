//! Library exports for the engine, its CLI, benchmarks and tests.
/// Application directory helpers.
pub mod app_dirs;
/// Engine configuration persisted as TOML.
pub mod config;
/// Engine facade exposing the project operations.
pub mod engine;
/// Engine error types.
pub mod error;
/// Drawing normalization into fixed-length feature vectors.
pub mod features;
/// Filesystem helpers.
pub mod fs_util;
/// Logging setup for console and file output.
pub mod logging;
/// Classifier variants, rotation and model artifacts.
pub mod ml;
/// Prediction against the live model.
pub mod prediction;
/// Per-project state and metadata types.
pub mod project;
/// Sample ingestion and loading.
pub mod samples;
/// Live project session registry.
pub mod session;
/// Storage backends.
pub mod store;
/// Training pipeline.
pub mod training;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use ml::VariantTag;
pub use project::{ClassIndex, ProjectSummary};
