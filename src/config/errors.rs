use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config directory could be resolved")]
    NoConfigDir,
    /// `action` names the filesystem step that failed ("create", "read" or "write").
    #[error("Could not {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Bad settings in {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Settings for {path} could not be rendered as TOML: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}
