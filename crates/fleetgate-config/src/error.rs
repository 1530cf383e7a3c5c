//! Configuration error types

use std::path::PathBuf;

use fleetgate_rbac::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML document at {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid ownership matrix: {0}")]
    Matrix(#[from] ConfigurationError),

    #[error("XDG directory error: {0}")]
    XdgError(String),
}
