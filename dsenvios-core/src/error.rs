//! Structured error types for dsenvios-core.
//!
//! Uses `thiserror` so the server crate can match on variants;
//! the binary wraps these in `anyhow` for context.

use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationError;

/// Main error type for dsenvios-core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// User-supplied value failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Configuration file could not be read
    #[error("failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for the expected shape
    #[error("failed to parse config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Configuration values are present but unusable
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Result type alias for dsenvios-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
