//! Error types shared across the Tollgate crates.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from configuration loading and wire decoding.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration field is missing or invalid. Fatal at startup.
    #[error("config field '{field}': {reason}")]
    Config {
        /// Dotted path of the offending field (e.g. `database.host`).
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a missing required configuration field.
    pub(crate) fn required(field: &'static str) -> Self {
        Self::Config {
            field,
            reason: "is required".to_string(),
        }
    }
}
