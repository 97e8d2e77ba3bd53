//! Error types for quality filtering.

use shardsift_core::SiftError;
use thiserror::Error;

/// Result type alias for filter operations.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Errors that can occur while configuring or running filters.
#[derive(Error, Debug)]
pub enum FilterError {
    /// Error from the shared pipeline layer
    #[error(transparent)]
    Core(#[from] SiftError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration could not be decoded
    #[error("Invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid threshold or option
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Paragraph or line splitter failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<FilterError> for SiftError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::Core(inner) => inner,
            other => SiftError::stage("filter", other),
        }
    }
}
