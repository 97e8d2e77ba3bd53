//! Error types for shardsift.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for shardsift operations.
pub type Result<T> = std::result::Result<T, SiftError>;

/// Errors that can occur while reading, writing or streaming documents.
#[derive(Error, Debug)]
pub enum SiftError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A JSONL line could not be decoded
    #[error("Parse error in {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A required field is absent or has the wrong type
    #[error("Field '{field}' not found or not a string in {path} at line {line}")]
    MissingField {
        field: String,
        path: PathBuf,
        line: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// Pipeline wiring or execution error
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Error raised inside a stage implemented by a downstream crate
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SiftError {
    /// Wrap a stage-specific error.
    pub fn stage(
        stage: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Stage {
            stage: stage.into(),
            source: source.into(),
        }
    }
}
