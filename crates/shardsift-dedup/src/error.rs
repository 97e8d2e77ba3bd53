//! Error types for sentence deduplication.

use shardsift_core::SiftError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dedup operations.
pub type Result<T> = std::result::Result<T, DedupError>;

/// Errors that can occur across the three dedup stages.
#[derive(Error, Debug)]
pub enum DedupError {
    /// Error from the shared pipeline layer
    #[error(transparent)]
    Core(#[from] SiftError),

    /// I/O error on a signature or duplicate file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shard holds more documents than a `u32` doc id can address
    #[error("Shard {shard} has more than {documents} documents")]
    ShardTooLarge { shard: usize, documents: u64 },

    /// Stage 3 found no duplicate file for its shard
    #[error("Duplicate file not found: {path}")]
    MissingDuplicateFile { path: PathBuf },

    /// A signature file name does not carry a shard index, or two files share one
    #[error("Invalid shard file: {path}")]
    InvalidShardFile { path: PathBuf },

    /// A signature file is not sorted by the merge order
    #[error("Signature file is not sorted: {path}")]
    UnsortedInput { path: PathBuf },

    /// Invalid option
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<DedupError> for SiftError {
    fn from(err: DedupError) -> Self {
        match err {
            DedupError::Core(inner) => inner,
            DedupError::Io(inner) => SiftError::Io(inner),
            other => SiftError::stage("dedup", other),
        }
    }
}
