//! Document and shard addressing types.

use crate::error::{Result, SiftError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key under which filters record why a document was rejected.
pub const FILTER_REASON_KEY: &str = "filter_reason";

/// Metadata key holding the file a document was read from.
pub const FILE_PATH_KEY: &str = "file_path";

/// The unit of data flowing through every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque identifier, stable across stages.
    pub id: String,
    /// Full text content.
    pub text: String,
    /// Provenance and annotations (source URL, crawl date, filter reason, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Create a document with empty metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Map::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Record the rejection reason of a filter.
    pub fn set_filter_reason(&mut self, reason: &str) {
        self.metadata
            .insert(FILTER_REASON_KEY.to_string(), Value::from(reason));
    }

    /// The rejection reason recorded by a filter, if any.
    #[must_use]
    pub fn filter_reason(&self) -> Option<&str> {
        self.metadata.get(FILTER_REASON_KEY).and_then(Value::as_str)
    }
}

/// Position of a worker within a sharded job: `index` out of `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shard {
    /// Zero-based shard index.
    pub index: usize,
    /// Total number of shards.
    pub count: usize,
}

impl Shard {
    /// Create a shard address, validating `index < count`.
    pub fn new(index: usize, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(SiftError::InvalidConfig(
                "shard count must be > 0".to_string(),
            ));
        }
        if index >= count {
            return Err(SiftError::InvalidConfig(format!(
                "shard index {index} out of range for {count} shards"
            )));
        }
        Ok(Self { index, count })
    }

    /// The only shard of a single-task job.
    #[must_use]
    pub const fn single() -> Self {
        Self { index: 0, count: 1 }
    }

    /// Whether the item at `position` of a round-robin partition belongs to this shard.
    #[must_use]
    pub fn owns(&self, position: usize) -> bool {
        position % self.count == self.index
    }

    /// Deterministic per-shard file name, e.g. `00003.sig`.
    #[must_use]
    pub fn file_name(&self, extension: &str) -> String {
        format!("{:05}.{extension}", self.index)
    }

    /// Every shard of a job with `count` shards.
    pub fn all(count: usize) -> impl Iterator<Item = Shard> {
        (0..count).map(move |index| Shard { index, count })
    }
}

impl Default for Shard {
    fn default() -> Self {
        Self::single()
    }
}

impl std::fmt::Display for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}
