//! Pipeline stage abstraction.
//!
//! Every component (reader, filter, writer, dedup stage) implements
//! [`PipelineStage`]: it receives the lazy output of the previous stage (or
//! nothing, for readers) together with the worker's [`Shard`] and returns its
//! own lazy output. Stages are chained explicitly by [`Pipeline`].
//!
//! ```rust,no_run
//! use shardsift_core::io::{JsonlReader, JsonlWriter};
//! use shardsift_core::{Pipeline, Shard};
//!
//! let pipeline = Pipeline::new()
//!     .with_stage(JsonlReader::new("data/input"))
//!     .with_stage(JsonlWriter::new("data/output"));
//!
//! pipeline.run(Shard::new(0, 4).unwrap()).unwrap();
//! ```

use crate::document::{Document, Shard};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Lazy, single-pass sequence of documents.
pub type DocumentStream<'a> = Box<dyn Iterator<Item = Result<Document>> + Send + 'a>;

/// A unit of a document pipeline.
pub trait PipelineStage: Send + Sync {
    /// Short name used in logs and statistics.
    fn name(&self) -> &str;

    /// Consume `input` (if any) for `shard` and produce this stage's output.
    ///
    /// Readers ignore or prepend `input`; terminal stages return an empty stream.
    fn process<'a>(
        &'a self,
        input: Option<DocumentStream<'a>>,
        shard: Shard,
    ) -> Result<DocumentStream<'a>>;

    /// Statistics accumulated over every stream this stage has completed.
    fn stats(&self) -> Option<StageStats> {
        None
    }
}

/// An empty document stream.
#[must_use]
pub fn empty_stream<'a>() -> DocumentStream<'a> {
    Box::new(std::iter::empty())
}

/// Wrap in-memory documents as a stream.
pub fn stream_from<'a, I>(docs: I) -> DocumentStream<'a>
where
    I: IntoIterator<Item = Document>,
    I::IntoIter: Send + 'a,
{
    Box::new(docs.into_iter().map(Ok))
}

/// Per-stage counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    /// Stage name.
    pub stage: String,
    /// Documents received.
    pub total: usize,
    /// Documents passed downstream.
    pub forwarded: usize,
    /// Documents removed.
    pub dropped: usize,
    /// Removed documents grouped by reason tag.
    pub dropped_by_reason: BTreeMap<String, usize>,
    /// Wall-clock processing time in seconds.
    pub elapsed_secs: f64,
}

impl StageStats {
    /// Empty statistics for `stage`.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Default::default()
        }
    }

    /// Count a document that was passed downstream.
    pub fn record_forwarded(&mut self) {
        self.total += 1;
        self.forwarded += 1;
    }

    /// Count a removed document.
    pub fn record_dropped(&mut self, reason: Option<&str>) {
        self.total += 1;
        self.dropped += 1;
        if let Some(reason) = reason {
            *self.dropped_by_reason.entry(reason.to_string()).or_default() += 1;
        }
    }

    /// Fold another stream's counters into these.
    pub fn merge(&mut self, other: &StageStats) {
        self.total += other.total;
        self.forwarded += other.forwarded;
        self.dropped += other.dropped;
        for (reason, count) in &other.dropped_by_reason {
            *self.dropped_by_reason.entry(reason.clone()).or_default() += count;
        }
        self.elapsed_secs += other.elapsed_secs;
    }

    /// Fraction of received documents that were dropped.
    #[must_use]
    pub fn drop_ratio(&self) -> f64 {
        crate::text::fraction(self.dropped, self.total).unwrap_or(0.0)
    }

    /// Emit the counters for one shard.
    pub fn log(&self, shard: Shard) {
        info!(
            stage = %self.stage,
            shard = %shard,
            total = self.total,
            forwarded = self.forwarded,
            dropped = self.dropped,
            elapsed_secs = self.elapsed_secs,
            "Stage finished"
        );
    }
}

/// Thread-safe accumulator that stages keep across shards.
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: Mutex<StageStats>,
}

impl StatsCollector {
    /// Create a collector for `stage`.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(StageStats::new(stage)),
        }
    }

    /// Merge one completed stream.
    pub fn merge(&self, stats: &StageStats) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(stats);
    }

    /// Current totals.
    #[must_use]
    pub fn snapshot(&self) -> StageStats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// An ordered chain of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl PipelineStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append an already boxed stage.
    #[must_use]
    pub fn with_boxed_stage(mut self, stage: Box<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Build the chained stream for `shard` without draining it.
    pub fn stream(&self, shard: Shard) -> Result<DocumentStream<'_>> {
        let mut stream: Option<DocumentStream<'_>> = None;
        for stage in &self.stages {
            debug!(stage = stage.name(), shard = %shard, "Wiring stage");
            stream = Some(stage.process(stream, shard)?);
        }
        Ok(stream.unwrap_or_else(empty_stream))
    }

    /// Run every stage for `shard`, returning the number of documents that
    /// came out of the last stage.
    pub fn run(&self, shard: Shard) -> Result<usize> {
        let mut emitted = 0;
        for doc in self.stream(shard)? {
            doc?;
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Statistics of every stage that keeps them, in pipeline order.
    #[must_use]
    pub fn stats(&self) -> Vec<StageStats> {
        self.stages.iter().filter_map(|s| s.stats()).collect()
    }
}
