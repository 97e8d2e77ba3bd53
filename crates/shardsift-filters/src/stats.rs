//! Pass-through document length statistics.

use serde::{Deserialize, Serialize};
use shardsift_core::pipeline::empty_stream;
use shardsift_core::text::char_len;
use shardsift_core::{
    Document, DocumentStream, PipelineStage, Result, Shard, StageStats, StatsCollector,
};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::info;

/// Character length summary of the documents seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LengthSummary {
    pub count: usize,
    pub total_chars: usize,
    pub min_chars: usize,
    pub max_chars: usize,
}

impl LengthSummary {
    /// Add one document length.
    pub fn update(&mut self, len: usize) {
        if self.count == 0 {
            self.min_chars = len;
            self.max_chars = len;
        } else {
            self.min_chars = self.min_chars.min(len);
            self.max_chars = self.max_chars.max(len);
        }
        self.count += 1;
        self.total_chars += len;
    }

    /// Combine with another summary.
    pub fn merge(&mut self, other: &LengthSummary) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min_chars = self.min_chars.min(other.min_chars);
        self.max_chars = self.max_chars.max(other.max_chars);
        self.count += other.count;
        self.total_chars += other.total_chars;
    }

    /// Mean length, 0.0 when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        shardsift_core::text::fraction(self.total_chars, self.count).unwrap_or(0.0)
    }
}

/// Records document lengths and forwards every document unchanged.
#[derive(Debug)]
pub struct DocLengthStats {
    summary: Mutex<LengthSummary>,
    stats: StatsCollector,
}

impl Default for DocLengthStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DocLengthStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            summary: Mutex::new(LengthSummary::default()),
            stats: StatsCollector::new("doc_length"),
        }
    }

    /// Lengths over every completed stream.
    #[must_use]
    pub fn summary(&self) -> LengthSummary {
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PipelineStage for DocLengthStats {
    fn name(&self) -> &str {
        "doc_length"
    }

    fn process<'a>(
        &'a self,
        input: Option<DocumentStream<'a>>,
        shard: Shard,
    ) -> Result<DocumentStream<'a>> {
        Ok(Box::new(LengthStream {
            input: input.unwrap_or_else(empty_stream),
            owner: self,
            shard,
            local: LengthSummary::default(),
            stats: StageStats::new(self.name()),
            start: Instant::now(),
            done: false,
        }))
    }

    fn stats(&self) -> Option<StageStats> {
        Some(self.stats.snapshot())
    }
}

struct LengthStream<'a> {
    input: DocumentStream<'a>,
    owner: &'a DocLengthStats,
    shard: Shard,
    local: LengthSummary,
    stats: StageStats,
    start: Instant,
    done: bool,
}

impl Iterator for LengthStream<'_> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.input.next() {
            Some(Ok(doc)) => {
                self.local.update(char_len(&doc.text));
                self.stats.record_forwarded();
                Some(Ok(doc))
            }
            Some(Err(e)) => Some(Err(e)),
            None => {
                self.done = true;
                self.stats.elapsed_secs = self.start.elapsed().as_secs_f64();
                info!(
                    shard = %self.shard,
                    documents = self.local.count,
                    min_chars = self.local.min_chars,
                    max_chars = self.local.max_chars,
                    mean_chars = self.local.mean(),
                    "Document length stats"
                );
                self.owner
                    .summary
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .merge(&self.local);
                self.owner.stats.merge(&self.stats);
                None
            }
        }
    }
}
