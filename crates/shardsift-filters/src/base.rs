//! Filter contract and the stage that drives it.
//!
//! A [`DocumentFilter`] is a pure predicate over one document. [`FilterStage`]
//! lifts it into a [`PipelineStage`]: kept documents are forwarded, rejected
//! ones are dropped and, when an exclusion writer is configured, written there
//! with `metadata["filter_reason"]` set.

use shardsift_core::io::{JsonlSink, JsonlWriter};
use shardsift_core::pipeline::empty_stream;
use shardsift_core::{
    Document, DocumentStream, PipelineStage, Result, Shard, StageStats, StatsCollector,
};
use std::borrow::Cow;
use std::time::Instant;

/// Outcome of a filter for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Forward the document.
    Keep,
    /// Remove the document, optionally naming the rule that fired.
    Drop {
        /// Reason tag, e.g. `gopher_short_doc`.
        reason: Option<Cow<'static, str>>,
    },
}

impl FilterVerdict {
    /// Drop with a fixed reason tag.
    #[must_use]
    pub fn drop(reason: &'static str) -> Self {
        Self::Drop {
            reason: Some(Cow::Borrowed(reason)),
        }
    }

    /// Drop with a computed reason tag.
    #[must_use]
    pub fn drop_owned(reason: String) -> Self {
        Self::Drop {
            reason: Some(Cow::Owned(reason)),
        }
    }

    /// Whether the document survives.
    #[must_use]
    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    /// Reason tag of a drop.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Keep => None,
            Self::Drop { reason } => reason.as_deref(),
        }
    }
}

/// A stateless per-document predicate.
///
/// Implementations are configured once and must not keep per-document state,
/// so one instance can serve every shard concurrently.
pub trait DocumentFilter: Send + Sync {
    /// Short name used in logs and statistics.
    fn name(&self) -> &str;

    /// Decide whether `doc` is kept.
    fn filter(&self, doc: &Document) -> FilterVerdict;
}

impl<F: DocumentFilter + ?Sized> DocumentFilter for Box<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn filter(&self, doc: &Document) -> FilterVerdict {
        (**self).filter(doc)
    }
}

/// Pipeline stage applying a [`DocumentFilter`] to every document.
pub struct FilterStage<F> {
    filter: F,
    exclusion: Option<JsonlWriter>,
    stats: StatsCollector,
}

impl<F: DocumentFilter> FilterStage<F> {
    /// Wrap `filter` without an exclusion sink.
    pub fn new(filter: F) -> Self {
        let stats = StatsCollector::new(filter.name());
        Self {
            filter,
            exclusion: None,
            stats,
        }
    }

    /// Write rejected documents to `writer`.
    #[must_use]
    pub fn with_exclusion_writer(mut self, writer: JsonlWriter) -> Self {
        self.exclusion = Some(writer);
        self
    }

    /// The wrapped filter.
    pub fn filter(&self) -> &F {
        &self.filter
    }
}

impl<F: DocumentFilter> PipelineStage for FilterStage<F> {
    fn name(&self) -> &str {
        self.filter.name()
    }

    fn process<'a>(
        &'a self,
        input: Option<DocumentStream<'a>>,
        shard: Shard,
    ) -> Result<DocumentStream<'a>> {
        Ok(Box::new(FilterStream {
            input: input.unwrap_or_else(empty_stream),
            filter: &self.filter,
            exclusion: self.exclusion.as_ref().map(|w| w.open(shard)),
            shard,
            collector: &self.stats,
            stats: StageStats::new(self.filter.name()),
            start: Instant::now(),
            done: false,
        }))
    }

    fn stats(&self) -> Option<StageStats> {
        Some(self.stats.snapshot())
    }
}

struct FilterStream<'a, F> {
    input: DocumentStream<'a>,
    filter: &'a F,
    exclusion: Option<JsonlSink>,
    shard: Shard,
    collector: &'a StatsCollector,
    stats: StageStats,
    start: Instant,
    done: bool,
}

impl<F: DocumentFilter> FilterStream<'_, F> {
    fn finish(&mut self) -> Result<()> {
        self.done = true;
        if let Some(sink) = self.exclusion.as_mut() {
            sink.finish()?;
        }
        self.stats.elapsed_secs = self.start.elapsed().as_secs_f64();
        self.stats.log(self.shard);
        self.collector.merge(&self.stats);
        Ok(())
    }
}

impl<F: DocumentFilter> Iterator for FilterStream<'_, F> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for item in self.input.by_ref() {
            let mut doc = match item {
                Ok(doc) => doc,
                Err(e) => return Some(Err(e)),
            };
            match self.filter.filter(&doc) {
                FilterVerdict::Keep => {
                    self.stats.record_forwarded();
                    return Some(Ok(doc));
                }
                FilterVerdict::Drop { reason } => {
                    self.stats.record_dropped(reason.as_deref());
                    if let Some(sink) = self.exclusion.as_mut() {
                        if let Some(reason) = reason.as_deref() {
                            doc.set_filter_reason(reason);
                        }
                        if let Err(e) = sink.write(&doc) {
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
        self.finish().err().map(Err)
    }
}
