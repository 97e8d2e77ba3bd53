//! Stage 3: remove flagged sentences from each shard's documents.
//!
//! The documents must arrive in the same order as in stage 1, because
//! `doc_id` is a position, not a stored field.

use crate::error::{DedupError, Result};
use crate::records::{duplicate_path, read_duplicates, DuplicateRecord};
use crate::signature::DEFAULT_N_SENTENCES;
use serde::{Deserialize, Serialize};
use shardsift_core::io::{JsonlSink, JsonlWriter};
use shardsift_core::pipeline::empty_stream;
use shardsift_core::text::{split_sentences, word_tokenize};
use shardsift_core::{Document, DocumentStream, PipelineStage, Shard, StageStats, StatsCollector};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Drop reason for documents left too short after sentence removal.
pub const MIN_DOC_WORDS_REASON: &str = "min_doc_words";

/// Which sentences a flagged window removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Every sentence the window covers, `start..start + n`.
    #[default]
    FullWindow,
    /// Only the window's first sentence.
    WindowStart,
}

/// Stage 3 configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateFilterConfig {
    /// Documents with fewer words than this are dropped.
    pub min_doc_words: usize,
    pub drop_policy: DropPolicy,
    /// Window length used in stage 1.
    pub n_sentences: usize,
}

impl Default for DuplicateFilterConfig {
    fn default() -> Self {
        Self {
            min_doc_words: 50,
            drop_policy: DropPolicy::FullWindow,
            n_sentences: DEFAULT_N_SENTENCES,
        }
    }
}

impl DuplicateFilterConfig {
    #[must_use]
    pub fn with_min_doc_words(mut self, words: usize) -> Self {
        self.min_doc_words = words;
        self
    }

    #[must_use]
    pub fn with_drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    #[must_use]
    pub fn with_n_sentences(mut self, n: usize) -> Self {
        self.n_sentences = n;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_sentences == 0 {
            return Err(DedupError::InvalidConfig(
                "n_sentences must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Flagged window starts of one shard, keyed by `doc_id`.
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    flagged: HashMap<u32, Vec<u16>>,
    records: usize,
}

impl DuplicateIndex {
    /// Build from records in any order.
    pub fn from_records<I: IntoIterator<Item = DuplicateRecord>>(records: I) -> Self {
        let mut flagged: HashMap<u32, Vec<u16>> = HashMap::new();
        for record in records {
            flagged
                .entry(record.doc_id)
                .or_default()
                .push(record.sentence_id);
        }
        let mut total = 0;
        for starts in flagged.values_mut() {
            starts.sort_unstable();
            starts.dedup();
            total += starts.len();
        }
        Self {
            flagged,
            records: total,
        }
    }

    /// Load a `.dup` file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_records(read_duplicates(path)?))
    }

    /// Sorted flagged window starts of `doc_id`.
    #[must_use]
    pub fn get(&self, doc_id: u32) -> Option<&[u16]> {
        self.flagged.get(&doc_id).map(Vec::as_slice)
    }

    /// Number of distinct flagged windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Number of documents with at least one flag.
    #[must_use]
    pub fn documents(&self) -> usize {
        self.flagged.len()
    }
}

/// Stage 3 as a pipeline stage placed after a reader.
pub struct DuplicateFilterStage {
    duplicate_dir: PathBuf,
    config: DuplicateFilterConfig,
    exclusion: Option<JsonlWriter>,
    stats: StatsCollector,
}

impl DuplicateFilterStage {
    /// Read duplicate files from `duplicate_dir`.
    pub fn new(duplicate_dir: impl Into<PathBuf>, config: DuplicateFilterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            duplicate_dir: duplicate_dir.into(),
            config,
            exclusion: None,
            stats: StatsCollector::new("sentence_dedup_filter"),
        })
    }

    /// Write dropped documents to `writer`.
    #[must_use]
    pub fn with_exclusion_writer(mut self, writer: JsonlWriter) -> Self {
        self.exclusion = Some(writer);
        self
    }

    #[must_use]
    pub fn config(&self) -> &DuplicateFilterConfig {
        &self.config
    }

    /// Load the duplicate index of `shard`.
    pub fn load_index(&self, shard: Shard) -> Result<DuplicateIndex> {
        let path = duplicate_path(&self.duplicate_dir, shard.index);
        if !path.is_file() {
            return Err(DedupError::MissingDuplicateFile { path });
        }
        let index = DuplicateIndex::load(&path)?;
        debug!(
            shard = %shard,
            path = %path.display(),
            flagged = index.len(),
            "Loaded duplicate index"
        );
        Ok(index)
    }

    /// Rewrite `doc` given its flagged window starts.
    ///
    /// Returns the document (text unchanged when nothing is flagged) and the
    /// number of sentences removed, or `None` when it is too short to keep.
    pub fn apply(&self, mut doc: Document, flagged: Option<&[u16]>) -> (Option<Document>, usize) {
        let mut removed_count = 0;
        if let Some(starts) = flagged.filter(|s| !s.is_empty()) {
            let sentences = split_sentences(&doc.text);
            let mut removed = vec![false; sentences.len()];
            let span = match self.config.drop_policy {
                DropPolicy::FullWindow => self.config.n_sentences,
                DropPolicy::WindowStart => 1,
            };
            for &start in starts {
                let start = usize::from(start);
                let end = (start + span).min(sentences.len());
                for slot in removed.iter_mut().take(end).skip(start) {
                    *slot = true;
                }
            }
            removed_count = removed.iter().filter(|r| **r).count();
            doc.text = sentences
                .iter()
                .zip(&removed)
                .filter(|(_, removed)| !**removed)
                .map(|(sentence, _)| *sentence)
                .collect::<Vec<_>>()
                .join(" ");
        }

        if word_tokenize(&doc.text).len() < self.config.min_doc_words {
            return (None, removed_count);
        }
        (Some(doc), removed_count)
    }
}

impl PipelineStage for DuplicateFilterStage {
    fn name(&self) -> &str {
        "sentence_dedup_filter"
    }

    /// Fails immediately when the shard's duplicate file is missing.
    fn process<'a>(
        &'a self,
        input: Option<DocumentStream<'a>>,
        shard: Shard,
    ) -> shardsift_core::Result<DocumentStream<'a>> {
        let index = self.load_index(shard)?;
        Ok(Box::new(DedupStream {
            input: input.unwrap_or_else(empty_stream),
            stage: self,
            index,
            exclusion: self.exclusion.as_ref().map(|w| w.open(shard)),
            shard,
            position: 0,
            sentences_removed: 0,
            stats: StageStats::new("sentence_dedup_filter"),
            start: Instant::now(),
            done: false,
        }))
    }

    fn stats(&self) -> Option<StageStats> {
        Some(self.stats.snapshot())
    }
}

struct DedupStream<'a> {
    input: DocumentStream<'a>,
    stage: &'a DuplicateFilterStage,
    index: DuplicateIndex,
    exclusion: Option<JsonlSink>,
    shard: Shard,
    position: u64,
    sentences_removed: usize,
    stats: StageStats,
    start: Instant,
    done: bool,
}

impl DedupStream<'_> {
    fn finish(&mut self) -> shardsift_core::Result<()> {
        self.done = true;
        if let Some(sink) = self.exclusion.as_mut() {
            sink.finish()?;
        }
        self.stats.elapsed_secs = self.start.elapsed().as_secs_f64();
        info!(
            shard = %self.shard,
            documents = self.position,
            sentences_removed = self.sentences_removed,
            "Removed duplicate sentences"
        );
        self.stats.log(self.shard);
        self.stage.stats.merge(&self.stats);
        Ok(())
    }
}

impl Iterator for DedupStream<'_> {
    type Item = shardsift_core::Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for item in self.input.by_ref() {
            let doc = match item {
                Ok(doc) => doc,
                Err(e) => return Some(Err(e)),
            };
            // positions past u32::MAX were rejected by stage 1
            let flagged = u32::try_from(self.position)
                .ok()
                .and_then(|id| self.index.get(id));
            self.position += 1;

            let original = self.exclusion.is_some().then(|| doc.clone());
            let (kept, removed) = self.stage.apply(doc, flagged);
            self.sentences_removed += removed;
            match kept {
                Some(doc) => {
                    self.stats.record_forwarded();
                    return Some(Ok(doc));
                }
                None => {
                    self.stats.record_dropped(Some(MIN_DOC_WORDS_REASON));
                    if let (Some(sink), Some(mut doc)) = (self.exclusion.as_mut(), original) {
                        doc.set_filter_reason(MIN_DOC_WORDS_REASON);
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
