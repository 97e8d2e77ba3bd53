//! Local driver for the three dedup stages.
//!
//! Each stage is a separate executor invocation, so every signature file
//! exists before the merge starts and every duplicate file exists before any
//! shard is filtered.

use crate::error::{DedupError, Result};
use crate::filter::{DuplicateFilterConfig, DuplicateFilterStage};
use crate::finder::{DuplicateFinder, FinderStats};
use crate::signature::{SignatureConfig, SignatureStage, SignatureStats};
use serde::{Deserialize, Serialize};
use shardsift_core::io::{Compression, JsonlReader, JsonlWriter, ReaderConfig};
use shardsift_core::{LocalExecutor, Pipeline, Shard, StageStats};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

const WRITER_STAGE: &str = "jsonl_writer";

/// Output of the filter stage over one or more shards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    pub shards: usize,
    pub documents_written: usize,
    pub stages: Vec<StageStats>,
    pub elapsed_secs: f64,
}

impl FilterReport {
    /// Collect stage counters after `shards` runs of `pipeline`.
    ///
    /// The terminal writer emits nothing downstream, so the written count is
    /// its `forwarded` counter.
    fn from_pipeline(pipeline: &Pipeline, shards: usize, start: Instant) -> Self {
        let stages = pipeline.stats();
        let documents_written = stages
            .iter()
            .find(|s| s.stage == WRITER_STAGE)
            .map_or(0, |s| s.forwarded);
        Self {
            shards,
            documents_written,
            stages,
            elapsed_secs: start.elapsed().as_secs_f64(),
        }
    }
}

/// Output of a complete local run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupReport {
    pub signatures: Vec<SignatureStats>,
    pub finder: FinderStats,
    pub filter: FilterReport,
    pub elapsed_secs: f64,
}

/// Sentence dedup of one JSONL folder into another.
///
/// Intermediate files go to `<work_dir>/signatures` and
/// `<work_dir>/duplicates`.
#[derive(Debug, Clone)]
pub struct DedupJob {
    input: PathBuf,
    output: PathBuf,
    work_dir: PathBuf,
    reader: ReaderConfig,
    signature: SignatureConfig,
    filter: DuplicateFilterConfig,
    compression: Compression,
    exclusion_dir: Option<PathBuf>,
    tasks: usize,
    workers: usize,
}

impl DedupJob {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            work_dir: work_dir.into(),
            reader: ReaderConfig::default(),
            signature: SignatureConfig::default(),
            filter: DuplicateFilterConfig::default(),
            compression: Compression::None,
            exclusion_dir: None,
            tasks: 1,
            workers: 0,
        }
    }

    #[must_use]
    pub fn with_reader_config(mut self, config: ReaderConfig) -> Self {
        self.reader = config;
        self
    }

    #[must_use]
    pub fn with_signature_config(mut self, config: SignatureConfig) -> Self {
        self.signature = config;
        self
    }

    /// Stage 3 settings. The window length is taken from the signature config.
    #[must_use]
    pub fn with_filter_config(mut self, config: DuplicateFilterConfig) -> Self {
        self.filter = config;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Write documents dropped by stage 3 under `dir`.
    #[must_use]
    pub fn with_exclusion_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exclusion_dir = Some(dir.into());
        self
    }

    /// Number of shards (at least 1).
    #[must_use]
    pub fn with_tasks(mut self, tasks: usize) -> Self {
        self.tasks = tasks.max(1);
        self
    }

    /// Concurrent workers (0 means one per core).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn tasks(&self) -> usize {
        self.tasks
    }

    #[must_use]
    pub fn signatures_dir(&self) -> PathBuf {
        self.work_dir.join("signatures")
    }

    #[must_use]
    pub fn duplicates_dir(&self) -> PathBuf {
        self.work_dir.join("duplicates")
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    fn executor(&self) -> LocalExecutor {
        LocalExecutor::new(self.tasks).with_workers(self.workers)
    }

    fn reader(&self) -> JsonlReader {
        JsonlReader::new(&self.input).with_config(self.reader.clone())
    }

    /// Stage 1 for a single shard.
    pub fn signatures_shard(&self, shard: Shard) -> Result<SignatureStats> {
        let stage = SignatureStage::new(self.signatures_dir(), &self.signature)?;
        stage.run_shard(self.reader().read_shard(shard)?, shard)
    }

    /// Stage 1 for every shard.
    pub fn run_signatures(&self) -> Result<Vec<SignatureStats>> {
        let stage = SignatureStage::new(self.signatures_dir(), &self.signature)?;
        let reader = self.reader();
        self.executor()
            .run(|shard| stage.run_shard(reader.read_shard(shard)?, shard))
    }

    /// Stage 2 over every signature file.
    pub fn run_find_duplicates(&self) -> Result<FinderStats> {
        DuplicateFinder::new(self.signatures_dir(), self.duplicates_dir()).run()
    }

    fn filter_pipeline(&self) -> Result<Pipeline> {
        let config = self
            .filter
            .clone()
            .with_n_sentences(self.signature.n_sentences);
        let mut stage = DuplicateFilterStage::new(self.duplicates_dir(), config)?;
        if let Some(dir) = &self.exclusion_dir {
            stage = stage.with_exclusion_writer(
                JsonlWriter::new(dir).with_compression(self.compression),
            );
        }
        Ok(Pipeline::new()
            .with_stage(self.reader())
            .with_stage(stage)
            .with_stage(JsonlWriter::new(&self.output).with_compression(self.compression)))
    }

    /// Stage 3 for a single shard.
    pub fn filter_shard(&self, shard: Shard) -> Result<FilterReport> {
        let start = Instant::now();
        let pipeline = self.filter_pipeline()?;
        pipeline.run(shard)?;
        Ok(FilterReport::from_pipeline(&pipeline, 1, start))
    }

    /// Stage 3 for every shard.
    pub fn run_filter(&self) -> Result<FilterReport> {
        let start = Instant::now();
        let pipeline = self.filter_pipeline()?;
        let shards = self
            .executor()
            .run(|shard| pipeline.run(shard).map_err(DedupError::from))?;
        Ok(FilterReport::from_pipeline(&pipeline, shards.len(), start))
    }

    /// All three stages, in order.
    pub fn run(&self) -> Result<DedupReport> {
        let start = Instant::now();
        let signatures = self.run_signatures()?;
        let finder = self.run_find_duplicates()?;
        let filter = self.run_filter()?;
        let report = DedupReport {
            signatures,
            finder,
            filter,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            shards = self.tasks,
            duplicates = report.finder.duplicates,
            documents_written = report.filter.documents_written,
            elapsed_secs = report.elapsed_secs,
            "Sentence dedup finished"
        );
        Ok(report)
    }
}
