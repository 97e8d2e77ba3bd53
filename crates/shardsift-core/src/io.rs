//! JSON Lines shard reader and writer.
//!
//! Shard folders hold `*.jsonl` or zstd-compressed `*.jsonl.zst` files, one
//! JSON object per line:
//!
//! ```text
//! {"id": "doc-1", "text": "...", "metadata": {"url": "https://..."}}
//! ```
//!
//! Files are listed in sorted order and dealt round-robin to shards, so every
//! stage that reads a folder with the same `(shard_index, shard_count)` sees
//! the same documents in the same order.

use crate::document::{Document, Shard, FILE_PATH_KEY};
use crate::error::{Result, SiftError};
use crate::pipeline::{empty_stream, DocumentStream, PipelineStage, StageStats, StatsCollector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// On-disk compression of JSONL shard files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Plain `.jsonl`
    #[default]
    None,
    /// Zstandard `.jsonl.zst`
    Zstd,
}

impl Compression {
    /// File extension written for this compression.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "jsonl",
            Self::Zstd => "jsonl.zst",
        }
    }

    /// Detect compression from a file name.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let is_zstd = path
            .as_ref()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zst"));
        if is_zstd {
            Self::Zstd
        } else {
            Self::None
        }
    }
}

/// List the JSONL files (plain or zstd) directly inside `dir`, sorted by name.
pub fn list_jsonl_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && (name.ends_with(".jsonl") || name.ends_with(".jsonl.zst")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The files of a sorted listing that belong to `shard` (round-robin).
#[must_use]
pub fn files_for_shard(files: &[PathBuf], shard: Shard) -> Vec<PathBuf> {
    files
        .iter()
        .enumerate()
        .filter(|(i, _)| shard.owns(*i))
        .map(|(_, p)| p.clone())
        .collect()
}

/// Open a JSONL file for line reading, decompressing `.zst` transparently.
pub fn open_lines<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path.as_ref())?;
    match Compression::from_path(path.as_ref()) {
        Compression::None => Ok(Box::new(BufReader::new(file))),
        Compression::Zstd => Ok(Box::new(BufReader::new(zstd::Decoder::new(file)?))),
    }
}

/// Configuration for [`JsonlReader`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Key holding the document text.
    pub text_key: String,
    /// Key holding the document id.
    pub id_key: String,
    /// Maximum number of documents read per shard.
    pub limit: Option<usize>,
    /// Fail on undecodable lines instead of skipping them.
    pub strict: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            text_key: "text".to_string(),
            id_key: "id".to_string(),
            limit: None,
            strict: false,
        }
    }
}

impl ReaderConfig {
    /// Set the text key.
    #[must_use]
    pub fn with_text_key(mut self, key: impl Into<String>) -> Self {
        self.text_key = key.into();
        self
    }

    /// Set the per-shard document limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Fail on the first undecodable line.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Decode one JSONL line into a [`Document`].
///
/// Unknown top-level keys are moved into `metadata`; a numeric id is
/// stringified and a missing id becomes `<file name>/<line>`.
pub fn parse_document(
    line: &str,
    config: &ReaderConfig,
    path: &Path,
    line_num: usize,
) -> Result<Document> {
    let json: Value = serde_json::from_str(line).map_err(|e| SiftError::Parse {
        path: path.to_path_buf(),
        line: line_num,
        message: e.to_string(),
    })?;
    let Value::Object(mut object) = json else {
        return Err(SiftError::Parse {
            path: path.to_path_buf(),
            line: line_num,
            message: "expected a JSON object".to_string(),
        });
    };

    let text = match object.remove(&config.text_key) {
        Some(Value::String(text)) => text,
        _ => {
            return Err(SiftError::MissingField {
                field: config.text_key.clone(),
                path: path.to_path_buf(),
                line: line_num,
            })
        }
    };

    let id = match object.remove(&config.id_key) {
        Some(Value::String(id)) => id,
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{name}/{line_num}")
        }
    };

    let mut metadata = match object.remove("metadata") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, value) in object {
        metadata.entry(key).or_insert(value);
    }
    metadata
        .entry(FILE_PATH_KEY.to_string())
        .or_insert_with(|| Value::from(path.display().to_string()));

    Ok(Document {
        id,
        text,
        metadata,
    })
}

/// Streaming reader over the lines of one JSONL file.
pub struct JsonlFileReader {
    reader: Box<dyn BufRead + Send>,
    path: PathBuf,
    config: ReaderConfig,
    line_num: usize,
}

impl JsonlFileReader {
    /// Open `path` for streaming.
    pub fn open<P: AsRef<Path>>(path: P, config: ReaderConfig) -> Result<Self> {
        debug!(path = %path.as_ref().display(), "Opening input file");
        Ok(Self {
            reader: open_lines(path.as_ref())?,
            path: path.as_ref().to_path_buf(),
            config,
            line_num: 0,
        })
    }
}

impl Iterator for JsonlFileReader {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();

        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_num += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_document(&line, &self.config, &self.path, self.line_num) {
                        Ok(doc) => return Some(Ok(doc)),
                        Err(e) if !self.config.strict => {
                            warn!(error = %e, "Skipping undecodable line");
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
                Err(e) => return Some(Err(SiftError::Io(e))),
            }
        }
    }
}

/// Reader stage: streams the JSONL files of a folder that belong to a shard.
#[derive(Debug, Clone)]
pub struct JsonlReader {
    folder: PathBuf,
    config: ReaderConfig,
}

impl JsonlReader {
    /// Read from `folder` with the default configuration.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            config: ReaderConfig::default(),
        }
    }

    /// Replace the reader configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Files this reader will open for `shard`.
    pub fn shard_files(&self, shard: Shard) -> Result<Vec<PathBuf>> {
        Ok(files_for_shard(&list_jsonl_files(&self.folder)?, shard))
    }

    /// Lazily read every document of `shard`.
    pub fn read_shard(&self, shard: Shard) -> Result<ShardReader> {
        Ok(ShardReader {
            files: self.shard_files(shard)?.into(),
            current: None,
            config: self.config.clone(),
            emitted: 0,
        })
    }
}

impl PipelineStage for JsonlReader {
    fn name(&self) -> &str {
        "jsonl_reader"
    }

    fn process<'a>(
        &'a self,
        input: Option<DocumentStream<'a>>,
        shard: Shard,
    ) -> Result<DocumentStream<'a>> {
        let own = self.read_shard(shard)?;
        match input {
            Some(upstream) => Ok(Box::new(upstream.chain(own))),
            None => Ok(Box::new(own)),
        }
    }
}

/// Iterator over all documents of one shard's files, honouring `limit`.
pub struct ShardReader {
    files: VecDeque<PathBuf>,
    current: Option<JsonlFileReader>,
    config: ReaderConfig,
    emitted: usize,
}

impl Iterator for ShardReader {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.config.limit.is_some_and(|limit| self.emitted >= limit) {
            return None;
        }
        loop {
            if let Some(reader) = self.current.as_mut() {
                if let Some(item) = reader.next() {
                    if item.is_ok() {
                        self.emitted += 1;
                    }
                    return Some(item);
                }
                self.current = None;
            }
            let path = self.files.pop_front()?;
            match JsonlFileReader::open(&path, self.config.clone()) {
                Ok(reader) => self.current = Some(reader),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

enum SinkWriter {
    Plain(BufWriter<File>),
    Zstd(zstd::Encoder<'static, BufWriter<File>>),
}

impl SinkWriter {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Plain(w) => w,
            Self::Zstd(w) => w,
        }
    }

    fn finish(self) -> std::io::Result<()> {
        match self {
            Self::Plain(mut w) => w.flush(),
            Self::Zstd(w) => w.finish()?.flush(),
        }
    }
}

/// Per-shard JSONL output file, created on the first write.
///
/// The file is flushed (and the zstd frame finished) by [`JsonlSink::finish`],
/// or on drop if the stream was abandoned early.
pub struct JsonlSink {
    path: PathBuf,
    compression: Compression,
    writer: Option<SinkWriter>,
    written: usize,
}

impl JsonlSink {
    /// Prepare a sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>, compression: Compression) -> Self {
        Self {
            path: path.into(),
            compression,
            writer: None,
            written: 0,
        }
    }

    /// Output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Documents written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    fn open(&mut self) -> Result<&mut SinkWriter> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            debug!(path = %self.path.display(), "Opening output file");
            let file = BufWriter::new(File::create(&self.path)?);
            self.writer = Some(match self.compression {
                Compression::None => SinkWriter::Plain(file),
                Compression::Zstd => SinkWriter::Zstd(zstd::Encoder::new(file, 3)?),
            });
        }
        self.writer
            .as_mut()
            .ok_or_else(|| SiftError::Pipeline("output file not open".to_string()))
    }

    /// Append one document as a JSON line.
    pub fn write(&mut self, doc: &Document) -> Result<()> {
        let writer = self.open()?.writer();
        serde_json::to_writer(&mut *writer, doc)?;
        writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Flush and close the file, returning the number of documents written.
    pub fn finish(&mut self) -> Result<usize> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        Ok(self.written)
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(path = %self.path.display(), error = %e, "Failed to close output file");
        }
    }
}

/// Writer stage: persists every document of a shard to
/// `<folder>/<shard_index:05>.jsonl[.zst]`.
///
/// Also used as the exclusion sink of filters.
#[derive(Debug)]
pub struct JsonlWriter {
    folder: PathBuf,
    compression: Compression,
    stats: StatsCollector,
}

impl JsonlWriter {
    /// Write plain JSONL into `folder`.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            compression: Compression::None,
            stats: StatsCollector::new("jsonl_writer"),
        }
    }

    /// Set output compression.
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Output folder.
    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Output path for `shard`.
    #[must_use]
    pub fn output_path(&self, shard: Shard) -> PathBuf {
        self.folder
            .join(shard.file_name(self.compression.extension()))
    }

    /// Open a sink for `shard`.
    #[must_use]
    pub fn open(&self, shard: Shard) -> JsonlSink {
        JsonlSink::new(self.output_path(shard), self.compression)
    }
}

impl PipelineStage for JsonlWriter {
    fn name(&self) -> &str {
        "jsonl_writer"
    }

    fn process<'a>(
        &'a self,
        input: Option<DocumentStream<'a>>,
        shard: Shard,
    ) -> Result<DocumentStream<'a>> {
        Ok(Box::new(WriterStream {
            input: input.unwrap_or_else(empty_stream),
            sink: self.open(shard),
            shard,
            collector: &self.stats,
            stats: StageStats::new(self.name()),
            start: Instant::now(),
            done: false,
        }))
    }

    fn stats(&self) -> Option<StageStats> {
        Some(self.stats.snapshot())
    }
}

/// Drains its input into a sink; yields only errors.
struct WriterStream<'a> {
    input: DocumentStream<'a>,
    sink: JsonlSink,
    shard: Shard,
    collector: &'a StatsCollector,
    stats: StageStats,
    start: Instant,
    done: bool,
}

impl Iterator for WriterStream<'_> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for doc in self.input.by_ref() {
            let written = doc.and_then(|doc| self.sink.write(&doc));
            if let Err(e) = written {
                return Some(Err(e));
            }
            self.stats.record_forwarded();
        }
        self.done = true;
        if let Err(e) = self.sink.finish() {
            return Some(Err(e));
        }
        self.stats.elapsed_secs = self.start.elapsed().as_secs_f64();
        self.stats.log(self.shard);
        self.collector.merge(&self.stats);
        None
    }
}
