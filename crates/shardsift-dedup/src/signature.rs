//! Stage 1: sentence-window signatures.
//!
//! For every document of a shard (in arrival order, `doc_id` = position),
//! sentences are split with the canonical splitter, normalized, and every run
//! of `n_sentences` consecutive sentences is hashed. The shard's signatures
//! are sorted and written to `<output>/<shard:05>.sig`.

use crate::error::{DedupError, Result};
use crate::records::{signature_path, HashSignature, RecordWriter};
use serde::{Deserialize, Serialize};
use shardsift_core::pipeline::empty_stream;
use shardsift_core::text::{normalize_sentence, split_sentences};
use shardsift_core::{
    Document, DocumentStream, HashFunction, PipelineStage, Shard, SiftError, StageStats,
    StatsCollector, XxHash3,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Most windows a single document can contribute (`sentence_id` is a `u16`).
pub const MAX_WINDOWS_PER_DOC: usize = u16::MAX as usize + 1;

/// Most documents a shard can hold (`doc_id` is a `u32`).
pub const MAX_DOCS_PER_SHARD: u64 = u32::MAX as u64 + 1;

/// Default number of sentences per window.
pub const DEFAULT_N_SENTENCES: usize = 3;

/// Stage 1 configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Sentences per hashed window.
    pub n_sentences: usize,
    /// xxh3 seed; every shard of a run must use the same one.
    pub seed: u64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            n_sentences: DEFAULT_N_SENTENCES,
            seed: 0,
        }
    }
}

impl SignatureConfig {
    /// Set the window length.
    #[must_use]
    pub fn with_n_sentences(mut self, n: usize) -> Self {
        self.n_sentences = n;
        self
    }

    /// Set the hash seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.n_sentences == 0 {
            return Err(DedupError::InvalidConfig(
                "n_sentences must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hashes sentence windows of a document.
#[derive(Debug, Clone)]
pub struct SignatureGenerator<H = XxHash3> {
    n_sentences: usize,
    hasher: H,
}

impl SignatureGenerator<XxHash3> {
    /// Generator using xxh3 with the configured seed.
    pub fn new(config: &SignatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            n_sentences: config.n_sentences,
            hasher: XxHash3::with_seed(config.seed),
        })
    }
}

impl<H: HashFunction> SignatureGenerator<H> {
    /// Generator with a custom hash function.
    pub fn with_hasher(n_sentences: usize, hasher: H) -> Result<Self> {
        SignatureConfig::default()
            .with_n_sentences(n_sentences)
            .validate()?;
        Ok(Self {
            n_sentences,
            hasher,
        })
    }

    /// Sentences per window.
    #[must_use]
    pub fn n_sentences(&self) -> usize {
        self.n_sentences
    }

    /// Hash of every window, indexed by its first sentence.
    ///
    /// Empty when the text has fewer than `n_sentences` sentences.
    #[must_use]
    pub fn window_hashes(&self, text: &str) -> Vec<u64> {
        let sentences = split_sentences(text);
        if sentences.len() < self.n_sentences {
            return Vec::new();
        }

        let normalized: Vec<String> = sentences.iter().map(|s| normalize_sentence(s)).collect();
        normalized
            .windows(self.n_sentences)
            .map(|window| self.hasher.hash_str(&window.join(" ")))
            .collect()
    }

    /// Signatures of one document, capped at [`MAX_WINDOWS_PER_DOC`] windows.
    #[must_use]
    pub fn document_signatures(&self, text: &str, doc_id: u32) -> Vec<HashSignature> {
        self.capped_signatures(text, doc_id).0
    }

    /// Signatures plus whether the window limit cut the document short.
    fn capped_signatures(&self, text: &str, doc_id: u32) -> (Vec<HashSignature>, bool) {
        let mut hashes = self.window_hashes(text);
        let truncated = hashes.len() > MAX_WINDOWS_PER_DOC;
        if truncated {
            warn!(
                doc_id,
                windows = hashes.len(),
                kept = MAX_WINDOWS_PER_DOC,
                "Document exceeds the sentence window limit, truncating"
            );
            hashes.truncate(MAX_WINDOWS_PER_DOC);
        }

        let signatures = hashes
            .into_iter()
            .zip(0..=u16::MAX)
            .map(|(hash, sentence_id)| HashSignature::new(hash, doc_id, sentence_id))
            .collect();
        (signatures, truncated)
    }
}

/// Counters of one stage 1 shard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureStats {
    pub shard: usize,
    pub documents: u64,
    /// Documents with fewer sentences than a window.
    pub documents_without_windows: u64,
    pub truncated_documents: u64,
    pub signatures: u64,
    pub output: PathBuf,
    pub elapsed_secs: f64,
}

impl SignatureStats {
    /// Documents per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.documents as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// Stage 1 as a terminal pipeline stage.
pub struct SignatureStage<H = XxHash3> {
    output_dir: PathBuf,
    generator: SignatureGenerator<H>,
    stats: StatsCollector,
}

impl SignatureStage<XxHash3> {
    /// Write signature files into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, config: &SignatureConfig) -> Result<Self> {
        Ok(Self::with_generator(
            output_dir,
            SignatureGenerator::new(config)?,
        ))
    }
}

impl<H: HashFunction> SignatureStage<H> {
    /// Use an explicit generator.
    pub fn with_generator(output_dir: impl Into<PathBuf>, generator: SignatureGenerator<H>) -> Self {
        Self {
            output_dir: output_dir.into(),
            generator,
            stats: StatsCollector::new("sentence_dedup_signatures"),
        }
    }

    /// Output folder.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The window hasher.
    #[must_use]
    pub fn generator(&self) -> &SignatureGenerator<H> {
        &self.generator
    }

    /// Hash every document of `shard` and write its sorted signature file.
    ///
    /// The file is written even when the shard has no documents.
    pub fn run_shard<I>(&self, docs: I, shard: Shard) -> Result<SignatureStats>
    where
        I: IntoIterator<Item = shardsift_core::Result<Document>>,
    {
        let start = Instant::now();
        let mut stats = SignatureStats {
            shard: shard.index,
            output: signature_path(&self.output_dir, shard.index),
            ..Default::default()
        };
        let mut signatures: Vec<HashSignature> = Vec::new();

        for (position, doc) in docs.into_iter().enumerate() {
            let doc = doc?;
            let doc_id = u32::try_from(position).map_err(|_| DedupError::ShardTooLarge {
                shard: shard.index,
                documents: MAX_DOCS_PER_SHARD,
            })?;

            let (doc_signatures, truncated) = self.generator.capped_signatures(&doc.text, doc_id);
            if doc_signatures.is_empty() {
                stats.documents_without_windows += 1;
            }
            if truncated {
                stats.truncated_documents += 1;
            }
            stats.documents += 1;
            signatures.extend(doc_signatures);
        }

        signatures.sort_unstable();

        let mut writer = RecordWriter::create(&stats.output)?;
        for sig in &signatures {
            writer.write(sig)?;
        }
        stats.signatures = writer.finish()?;
        stats.elapsed_secs = start.elapsed().as_secs_f64();

        info!(
            shard = shard.index,
            documents = stats.documents,
            signatures = stats.signatures,
            truncated_documents = stats.truncated_documents,
            elapsed_secs = stats.elapsed_secs,
            "Wrote signature file"
        );

        let mut stage_stats = StageStats::new("sentence_dedup_signatures");
        stage_stats.total = stats.documents as usize;
        stage_stats.elapsed_secs = stats.elapsed_secs;
        self.stats.merge(&stage_stats);

        Ok(stats)
    }
}

impl<H: HashFunction> PipelineStage for SignatureStage<H> {
    fn name(&self) -> &str {
        "sentence_dedup_signatures"
    }

    fn process<'a>(
        &'a self,
        input: Option<DocumentStream<'a>>,
        shard: Shard,
    ) -> shardsift_core::Result<DocumentStream<'a>> {
        let input = input.unwrap_or_else(empty_stream);
        let run = std::iter::once_with(move || self.run_shard(input, shard));
        Ok(Box::new(run.filter_map(|result| {
            result.err().map(|e| Err(SiftError::from(e)))
        })))
    }

    fn stats(&self) -> Option<StageStats> {
        Some(self.stats.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordReader;
    use shardsift_core::pipeline::stream_from;
    use tempfile::TempDir;

    fn generator() -> SignatureGenerator {
        SignatureGenerator::new(&SignatureConfig::default()).unwrap()
    }

    #[test]
    fn test_exactly_window_length_gives_one_signature() {
        let sigs = generator().document_signatures("One a. Two b. Three c.", 7);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].doc_id, 7);
        assert_eq!(sigs[0].sentence_id, 0);
    }

    #[test]
    fn test_fewer_sentences_than_window_gives_none() {
        assert!(generator().document_signatures("One a. Two b.", 0).is_empty());
        assert!(generator().document_signatures("", 0).is_empty());
    }

    #[test]
    fn test_windows_indexed_by_start_sentence() {
        let sigs = generator()
            .document_signatures("A dog ran. It was warm. The sun set. Then it rained.", 0);
        let starts: Vec<u16> = sigs.iter().map(|s| s.sentence_id).collect();
        assert_eq!(starts, vec![0, 1]);
    }

    #[test]
    fn test_normalization_makes_hashes_match() {
        let g = generator();
        let a = g.window_hashes("It was warm. The sun set. Then it rained.");
        let b = g.window_hashes("IT WAS WARM!   The sun set... Then, it rained?");
        assert_eq!(a, b);
    }

    #[test]
    fn test_window_hash_is_xxh3_of_joined_normalized_sentences() {
        let hashes = generator().window_hashes("The cat sat. It was warm. The sun set.");
        assert_eq!(
            hashes,
            vec![XxHash3::new().hash_str("the cat sat it was warm the sun set")]
        );
    }

    #[test]
    fn test_seed_changes_hashes() {
        let seeded = SignatureGenerator::new(&SignatureConfig::default().with_seed(9)).unwrap();
        let text = "The cat sat. It was warm. The sun set.";
        assert_ne!(seeded.window_hashes(text), generator().window_hashes(text));
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = SignatureConfig::default().with_n_sentences(0);
        assert!(matches!(
            SignatureGenerator::new(&config),
            Err(DedupError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_window_count_capped_per_document() {
        let text: String = (0..MAX_WINDOWS_PER_DOC + 4)
            .map(|i| format!("Line {i}. "))
            .collect();
        let (sigs, truncated) = generator().capped_signatures(&text, 3);

        assert!(truncated);
        assert_eq!(sigs.len(), MAX_WINDOWS_PER_DOC);
        assert_eq!(sigs.last().unwrap().sentence_id, u16::MAX);
        assert!(sigs.iter().all(|s| s.doc_id == 3));
    }

    #[test]
    fn test_run_shard_writes_sorted_file() {
        let dir = TempDir::new().unwrap();
        let stage = SignatureStage::new(dir.path(), &SignatureConfig::default()).unwrap();
        let docs = vec![
            Document::new("a", "Short one."),
            Document::new("b", "First here. Second here. Third here. Fourth here. Fifth here."),
            Document::new("c", "Alpha one. Beta two. Gamma three."),
        ];

        let stats = stage
            .run_shard(docs.into_iter().map(Ok), Shard::new(4, 8).unwrap())
            .unwrap();
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.documents_without_windows, 1);
        assert_eq!(stats.signatures, 4);
        assert_eq!(stats.output, dir.path().join("00004.sig"));

        let sigs: Vec<HashSignature> = RecordReader::open(&stats.output)
            .unwrap()
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(sigs.len(), 4);
        assert!(sigs.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(sigs.iter().filter(|s| s.doc_id == 1).count(), 3);
        assert_eq!(sigs.iter().filter(|s| s.doc_id == 2).count(), 1);
    }

    #[test]
    fn test_empty_shard_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        let stage = SignatureStage::new(dir.path(), &SignatureConfig::default()).unwrap();

        let out: Vec<_> = stage
            .process(Some(stream_from(Vec::new())), Shard::single())
            .unwrap()
            .collect();
        assert!(out.is_empty());

        let path = dir.path().join("00000.sig");
        assert_eq!(std::fs::metadata(path).unwrap().len(), 0);
    }
}
