//! Stage 2: global k-way merge of signature files.
//!
//! One reader per shard feeds a min-heap ordered by
//! `(hash_value, shard_id, doc_id, sentence_id)`. The first record popped for
//! a hash value is canonical; every later record with the same hash is written
//! to the duplicate file of the shard it came from.
//!
//! Memory use is one buffered record per shard, independent of corpus size.

use crate::error::{DedupError, Result};
use crate::records::{
    duplicate_path, list_signature_files, parse_shard_index, DuplicateRecord, HashSignature,
    RecordReader, RecordWriter, ShardedSignature, SIGNATURE_EXTENSION,
};
use serde::{Deserialize, Serialize};
use shardsift_core::{DocumentStream, PipelineStage, Shard, SiftError, StageStats, StatsCollector};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Counters of one stage 2 run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinderStats {
    pub shards: usize,
    pub signatures_read: u64,
    pub duplicates: u64,
    /// Duplicate records written per shard index.
    pub duplicates_per_shard: BTreeMap<usize, u64>,
    /// Signature files that ended in a partial record.
    pub truncated_files: usize,
    pub elapsed_secs: f64,
}

impl FinderStats {
    /// Share of signatures flagged as duplicates.
    #[must_use]
    pub fn duplicate_ratio(&self) -> f64 {
        if self.signatures_read == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.signatures_read as f64
        }
    }
}

struct ShardInput {
    shard_id: usize,
    reader: RecordReader<HashSignature>,
    writer: RecordWriter<DuplicateRecord>,
}

/// Finds every non-canonical sentence window across all shards.
#[derive(Debug)]
pub struct DuplicateFinder {
    signature_dir: PathBuf,
    output_dir: PathBuf,
    stats: StatsCollector,
}

impl DuplicateFinder {
    /// Read `*.sig` files from `signature_dir`, write `*.dup` files to `output_dir`.
    pub fn new(signature_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            signature_dir: signature_dir.into(),
            output_dir: output_dir.into(),
            stats: StatsCollector::new("sentence_dedup_find"),
        }
    }

    /// Merge every signature file of the signature folder.
    pub fn run(&self) -> Result<FinderStats> {
        let files = list_signature_files(&self.signature_dir)?;
        let paths: Vec<PathBuf> = files.into_iter().map(|(_, path)| path).collect();
        self.run_files(&paths)
    }

    /// Merge the given signature files, in any order.
    ///
    /// Each file's shard id comes from its `<shard:05>.sig` name, so the
    /// result does not depend on the order of `files`. A duplicate file is
    /// created for every input, even when it stays empty.
    pub fn run_files(&self, files: &[PathBuf]) -> Result<FinderStats> {
        let start = Instant::now();
        let mut inputs = self.open_inputs(files)?;
        let mut stats = FinderStats {
            shards: inputs.len(),
            ..Default::default()
        };

        let mut heap = BinaryHeap::with_capacity(inputs.len());
        for (slot, input) in inputs.iter_mut().enumerate() {
            if let Some(sig) = input.reader.read_record()? {
                heap.push(Reverse((ShardedSignature::new(input.shard_id, sig), slot)));
            }
        }

        let mut last_hash: Option<u64> = None;
        while let Some(Reverse((entry, slot))) = heap.pop() {
            let sig = entry.signature;
            let input = &mut inputs[slot];
            stats.signatures_read += 1;

            if last_hash == Some(sig.hash_value) {
                input.writer.write(&DuplicateRecord::from(sig))?;
                stats.duplicates += 1;
            }
            last_hash = Some(sig.hash_value);

            if let Some(next) = input.reader.read_record()? {
                if next < sig {
                    return Err(DedupError::UnsortedInput {
                        path: input.reader.path().to_path_buf(),
                    });
                }
                heap.push(Reverse((ShardedSignature::new(input.shard_id, next), slot)));
            }
        }

        for input in inputs {
            if input.reader.truncated_bytes() > 0 {
                stats.truncated_files += 1;
            }
            let written = input.writer.finish()?;
            stats.duplicates_per_shard.insert(input.shard_id, written);
        }
        stats.elapsed_secs = start.elapsed().as_secs_f64();

        info!(
            shards = stats.shards,
            signatures = stats.signatures_read,
            duplicates = stats.duplicates,
            elapsed_secs = stats.elapsed_secs,
            "Duplicate search finished"
        );

        let mut stage_stats = StageStats::new("sentence_dedup_find");
        stage_stats.total = stats.signatures_read as usize;
        stage_stats.elapsed_secs = stats.elapsed_secs;
        self.stats.merge(&stage_stats);

        Ok(stats)
    }

    fn open_inputs(&self, files: &[PathBuf]) -> Result<Vec<ShardInput>> {
        let mut seen = BTreeMap::new();
        for path in files {
            let shard_id = parse_shard_index(path, SIGNATURE_EXTENSION).ok_or_else(|| {
                DedupError::InvalidShardFile { path: path.clone() }
            })?;
            if seen.insert(shard_id, path).is_some() {
                return Err(DedupError::InvalidShardFile { path: path.clone() });
            }
        }

        let mut inputs = Vec::with_capacity(seen.len());
        for (shard_id, path) in seen {
            debug!(shard_id, path = %path.display(), "Adding signature file");
            inputs.push(ShardInput {
                shard_id,
                reader: RecordReader::open(path)?,
                writer: RecordWriter::create(duplicate_path(&self.output_dir, shard_id))?,
            });
        }
        Ok(inputs)
    }

    /// Folder holding the duplicate files.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl PipelineStage for DuplicateFinder {
    fn name(&self) -> &str {
        "sentence_dedup_find"
    }

    /// Runs the merge when the stream is first polled. Must be run as a
    /// single task; upstream documents are ignored.
    fn process<'a>(
        &'a self,
        _input: Option<DocumentStream<'a>>,
        shard: Shard,
    ) -> shardsift_core::Result<DocumentStream<'a>> {
        if shard.count != 1 {
            return Err(SiftError::InvalidConfig(format!(
                "duplicate finder must run as a single task, got {shard}"
            )));
        }
        let run = std::iter::once_with(move || self.run());
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
    use crate::records::{read_duplicates, signature_path};
    use tempfile::TempDir;

    fn write_sigs(dir: &Path, shard: usize, sigs: &[HashSignature]) -> PathBuf {
        let path = signature_path(dir, shard);
        let mut writer = RecordWriter::create(&path).unwrap();
        for sig in sigs {
            writer.write(sig).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_first_occurrence_is_canonical() {
        let dir = TempDir::new().unwrap();
        let sigs = dir.path().join("sigs");
        let dups = dir.path().join("dups");

        write_sigs(
            &sigs,
            0,
            &[HashSignature::new(5, 3, 0), HashSignature::new(9, 0, 1)],
        );
        write_sigs(
            &sigs,
            1,
            &[
                HashSignature::new(5, 0, 0),
                HashSignature::new(5, 2, 4),
                HashSignature::new(7, 1, 0),
            ],
        );

        let stats = DuplicateFinder::new(&sigs, &dups).run().unwrap();
        assert_eq!(stats.signatures_read, 5);
        assert_eq!(stats.duplicates, 2);

        assert!(read_duplicates(duplicate_path(&dups, 0)).unwrap().is_empty());
        assert_eq!(
            read_duplicates(duplicate_path(&dups, 1)).unwrap(),
            vec![DuplicateRecord::new(0, 0), DuplicateRecord::new(2, 4)]
        );
    }

    #[test]
    fn test_same_shard_repeats_are_flagged() {
        let dir = TempDir::new().unwrap();
        write_sigs(
            dir.path(),
            0,
            &[HashSignature::new(1, 0, 0), HashSignature::new(1, 4, 2)],
        );

        DuplicateFinder::new(dir.path(), dir.path()).run().unwrap();
        assert_eq!(
            read_duplicates(duplicate_path(dir.path(), 0)).unwrap(),
            vec![DuplicateRecord::new(4, 2)]
        );
    }

    #[test]
    fn test_file_order_does_not_matter() {
        let dir = TempDir::new().unwrap();
        let a = write_sigs(dir.path(), 0, &[HashSignature::new(3, 8, 8)]);
        let b = write_sigs(dir.path(), 1, &[HashSignature::new(3, 0, 0)]);

        let out_fwd = dir.path().join("fwd");
        let out_rev = dir.path().join("rev");
        DuplicateFinder::new(dir.path(), &out_fwd)
            .run_files(&[a.clone(), b.clone()])
            .unwrap();
        DuplicateFinder::new(dir.path(), &out_rev)
            .run_files(&[b, a])
            .unwrap();

        for out in [&out_fwd, &out_rev] {
            assert!(read_duplicates(duplicate_path(out, 0)).unwrap().is_empty());
            assert_eq!(
                read_duplicates(duplicate_path(out, 1)).unwrap(),
                vec![DuplicateRecord::new(0, 0)]
            );
        }
    }

    #[test]
    fn test_unsorted_input_rejected() {
        let dir = TempDir::new().unwrap();
        write_sigs(
            dir.path(),
            0,
            &[HashSignature::new(9, 0, 0), HashSignature::new(1, 0, 1)],
        );
        let result = DuplicateFinder::new(dir.path(), dir.path()).run();
        assert!(matches!(result, Err(DedupError::UnsortedInput { .. })));
    }

    #[test]
    fn test_duplicate_shard_index_rejected() {
        let dir = TempDir::new().unwrap();
        let a = write_sigs(dir.path(), 0, &[]);
        let other = dir.path().join("copy");
        let b = write_sigs(&other, 0, &[]);

        let result = DuplicateFinder::new(dir.path(), dir.path()).run_files(&[a, b]);
        assert!(matches!(result, Err(DedupError::InvalidShardFile { .. })));
    }

    #[test]
    fn test_empty_signature_files() {
        let dir = TempDir::new().unwrap();
        write_sigs(dir.path(), 0, &[]);
        write_sigs(dir.path(), 1, &[]);

        let stats = DuplicateFinder::new(dir.path(), dir.path()).run().unwrap();
        assert_eq!(stats.shards, 2);
        assert_eq!(stats.duplicates, 0);
        assert!(duplicate_path(dir.path(), 1).exists());
    }

    #[test]
    fn test_partial_trailing_record_ends_file() {
        let dir = TempDir::new().unwrap();
        write_sigs(dir.path(), 0, &[HashSignature::new(5, 0, 0)]);
        let tail = write_sigs(dir.path(), 1, &[HashSignature::new(5, 2, 1)]);
        let mut bytes = std::fs::read(&tail).unwrap();
        bytes.extend_from_slice(&[0xAB, 0xCD, 0xEF]);
        std::fs::write(&tail, bytes).unwrap();

        let stats = DuplicateFinder::new(dir.path(), dir.path()).run().unwrap();
        assert_eq!(stats.signatures_read, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.truncated_files, 1);
        assert_eq!(
            read_duplicates(duplicate_path(dir.path(), 1)).unwrap(),
            vec![DuplicateRecord::new(2, 1)]
        );
    }

    #[test]
    fn test_requires_single_task() {
        let finder = DuplicateFinder::new("sigs", "dups");
        assert!(finder.process(None, Shard::new(0, 2).unwrap()).is_err());
    }
}
