//! # shardsift-dedup
//!
//! Sentence-window deduplication over sharded document sets, in three stages:
//!
//! 1. [`SignatureStage`]: per shard, hash every window of `n` consecutive
//!    sentences and write a sorted `<shard:05>.sig` file.
//! 2. [`DuplicateFinder`]: merge every signature file once and write, per
//!    shard, the windows that are not the first occurrence of their hash.
//! 3. [`DuplicateFilterStage`]: per shard, remove the flagged sentences and
//!    drop documents that become too short.
//!
//! Stages 1 and 3 run independently per shard; stage 2 needs every stage 1
//! output. [`DedupJob`] runs all three locally.
//!
//! ```rust,no_run
//! use shardsift_dedup::DedupJob;
//!
//! let report = DedupJob::new("data/clean", "data/dedup", "data/work")
//!     .with_tasks(8)
//!     .run()?;
//! println!("{} duplicate windows", report.finder.duplicates);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod filter;
pub mod finder;
pub mod records;
pub mod runner;
pub mod signature;

pub use error::{DedupError, Result};
pub use filter::{DropPolicy, DuplicateFilterConfig, DuplicateFilterStage, DuplicateIndex};
pub use finder::{DuplicateFinder, FinderStats};
pub use records::{DuplicateRecord, HashSignature, RecordReader, RecordWriter, ShardedSignature};
pub use runner::{DedupJob, DedupReport, FilterReport};
pub use signature::{SignatureConfig, SignatureGenerator, SignatureStage, SignatureStats};
