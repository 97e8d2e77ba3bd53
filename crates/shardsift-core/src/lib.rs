//! # shardsift-core
//!
//! Shared building blocks for shardsift document pipelines.
//!
//! Provides:
//! - The [`Document`] model and [`Shard`] addressing
//! - The [`PipelineStage`] abstraction and a sequential [`Pipeline`]
//! - Sharded JSONL reading and writing (plain or zstd)
//! - Canonical sentence and word segmentation
//! - Hashing (xxh3) and a rayon-backed [`LocalExecutor`]

pub mod document;
pub mod error;
pub mod executor;
pub mod hashing;
pub mod io;
pub mod pipeline;
pub mod text;

pub use document::{Document, Shard, FILE_PATH_KEY, FILTER_REASON_KEY};
pub use error::{Result, SiftError};
pub use executor::LocalExecutor;
pub use hashing::{HashFunction, XxHash3};
pub use io::{Compression, JsonlReader, JsonlWriter, ReaderConfig};
pub use pipeline::{DocumentStream, Pipeline, PipelineStage, StageStats, StatsCollector};
