//! # shardsift-filters
//!
//! Heuristic quality filters for web-text corpora.
//!
//! - [`GopherRepetitionFilter`]: repeated paragraphs, lines and n-grams
//! - [`GopherQualityFilter`]: word counts, symbol ratios, stop words
//! - [`FineWebQualityFilter`]: line punctuation, short lines, list-like text
//!
//! Each filter is a [`DocumentFilter`]; wrap it in a [`FilterStage`] to use it
//! inside a [`shardsift_core::Pipeline`].
//!
//! ```rust,no_run
//! use shardsift_core::{JsonlReader, JsonlWriter, Pipeline, Shard};
//! use shardsift_filters::{FilterStage, GopherQualityConfig, GopherQualityFilter, Language};
//!
//! let gopher = GopherQualityFilter::new(GopherQualityConfig::default(), Language::English)?;
//! let pipeline = Pipeline::new()
//!     .with_stage(JsonlReader::new("data/raw"))
//!     .with_stage(FilterStage::new(gopher).with_exclusion_writer(JsonlWriter::new("data/removed")))
//!     .with_stage(JsonlWriter::new("data/clean"));
//! pipeline.run(Shard::single())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod base;
pub mod config;
pub mod error;
pub mod fineweb;
pub mod gopher;
pub mod language;
pub mod repetition;
pub mod stats;

pub use base::{DocumentFilter, FilterStage, FilterVerdict};
pub use config::FilterPipelineConfig;
pub use error::{FilterError, Result};
pub use fineweb::{FineWebQualityConfig, FineWebQualityFilter};
pub use gopher::{GopherQualityConfig, GopherQualityFilter};
pub use language::Language;
pub use repetition::{GopherRepetitionConfig, GopherRepetitionFilter};
pub use stats::{DocLengthStats, LengthSummary};
