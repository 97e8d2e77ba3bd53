//! Filter chain configuration.
//!
//! ```json
//! {
//!   "language": "english",
//!   "gopher_quality": { "min_doc_words": 80 },
//!   "fineweb": null,
//!   "exclusion_dir": "data/removed"
//! }
//! ```
//!
//! Omitted sections keep their defaults; `null` disables a filter.

use crate::base::FilterStage;
use crate::error::Result;
use crate::fineweb::{FineWebQualityConfig, FineWebQualityFilter};
use crate::gopher::{GopherQualityConfig, GopherQualityFilter};
use crate::language::Language;
use crate::repetition::{GopherRepetitionConfig, GopherRepetitionFilter};
use crate::stats::DocLengthStats;
use serde::{Deserialize, Serialize};
use shardsift_core::{Compression, JsonlWriter, PipelineStage};
use std::path::{Path, PathBuf};

/// Which filters run, with what thresholds, and where rejects go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPipelineConfig {
    pub language: Language,
    pub gopher_repetition: Option<GopherRepetitionConfig>,
    pub gopher_quality: Option<GopherQualityConfig>,
    pub fineweb: Option<FineWebQualityConfig>,
    /// Insert a [`DocLengthStats`] stage before the filters.
    pub doc_length_stats: bool,
    /// Rejected documents go to `<exclusion_dir>/<filter name>/`.
    pub exclusion_dir: Option<PathBuf>,
    pub exclusion_compression: Compression,
}

impl Default for FilterPipelineConfig {
    fn default() -> Self {
        Self {
            language: Language::English,
            gopher_repetition: Some(GopherRepetitionConfig::default()),
            gopher_quality: Some(GopherQualityConfig::default()),
            fineweb: Some(FineWebQualityConfig::default()),
            doc_length_stats: false,
            exclusion_dir: None,
            exclusion_compression: Compression::None,
        }
    }
}

impl FilterPipelineConfig {
    /// Load from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Set the language.
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Send rejected documents to per-filter folders under `dir`.
    #[must_use]
    pub fn with_exclusion_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exclusion_dir = Some(dir.into());
        self
    }

    /// Enable the length statistics stage.
    #[must_use]
    pub fn with_doc_length_stats(mut self, enabled: bool) -> Self {
        self.doc_length_stats = enabled;
        self
    }

    fn wrap<F>(&self, filter: F) -> Box<dyn PipelineStage>
    where
        F: crate::base::DocumentFilter + 'static,
    {
        let mut stage = FilterStage::new(filter);
        if let Some(dir) = &self.exclusion_dir {
            let folder = dir.join(stage.filter().name());
            stage = stage.with_exclusion_writer(
                JsonlWriter::new(folder).with_compression(self.exclusion_compression),
            );
        }
        Box::new(stage)
    }

    /// Instantiate the configured stages in evaluation order.
    pub fn build_stages(&self) -> Result<Vec<Box<dyn PipelineStage>>> {
        let mut stages: Vec<Box<dyn PipelineStage>> = Vec::new();

        if self.doc_length_stats {
            stages.push(Box::new(DocLengthStats::new()));
        }
        if let Some(config) = &self.gopher_repetition {
            stages.push(self.wrap(GopherRepetitionFilter::new(config.clone())?));
        }
        if let Some(config) = &self.gopher_quality {
            stages.push(self.wrap(GopherQualityFilter::new(config.clone(), self.language)?));
        }
        if let Some(config) = &self.fineweb {
            stages.push(self.wrap(FineWebQualityFilter::new(config.clone())?));
        }

        Ok(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_builds_three_filters() {
        let stages = FilterPipelineConfig::default().build_stages().unwrap();
        let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["gopher_repetition", "gopher_quality", "fineweb_quality"]);
    }

    #[test]
    fn test_from_json_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"language": "russian", "gopher_quality": {{"min_doc_words": 80}}, "fineweb": null}}"#
        )
        .unwrap();

        let config = FilterPipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.language, Language::Russian);
        assert!(config.fineweb.is_none());
        assert!(config.gopher_repetition.is_some());

        let quality = config.gopher_quality.as_ref().unwrap();
        assert_eq!(quality.min_doc_words, Some(80));
        assert_eq!(quality.max_doc_words, Some(100_000));

        assert_eq!(config.build_stages().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        assert!(FilterPipelineConfig::from_json_file(file.path()).is_err());
    }

    #[test]
    fn test_doc_length_stage_first() {
        let config = FilterPipelineConfig::default().with_doc_length_stats(true);
        let stages = config.build_stages().unwrap();
        assert_eq!(stages[0].name(), "doc_length");
    }
}
