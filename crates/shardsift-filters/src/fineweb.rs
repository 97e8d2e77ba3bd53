//! FineWeb line-structure heuristics.

use crate::base::{DocumentFilter, FilterVerdict};
use crate::error::{FilterError, Result};
use crate::repetition::find_duplicates;
use serde::{Deserialize, Serialize};
use shardsift_core::text::{char_len, fraction, word_tokenize};
use shardsift_core::Document;

/// Characters that count as terminal punctuation at the end of a line.
const STOP_CHARS: [char; 5] = ['.', '\'', '"', '!', '?'];

/// Thresholds for [`FineWebQualityFilter`]. `None` disables a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FineWebQualityConfig {
    /// Reject when the share of punctuated lines is at or below this.
    pub line_punct_thr: Option<f64>,
    /// Do not reject documents with no punctuated line at all.
    pub line_punct_exclude_zero: bool,
    /// Reject when the share of short lines is at or above this.
    pub short_line_thr: Option<f64>,
    /// Lines of at most this many characters are short.
    pub short_line_length: usize,
    pub char_duplicates_ratio: Option<f64>,
    /// Maximum newlines per word.
    pub new_line_ratio: Option<f64>,
}

impl Default for FineWebQualityConfig {
    fn default() -> Self {
        Self {
            line_punct_thr: Some(0.12),
            line_punct_exclude_zero: false,
            short_line_thr: Some(0.67),
            short_line_length: 30,
            char_duplicates_ratio: Some(0.01),
            new_line_ratio: Some(0.3),
        }
    }
}

impl FineWebQualityConfig {
    /// Set the punctuated line threshold.
    #[must_use]
    pub fn with_line_punct_thr(mut self, thr: Option<f64>) -> Self {
        self.line_punct_thr = thr;
        self
    }

    /// Let documents without any punctuated line through the punctuation rule.
    #[must_use]
    pub fn with_line_punct_exclude_zero(mut self, exclude: bool) -> Self {
        self.line_punct_exclude_zero = exclude;
        self
    }

    /// Set the short line rule.
    #[must_use]
    pub fn with_short_lines(mut self, thr: Option<f64>, length: usize) -> Self {
        self.short_line_thr = thr;
        self.short_line_length = length;
        self
    }

    /// Set the duplicate line character ratio.
    #[must_use]
    pub fn with_char_duplicates_ratio(mut self, ratio: Option<f64>) -> Self {
        self.char_duplicates_ratio = ratio;
        self
    }

    /// Set the newline per word ratio.
    #[must_use]
    pub fn with_new_line_ratio(mut self, ratio: Option<f64>) -> Self {
        self.new_line_ratio = ratio;
        self
    }
}

/// FineWeb document quality filter.
#[derive(Debug, Clone)]
pub struct FineWebQualityFilter {
    config: FineWebQualityConfig,
}

impl FineWebQualityFilter {
    /// Build the filter, validating `config`.
    pub fn new(config: FineWebQualityConfig) -> Result<Self> {
        let ratios = [
            config.line_punct_thr,
            config.short_line_thr,
            config.char_duplicates_ratio,
            config.new_line_ratio,
        ];
        if ratios.iter().flatten().any(|r| r.is_nan() || *r < 0.0) {
            return Err(FilterError::InvalidConfig(
                "FineWeb thresholds must be non-negative numbers".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &FineWebQualityConfig {
        &self.config
    }
}

impl DocumentFilter for FineWebQualityFilter {
    fn name(&self) -> &str {
        "fineweb_quality"
    }

    fn filter(&self, doc: &Document) -> FilterVerdict {
        let config = &self.config;
        let text = doc.text.as_str();
        let lines: Vec<&str> = text.split('\n').collect();

        if let Some(thr) = config.line_punct_thr {
            let punctuated = lines.iter().filter(|l| l.ends_with(STOP_CHARS)).count();
            if let Some(ratio) = fraction(punctuated, lines.len()) {
                if ratio <= thr && !(ratio == 0.0 && config.line_punct_exclude_zero) {
                    return FilterVerdict::drop("line_punct_ratio");
                }
            }
        }

        if let Some(thr) = config.short_line_thr {
            let short = lines
                .iter()
                .filter(|l| char_len(l) <= config.short_line_length)
                .count();
            if fraction(short, lines.len()).is_some_and(|r| r >= thr) {
                return FilterVerdict::drop("short_line_ratio");
            }
        }

        if let Some(thr) = config.char_duplicates_ratio {
            let non_empty = lines.iter().copied().filter(|l| !l.trim().is_empty());
            let (_, dup_chars) = find_duplicates(non_empty);
            let chars = text.chars().filter(|c| *c != '\n').count();
            if fraction(dup_chars, chars).is_some_and(|r| r >= thr) {
                return FilterVerdict::drop("char_dup_ratio");
            }
        }

        if let Some(thr) = config.new_line_ratio {
            let newlines = text.matches('\n').count();
            let words = word_tokenize(text).len();
            let too_many = match fraction(newlines, words) {
                Some(ratio) => ratio > thr,
                None => newlines > 0,
            };
            if too_many {
                return FilterVerdict::drop("list_ratio");
            }
        }

        FilterVerdict::Keep
    }
}
