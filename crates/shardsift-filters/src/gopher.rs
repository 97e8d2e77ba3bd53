//! Gopher quality heuristics.
//!
//! Rules are evaluated in a fixed order and the first one that fires names
//! the rejection:
//!
//! 1. `gopher_short_doc` / `gopher_long_doc`: non-symbol word count outside
//!    `[min_doc_words, max_doc_words]`
//! 2. `gopher_below_avg_threshold` / `gopher_above_avg_threshold`: mean
//!    non-symbol word length outside `[min_avg_word_length, max_avg_word_length]`
//! 3. `gopher_too_many_hashes` / `gopher_too_many_ellipsis`: `#` or ellipsis
//!    count per word above `max_symbol_word_ratio`
//! 4. `gopher_too_many_bullets` / `gopher_too_many_end_ellipsis`: share of
//!    lines starting with a bullet or ending with an ellipsis
//! 5. `gopher_below_alpha_threshold`: share of words with an alphabetic char
//! 6. `gopher_enough_stop_words`: too few stop words

use crate::base::{DocumentFilter, FilterVerdict};
use crate::error::{FilterError, Result};
use crate::language::Language;
use serde::{Deserialize, Serialize};
use shardsift_core::text::{char_len, fraction, is_symbol_word, word_tokenize};
use shardsift_core::Document;
use std::collections::HashSet;

/// Thresholds for [`GopherQualityFilter`]. `None` disables a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GopherQualityConfig {
    pub min_doc_words: Option<usize>,
    pub max_doc_words: Option<usize>,
    pub min_avg_word_length: Option<f64>,
    pub max_avg_word_length: Option<f64>,
    pub max_symbol_word_ratio: Option<f64>,
    pub max_bullet_lines_ratio: Option<f64>,
    pub max_ellipsis_lines_ratio: Option<f64>,
    /// Minimum share of words containing an alphabetic character.
    pub max_non_alpha_words_ratio: Option<f64>,
    pub min_stop_words: Option<usize>,
    /// Overrides the language's default stop words.
    pub stop_words: Option<Vec<String>>,
}

impl Default for GopherQualityConfig {
    fn default() -> Self {
        Self {
            min_doc_words: Some(50),
            max_doc_words: Some(100_000),
            min_avg_word_length: Some(3.0),
            max_avg_word_length: Some(10.0),
            max_symbol_word_ratio: Some(0.1),
            max_bullet_lines_ratio: Some(0.9),
            max_ellipsis_lines_ratio: Some(0.3),
            max_non_alpha_words_ratio: Some(0.8),
            min_stop_words: Some(2),
            stop_words: None,
        }
    }
}

impl GopherQualityConfig {
    /// Set the word count range.
    #[must_use]
    pub fn with_doc_words(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_doc_words = min;
        self.max_doc_words = max;
        self
    }

    /// Set the mean word length range.
    #[must_use]
    pub fn with_avg_word_length(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_avg_word_length = min;
        self.max_avg_word_length = max;
        self
    }

    /// Set the hash / ellipsis per word threshold.
    #[must_use]
    pub fn with_max_symbol_word_ratio(mut self, ratio: Option<f64>) -> Self {
        self.max_symbol_word_ratio = ratio;
        self
    }

    /// Set the minimum number of stop words.
    #[must_use]
    pub fn with_min_stop_words(mut self, min: Option<usize>) -> Self {
        self.min_stop_words = min;
        self
    }

    /// Use an explicit stop-word list.
    #[must_use]
    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_words = Some(words.into_iter().map(Into::into).collect());
        self
    }

    fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_doc_words, self.max_doc_words) {
            if min > max {
                return Err(FilterError::InvalidConfig(format!(
                    "min_doc_words ({min}) > max_doc_words ({max})"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_avg_word_length, self.max_avg_word_length) {
            if min > max {
                return Err(FilterError::InvalidConfig(format!(
                    "min_avg_word_length ({min}) > max_avg_word_length ({max})"
                )));
            }
        }
        Ok(())
    }
}

/// Gopher document quality filter.
#[derive(Debug, Clone)]
pub struct GopherQualityFilter {
    config: GopherQualityConfig,
    stop_words: HashSet<String>,
}

impl GopherQualityFilter {
    /// Build the filter for `language`, validating `config`.
    pub fn new(config: GopherQualityConfig, language: Language) -> Result<Self> {
        config.validate()?;
        let stop_words = match &config.stop_words {
            Some(words) => words.iter().cloned().collect(),
            None => language.stop_word_set(),
        };
        Ok(Self { config, stop_words })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GopherQualityConfig {
        &self.config
    }
}

impl DocumentFilter for GopherQualityFilter {
    fn name(&self) -> &str {
        "gopher_quality"
    }

    fn filter(&self, doc: &Document) -> FilterVerdict {
        let config = &self.config;
        let text = doc.text.as_str();
        let words = word_tokenize(text);
        let n_words = words.len();

        let non_symbol_words: Vec<&str> =
            words.iter().copied().filter(|w| !is_symbol_word(w)).collect();
        let n_non_symbol = non_symbol_words.len();

        if config.min_doc_words.is_some_and(|min| n_non_symbol < min) {
            return FilterVerdict::drop("gopher_short_doc");
        }
        if config.max_doc_words.is_some_and(|max| n_non_symbol > max) {
            return FilterVerdict::drop("gopher_long_doc");
        }

        let total_len: usize = non_symbol_words.iter().map(|w| char_len(w)).sum();
        if let Some(avg) = fraction(total_len, n_non_symbol) {
            if config.min_avg_word_length.is_some_and(|min| avg < min) {
                return FilterVerdict::drop("gopher_below_avg_threshold");
            }
            if config.max_avg_word_length.is_some_and(|max| avg > max) {
                return FilterVerdict::drop("gopher_above_avg_threshold");
            }
        }

        if let Some(max) = config.max_symbol_word_ratio {
            let hashes = text.matches('#').count();
            if fraction(hashes, n_words).is_some_and(|r| r > max) {
                return FilterVerdict::drop("gopher_too_many_hashes");
            }
            let ellipsis = text.matches("...").count() + text.matches('…').count();
            if fraction(ellipsis, n_words).is_some_and(|r| r > max) {
                return FilterVerdict::drop("gopher_too_many_ellipsis");
            }
        }

        let lines: Vec<&str> = text.lines().collect();
        if let Some(max) = config.max_bullet_lines_ratio {
            let bullets = lines
                .iter()
                .filter(|l| {
                    let l = l.trim_start();
                    l.starts_with('•') || l.starts_with('-')
                })
                .count();
            if fraction(bullets, lines.len()).is_some_and(|r| r > max) {
                return FilterVerdict::drop("gopher_too_many_bullets");
            }
        }
        if let Some(max) = config.max_ellipsis_lines_ratio {
            let ellipsis_lines = lines
                .iter()
                .filter(|l| {
                    let l = l.trim_end();
                    l.ends_with("...") || l.ends_with('…')
                })
                .count();
            if fraction(ellipsis_lines, lines.len()).is_some_and(|r| r > max) {
                return FilterVerdict::drop("gopher_too_many_end_ellipsis");
            }
        }

        if let Some(min) = config.max_non_alpha_words_ratio {
            let alpha = words
                .iter()
                .filter(|w| w.chars().any(char::is_alphabetic))
                .count();
            // no words at all cannot meet a minimum share
            if fraction(alpha, n_words).map_or(true, |r| r < min) {
                return FilterVerdict::drop("gopher_below_alpha_threshold");
            }
        }

        if let Some(min) = config.min_stop_words {
            let stop = words
                .iter()
                .filter(|w| self.stop_words.contains(**w))
                .count();
            if stop < min {
                return FilterVerdict::drop("gopher_enough_stop_words");
            }
        }

        FilterVerdict::Keep
    }
}
