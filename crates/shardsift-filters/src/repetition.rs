//! Gopher repetition heuristics (Rae et al. 2021, table A1).
//!
//! Rules, in evaluation order:
//!
//! | Reason | Measure | Default |
//! |---|---|---|
//! | `dup_para_frac` | duplicate paragraphs / paragraphs | 0.30 |
//! | `dup_para_char_frac` | chars in duplicate paragraphs / text chars | 0.20 |
//! | `dup_line_frac` | duplicate lines / lines | 0.30 |
//! | `dup_line_char_frac` | chars in duplicate lines / text chars | 0.20 |
//! | `top_{n}_gram` | chars of the most frequent n-gram × count / text chars, n = 2..4 | 0.20, 0.18, 0.16 |
//! | `duplicated_{n}_n_grams` | greedy duplicate n-gram chars / text chars, n = 5..10 | 0.15 .. 0.10 |

use crate::base::{DocumentFilter, FilterVerdict};
use crate::error::{FilterError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use shardsift_core::text::{char_len, fraction, word_tokenize};
use shardsift_core::Document;
use std::collections::{HashMap, HashSet};

/// Thresholds for [`GopherRepetitionFilter`]. `None` disables a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GopherRepetitionConfig {
    pub dup_line_frac: Option<f64>,
    pub dup_para_frac: Option<f64>,
    pub dup_line_char_frac: Option<f64>,
    pub dup_para_char_frac: Option<f64>,
    /// `(n, max fraction)` pairs for the most frequent n-gram.
    pub top_n_grams: Vec<(usize, f64)>,
    /// `(n, max fraction)` pairs for the greedy duplicate scan.
    pub dup_n_grams: Vec<(usize, f64)>,
}

impl Default for GopherRepetitionConfig {
    fn default() -> Self {
        Self {
            dup_line_frac: Some(0.3),
            dup_para_frac: Some(0.3),
            dup_line_char_frac: Some(0.2),
            dup_para_char_frac: Some(0.2),
            top_n_grams: vec![(2, 0.2), (3, 0.18), (4, 0.16)],
            dup_n_grams: vec![
                (5, 0.15),
                (6, 0.14),
                (7, 0.13),
                (8, 0.12),
                (9, 0.11),
                (10, 0.10),
            ],
        }
    }
}

impl GopherRepetitionConfig {
    /// Set the duplicate line fraction threshold.
    #[must_use]
    pub fn with_dup_line_frac(mut self, frac: Option<f64>) -> Self {
        self.dup_line_frac = frac;
        self
    }

    /// Set the duplicate paragraph fraction threshold.
    #[must_use]
    pub fn with_dup_para_frac(mut self, frac: Option<f64>) -> Self {
        self.dup_para_frac = frac;
        self
    }

    /// Set the duplicate line character fraction threshold.
    #[must_use]
    pub fn with_dup_line_char_frac(mut self, frac: Option<f64>) -> Self {
        self.dup_line_char_frac = frac;
        self
    }

    /// Set the duplicate paragraph character fraction threshold.
    #[must_use]
    pub fn with_dup_para_char_frac(mut self, frac: Option<f64>) -> Self {
        self.dup_para_char_frac = frac;
        self
    }

    /// Replace the top n-gram rules.
    #[must_use]
    pub fn with_top_n_grams(mut self, rules: Vec<(usize, f64)>) -> Self {
        self.top_n_grams = rules;
        self
    }

    /// Replace the duplicate n-gram rules.
    #[must_use]
    pub fn with_dup_n_grams(mut self, rules: Vec<(usize, f64)>) -> Self {
        self.dup_n_grams = rules;
        self
    }

    fn validate(&self) -> Result<()> {
        let zero_n = self
            .top_n_grams
            .iter()
            .chain(&self.dup_n_grams)
            .any(|(n, _)| *n == 0);
        if zero_n {
            return Err(FilterError::InvalidConfig(
                "n-gram size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Count the repeated elements of `items` and their total character length.
///
/// The first occurrence of an element is not a duplicate.
pub fn find_duplicates<'a, I>(items: I) -> (usize, usize)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut duplicate_elements = 0;
    let mut duplicate_chars = 0;

    for item in items {
        if !seen.insert(item) {
            duplicate_elements += 1;
            duplicate_chars += char_len(item);
        }
    }

    (duplicate_elements, duplicate_chars)
}

/// Space-joined word n-grams.
fn n_grams(words: &[&str], n: usize) -> Vec<String> {
    words.windows(n).map(|w| w.join(" ")).collect()
}

/// Character length of the most frequent n-gram times its count.
///
/// Among equally frequent n-grams the one seen first wins.
fn top_duplicate_chars(grams: &[String]) -> usize {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for gram in grams {
        *counts.entry(gram.as_str()).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for gram in grams {
        let count = counts[gram.as_str()];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((gram, count));
        }
    }

    best.map_or(0, |(gram, count)| char_len(gram) * count)
}

/// Greedy non-overlapping duplicate scan.
///
/// Walks the word sequence; on an n-gram already seen, its characters are
/// counted and the scan jumps past it, otherwise it advances by one word.
/// N-grams are compared with their words concatenated without separator.
fn all_duplicate_chars(words: &[&str], n: usize) -> usize {
    let mut seen = HashSet::new();
    let mut repeated = 0;
    let mut idx = 0;

    while idx + n <= words.len() {
        let gram = words[idx..idx + n].concat();
        if seen.contains(&gram) {
            repeated += char_len(&gram);
            idx += n;
        } else {
            seen.insert(gram);
            idx += 1;
        }
    }

    repeated
}

fn exceeds(numerator: usize, denominator: usize, threshold: Option<f64>) -> bool {
    match (threshold, fraction(numerator, denominator)) {
        (Some(max), Some(ratio)) => ratio > max,
        _ => false,
    }
}

/// Rejects documents dominated by repeated paragraphs, lines or n-grams.
#[derive(Debug, Clone)]
pub struct GopherRepetitionFilter {
    config: GopherRepetitionConfig,
    paragraph_re: Regex,
    line_re: Regex,
}

impl GopherRepetitionFilter {
    /// Build the filter, validating `config`.
    pub fn new(config: GopherRepetitionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            paragraph_re: Regex::new(r"\n{2,}")?,
            line_re: Regex::new(r"\n+")?,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GopherRepetitionConfig {
        &self.config
    }
}

impl DocumentFilter for GopherRepetitionFilter {
    fn name(&self) -> &str {
        "gopher_repetition"
    }

    fn filter(&self, doc: &Document) -> FilterVerdict {
        let text = doc.text.as_str();
        let text_len = char_len(text);
        if text_len == 0 {
            return FilterVerdict::Keep;
        }

        let paragraphs: Vec<&str> = self.paragraph_re.split(text.trim()).collect();
        let (para_dups, para_chars) = find_duplicates(paragraphs.iter().copied());
        if exceeds(para_dups, paragraphs.len(), self.config.dup_para_frac) {
            return FilterVerdict::drop("dup_para_frac");
        }
        if exceeds(para_chars, text_len, self.config.dup_para_char_frac) {
            return FilterVerdict::drop("dup_para_char_frac");
        }

        let lines: Vec<&str> = self.line_re.split(text).collect();
        let (line_dups, line_chars) = find_duplicates(lines.iter().copied());
        if exceeds(line_dups, lines.len(), self.config.dup_line_frac) {
            return FilterVerdict::drop("dup_line_frac");
        }
        if exceeds(line_chars, text_len, self.config.dup_line_char_frac) {
            return FilterVerdict::drop("dup_line_char_frac");
        }

        let words = word_tokenize(text);

        for &(n, max_frac) in &self.config.top_n_grams {
            let grams = n_grams(&words, n);
            if grams.is_empty() {
                continue;
            }
            if exceeds(top_duplicate_chars(&grams), text_len, Some(max_frac)) {
                return FilterVerdict::drop_owned(format!("top_{n}_gram"));
            }
        }

        for &(n, max_frac) in &self.config.dup_n_grams {
            if exceeds(all_duplicate_chars(&words, n), text_len, Some(max_frac)) {
                return FilterVerdict::drop_owned(format!("duplicated_{n}_n_grams"));
            }
        }

        FilterVerdict::Keep
    }
}
