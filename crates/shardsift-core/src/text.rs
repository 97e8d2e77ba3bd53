//! Canonical text segmentation shared by every stage.
//!
//! Sentence boundaries decide which `sentence_id` a dedup signature refers to,
//! so the signature stage and the duplicate filter must both call
//! [`split_sentences`]. Any other splitter breaks the alignment silently.

use unicode_segmentation::UnicodeSegmentation;

/// Split text into sentences on Unicode (UAX #29) sentence boundaries.
///
/// Each sentence is trimmed; segments that are whitespace only are dropped.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split text into word tokens on Unicode word boundaries.
///
/// Punctuation is kept as separate tokens; whitespace is discarded.
#[must_use]
pub fn word_tokenize(text: &str) -> Vec<&str> {
    text.split_word_bounds()
        .filter(|w| !w.trim().is_empty())
        .collect()
}

/// Normalize a sentence for hashing.
///
/// Lowercases, removes every character that is neither alphanumeric nor
/// whitespace, and collapses whitespace runs to a single space.
#[must_use]
pub fn normalize_sentence(sentence: &str) -> String {
    let mut out = String::with_capacity(sentence.len());
    let mut pending_space = false;

    for ch in sentence.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else if ch.is_alphanumeric() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }

    out
}

/// Length in Unicode scalar values.
#[inline]
#[must_use]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// True if the token has no alphanumeric character (punctuation, symbols).
#[must_use]
pub fn is_symbol_word(word: &str) -> bool {
    !word.chars().any(char::is_alphanumeric)
}

/// `numerator / denominator`, or `None` when the denominator is zero.
#[inline]
#[must_use]
pub fn fraction(numerator: usize, denominator: usize) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}
