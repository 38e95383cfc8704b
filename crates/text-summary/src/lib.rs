//! Text summarization module
//!
//! Extractive summarizer: sentences are scored by the frequency of their
//! significant words across the document, the best ones are kept in their
//! original order. No model involved; this module exists for text payloads
//! and as the long-process reference implementation (large documents are
//! scored chunk by chunk under a cooperative cancellation flag).

pub mod handler;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Summarization errors
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("no sentences found in input")]
    EmptyInput,
}

/// Configuration for the summarizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Maximum number of sentences in the summary
    pub max_sentences: usize,
    /// Sentences scored per iteration of the long-process loop
    pub chunk_sentences: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_sentences: 3,
            chunk_sentences: 50,
        }
    }
}

/// A produced summary with its bookkeeping counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    /// Sentences in the input document
    pub input_sentences: usize,
    /// Sentences kept in the summary
    pub summary_sentences: usize,
}

/// Frequency-based extractive summarizer
#[derive(Debug, Clone, Default)]
pub struct Summarizer {
    config: SummaryConfig,
}

impl Summarizer {
    #[must_use]
    pub fn new(config: SummaryConfig) -> Self {
        Self { config }
    }

    /// Summarize `text` down to at most `max_sentences` sentences
    pub fn summarize(&self, text: &str) -> Result<Summary, SummaryError> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Err(SummaryError::EmptyInput);
        }

        let frequencies = word_frequencies(text);
        let scored: Vec<(usize, f32)> = sentences
            .iter()
            .enumerate()
            .map(|(index, sentence)| (index, sentence_score(sentence, &frequencies)))
            .collect();

        let summary = select_top(&sentences, &scored, self.config.max_sentences);
        debug!(
            "Summarized {} sentences down to {}",
            sentences.len(),
            summary.summary_sentences
        );
        Ok(summary)
    }

    #[must_use]
    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }
}

/// Split text into sentences on `.`, `!` and `?` followed by whitespace.
///
/// Deliberately simple: decimals ("3.14") survive because the terminator is
/// not followed by whitespace; abbreviations do not, which is acceptable
/// for scoring purposes.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?')
            && chars.peek().map_or(true, |next| next.is_whitespace())
        {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Frequency of each significant word, normalized so the most frequent
/// word scores 1.0
#[must_use]
pub fn word_frequencies(text: &str) -> HashMap<String, f32> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for word in significant_words(text) {
        *counts.entry(word).or_insert(0) += 1;
    }

    let max = counts.values().copied().max().unwrap_or(1) as f32;
    counts
        .into_iter()
        .map(|(word, count)| (word, count as f32 / max))
        .collect()
}

/// Average normalized frequency of the sentence's significant words
#[must_use]
pub fn sentence_score(sentence: &str, frequencies: &HashMap<String, f32>) -> f32 {
    let mut total = 0.0_f32;
    let mut words = 0_u32;
    for word in significant_words(sentence) {
        total += frequencies.get(&word).copied().unwrap_or(0.0);
        words += 1;
    }

    if words == 0 {
        0.0
    } else {
        total / words as f32
    }
}

/// Keep the best-scoring sentences, reassembled in document order
#[must_use]
pub fn select_top(sentences: &[String], scored: &[(usize, f32)], max_sentences: usize) -> Summary {
    let mut ranked: Vec<(usize, f32)> = scored.to_vec();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(max_sentences.max(1));

    let mut keep: Vec<usize> = ranked.into_iter().map(|(index, _)| index).collect();
    keep.sort_unstable();

    let summary = keep
        .iter()
        .filter_map(|&index| sentences.get(index).map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    Summary {
        summary,
        input_sentences: sentences.len(),
        summary_sentences: keep.len(),
    }
}

fn significant_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(&word.as_str()))
}

/// English stop words ignored by the scorer
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "of", "in", "on", "at", "to", "for",
    "with", "by", "from", "as", "is", "are", "was", "were", "be", "been", "being", "it", "its",
    "this", "that", "these", "those", "he", "she", "they", "them", "his", "her", "their", "we",
    "us", "our", "you", "your", "i", "me", "my", "not", "no", "do", "does", "did", "will",
    "would", "can", "could", "has", "have", "had", "so", "than", "too", "very", "just", "about",
    "into", "over", "after", "before", "between", "out", "up", "down", "off", "again", "there",
    "here", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more", "most",
    "other", "some", "such", "only", "own", "same", "what", "which", "who", "whom",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("Hello world. Second sentence! Third one?");
        assert_eq!(
            sentences,
            vec!["Hello world.", "Second sentence!", "Third one?"]
        );
    }

    #[test]
    fn test_split_keeps_decimals_together() {
        let sentences = split_sentences("Pi is 3.14 roughly. Euler's number is 2.72");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0], "Pi is 3.14 roughly.");
    }

    #[test]
    fn test_split_without_terminator() {
        let sentences = split_sentences("no punctuation here");
        assert_eq!(sentences, vec!["no punctuation here"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_word_frequencies_skip_stop_words() {
        let frequencies = word_frequencies("The cat and the cat and the dog");
        assert!(!frequencies.contains_key("the"));
        assert!(!frequencies.contains_key("and"));
        assert_eq!(frequencies["cat"], 1.0);
        assert_eq!(frequencies["dog"], 0.5);
    }

    #[test]
    fn test_keyword_rich_sentence_wins() {
        let text = "Rust compiles fast. Rust programs are reliable and Rust tooling helps. \
                    Lunch was fine.";
        let summarizer = Summarizer::new(SummaryConfig {
            max_sentences: 1,
            ..Default::default()
        });

        let summary = summarizer.summarize(text).unwrap();
        assert_eq!(summary.input_sentences, 3);
        assert_eq!(summary.summary_sentences, 1);
        assert!(summary.summary.contains("Rust"));
        assert!(!summary.summary.contains("Lunch"));
    }

    #[test]
    fn test_summary_preserves_document_order() {
        let text = "Alpha beta gamma. Irrelevant filler words only. Alpha beta delta.";
        let summarizer = Summarizer::new(SummaryConfig {
            max_sentences: 2,
            ..Default::default()
        });

        let summary = summarizer.summarize(text).unwrap();
        // Both keyword sentences survive, first one first
        let first = summary.summary.find("gamma").unwrap();
        let second = summary.summary.find("delta").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_empty_input() {
        let summarizer = Summarizer::default();
        assert!(matches!(
            summarizer.summarize(""),
            Err(SummaryError::EmptyInput)
        ));
    }

    #[test]
    fn test_short_document_is_returned_whole() {
        let summarizer = Summarizer::default(); // max 3 sentences
        let summary = summarizer.summarize("Only one sentence here.").unwrap();
        assert_eq!(summary.summary, "Only one sentence here.");
        assert_eq!(summary.summary_sentences, 1);
    }
}
