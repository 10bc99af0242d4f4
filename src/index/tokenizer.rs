use std::collections::BTreeMap;
use std::fmt;

/// Splits text into index terms
///
/// Indexing and querying must use the same tokenizer, otherwise query terms
/// will not match indexed ones.
pub trait Tokenizer: Send + Sync + fmt::Debug {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Case-folds and splits on whitespace; punctuation stays attached to words
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// Per-document term statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermStatistics {
    /// Total number of tokens in the document
    pub token_count: u64,

    /// Largest term frequency of any term in the document; 0 for empty documents
    pub max_term_frequency: f64,

    /// Distinct term -> occurrences / token_count
    pub frequencies: BTreeMap<String, f64>,
}

impl TermStatistics {
    pub fn from_tokens(tokens: &[String]) -> Self {
        if tokens.is_empty() {
            return Self::default();
        }

        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for token in tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let token_count = tokens.len() as u64;
        let frequencies: BTreeMap<String, f64> = counts
            .into_iter()
            .map(|(term, n)| (term.to_string(), n as f64 / token_count as f64))
            .collect();
        let max_term_frequency = frequencies.values().copied().fold(0.0, f64::max);

        Self {
            token_count,
            max_term_frequency,
            frequencies,
        }
    }
}
