//! Ranking engine
//!
//! Scores documents against a query with log-weighted TF-IDF:
//!
//! ```text
//! idf(t)    = ln(N / df(t))                      (0 when df or N is 0)
//! w(d, t)   = (1 + ln tf(d, t)) * idf(t) / ln(1 + max_tf(d))
//! score(d)  = sum of w(d, t) over the distinct query terms in d
//! ```
//!
//! Results are ordered by descending score, ties by ascending document id.

use crate::index::{Tokenizer, WhitespaceTokenizer};
use crate::storage::{QueryStatistics, Storage};
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// One ranked result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(skip)]
    pub document_id: i64,
    pub url: String,
    pub title: String,
    pub score: f64,
}

/// Inverse document frequency of a term
pub fn idf(total_documents: u64, document_frequency: u64) -> f64 {
    if total_documents == 0 || document_frequency == 0 {
        return 0.0;
    }
    (total_documents as f64 / document_frequency as f64).ln()
}

/// Weighted contribution of one term to one document's score
///
/// Stored postings always have `tf > 0`, and a document with postings always
/// has `max_tf > 0`; a zero `max_tf` contributes nothing rather than dividing by zero.
pub fn term_weight(term_frequency: f64, max_term_frequency: f64, idf: f64) -> f64 {
    let norm = (1.0 + max_term_frequency).ln();
    if norm <= 0.0 || term_frequency <= 0.0 {
        return 0.0;
    }
    (1.0 + term_frequency.ln()) * idf / norm
}

/// Scores and orders every document that contains at least one query term
pub fn rank(statistics: &QueryStatistics) -> Vec<SearchHit> {
    let mut hits: BTreeMap<i64, SearchHit> = BTreeMap::new();

    for term in &statistics.terms {
        let term_idf = idf(statistics.total_documents, term.document_frequency);

        for posting in &term.postings {
            let weight = term_weight(posting.term_frequency, posting.max_term_frequency, term_idf);
            let hit = hits.entry(posting.document_id).or_insert_with(|| SearchHit {
                document_id: posting.document_id,
                url: posting.url.clone(),
                title: posting.title.clone(),
                score: 0.0,
            });
            hit.score += weight;
        }
    }

    let mut ranked: Vec<SearchHit> = hits.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    ranked
}

/// Answers free-text queries against the index
#[derive(Debug, Clone)]
pub struct Ranker {
    tokenizer: Arc<dyn Tokenizer>,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(Arc::new(WhitespaceTokenizer))
    }
}

impl Ranker {
    /// Creates a ranker; the tokenizer must match the one used for indexing
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    /// Distinct query terms, in first-occurrence order
    pub fn query_terms(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tokenizer
            .tokenize(query)
            .into_iter()
            .filter(|term| seen.insert(term.clone()))
            .collect()
    }

    /// Ranks documents against `query`
    ///
    /// An empty query, or one matching nothing, yields an empty list.
    pub fn search(&self, storage: &mut dyn Storage, query: &str) -> Result<Vec<SearchHit>> {
        let terms = self.query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let statistics = storage.load_query_statistics(&terms)?;
        let hits = rank(&statistics);

        debug!(
            "Query {:?}: {} terms, {} hits over {} documents",
            query,
            terms.len(),
            hits.len(),
            statistics.total_documents
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{QueryTermStatistics, ScoredPosting};

    fn posting(document_id: i64, term_frequency: f64, max_term_frequency: f64) -> ScoredPosting {
        ScoredPosting {
            document_id,
            url: format!("https://example.com/{}", document_id),
            title: format!("Doc {}", document_id),
            term_frequency,
            max_term_frequency,
        }
    }

    fn term(name: &str, document_frequency: u64, postings: Vec<ScoredPosting>) -> QueryTermStatistics {
        QueryTermStatistics {
            term: name.to_string(),
            document_frequency,
            postings,
        }
    }

    #[test]
    fn test_idf_edge_cases() {
        assert_eq!(idf(0, 0), 0.0);
        assert_eq!(idf(10, 0), 0.0);
        assert_eq!(idf(2, 2), 0.0);
        assert!((idf(4, 1) - 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_idf_is_monotonic() {
        let n = 100;
        for df in 1..n {
            assert!(idf(n, df) > idf(n, df + 1));
        }
    }

    #[test]
    fn test_term_weight() {
        let weight = term_weight(1.0, 1.0, 2.0);
        assert!((weight - 2.0 / 2f64.ln()).abs() < 1e-12);

        assert_eq!(term_weight(0.5, 0.0, 1.0), 0.0);
        assert_eq!(term_weight(0.5, 0.5, 0.0), 0.0);
    }

    #[test]
    fn test_universal_term_scores_zero_but_is_listed() {
        let stats = QueryStatistics {
            total_documents: 2,
            terms: vec![term("the", 2, vec![posting(1, 0.3, 0.3), posting(2, 0.3, 0.3)])],
        };

        let hits = rank(&stats);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score == 0.0));
        assert!(hits.iter().all(|h| h.score.is_sign_positive()));
        assert_eq!(hits[0].document_id, 1);
    }

    #[test]
    fn test_scores_sum_over_terms() {
        let stats = QueryStatistics {
            total_documents: 4,
            terms: vec![
                term("cat", 1, vec![posting(3, 0.5, 0.5)]),
                term("mat", 2, vec![posting(3, 0.5, 0.5), posting(1, 0.5, 0.5)]),
            ],
        };

        let hits = rank(&stats);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, 3);

        let expected = term_weight(0.5, 0.5, idf(4, 1)) + term_weight(0.5, 0.5, idf(4, 2));
        assert!((hits[0].score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ties_break_by_document_id() {
        let stats = QueryStatistics {
            total_documents: 5,
            terms: vec![term(
                "sat",
                3,
                vec![posting(9, 0.25, 0.5), posting(2, 0.25, 0.5), posting(5, 0.25, 0.5)],
            )],
        };

        let ids: Vec<i64> = rank(&stats).iter().map(|h| h.document_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_unknown_term_contributes_nothing() {
        let stats = QueryStatistics {
            total_documents: 3,
            terms: vec![term("xyznotaword", 0, vec![])],
        };
        assert!(rank(&stats).is_empty());
    }

    #[test]
    fn test_query_terms_are_folded_and_deduplicated() {
        let ranker = Ranker::default();
        assert_eq!(ranker.query_terms("Cat cat  MAT"), vec!["cat", "mat"]);
        assert!(ranker.query_terms("   ").is_empty());
    }

    #[test]
    fn test_search_hit_serializes_without_id() {
        let hit = SearchHit {
            document_id: 7,
            url: "https://example.com/".to_string(),
            title: "Home".to_string(),
            score: 1.5,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"url": "https://example.com/", "title": "Home", "score": 1.5})
        );
    }
}
