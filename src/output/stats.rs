//! Statistics generation from the index database
//!
//! This module provides functionality for extracting and displaying
//! index and crawl statistics from the storage layer.

use crate::state::PageState;
use crate::storage::{RunRecord, Storage};
use crate::Result;
use std::collections::HashMap;

/// Index statistics summary
#[derive(Debug, Clone)]
pub struct IndexStatistics {
    pub total_documents: u64,
    pub total_terms: u64,
    pub total_postings: u64,

    /// Most recent crawl run, if any
    pub latest_run: Option<RunRecord>,

    /// Visit outcomes of the latest run
    pub visits_by_state: HashMap<PageState, u64>,
}

impl IndexStatistics {
    pub fn total_visits(&self) -> u64 {
        self.visits_by_state.values().sum()
    }

    /// Average number of distinct terms per document
    pub fn postings_per_document(&self) -> f64 {
        if self.total_documents == 0 {
            return 0.0;
        }
        self.total_postings as f64 / self.total_documents as f64
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> Result<IndexStatistics> {
    let total_documents = storage.count_documents()?;
    let total_terms = storage.count_terms()?;
    let total_postings = storage.count_postings()?;

    let latest_run = storage.get_latest_run()?;
    let visits_by_state = match &latest_run {
        Some(run) => storage.count_visits_by_state(run.id)?,
        None => HashMap::new(),
    };

    Ok(IndexStatistics {
        total_documents,
        total_terms,
        total_postings,
        latest_run,
        visits_by_state,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &IndexStatistics) {
    println!("=== Index Statistics ===\n");

    println!("Overview:");
    println!("  Documents: {}", stats.total_documents);
    println!("  Terms: {}", stats.total_terms);
    println!("  Postings: {}", stats.total_postings);
    println!(
        "  Distinct terms per document: {:.1}",
        stats.postings_per_document()
    );
    println!();

    let Some(run) = &stats.latest_run else {
        println!("No crawl runs recorded");
        return;
    };

    println!("Latest Run (#{}):", run.id);
    println!("  Seed: {}", run.seed_url);
    println!("  Status: {}", run.status.to_db_string());
    println!("  Started: {}", run.started_at);
    if let Some(finished) = &run.finished_at {
        println!("  Finished: {}", finished);
    }
    println!(
        "  Indexed: {}, failed: {}, skipped: {}",
        run.pages_visited, run.pages_failed, run.pages_skipped
    );
    println!();

    if stats.visits_by_state.is_empty() {
        return;
    }

    let total = stats.total_visits();
    println!("Visits by State:");
    // Sort states by count (descending)
    let mut state_counts: Vec<_> = stats.visits_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.to_db_string().cmp(b.0.to_db_string())));

    for (state, count) in state_counts {
        let percentage = (*count as f64 / total as f64) * 100.0;
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, NewDocument, RunStatus};
    use std::collections::BTreeMap;

    #[test]
    fn test_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Database::initialize(dir.path().join("stats.db"))
            .unwrap()
            .open()
            .unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_documents, 0);
        assert!(stats.latest_run.is_none());
        assert_eq!(stats.postings_per_document(), 0.0);
    }

    #[test]
    fn test_statistics_reflect_latest_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = Database::initialize(dir.path().join("stats.db"))
            .unwrap()
            .open()
            .unwrap();

        let document = NewDocument {
            url: "https://example.com/".to_string(),
            title: "Home".to_string(),
            content: "the cat".to_string(),
            token_count: 2,
            max_term_frequency: 0.5,
        };
        let frequencies: BTreeMap<String, f64> =
            [("the".to_string(), 0.5), ("cat".to_string(), 0.5)].into_iter().collect();
        storage.write_document(&document, &frequencies).unwrap();

        let run_id = storage.create_run("https://example.com/", "hash").unwrap();
        storage
            .record_visit(run_id, "https://example.com/", PageState::Indexed, Some(200), None)
            .unwrap();
        storage
            .record_visit(
                run_id,
                "https://example.com/gone",
                PageState::DeadLink,
                Some(404),
                Some("HTTP 404"),
            )
            .unwrap();
        storage
            .finish_run(run_id, RunStatus::Completed, 1, 1, 0)
            .unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.total_terms, 2);
        assert_eq!(stats.total_postings, 2);
        assert_eq!(stats.total_visits(), 2);
        assert_eq!(stats.visits_by_state.get(&PageState::DeadLink), Some(&1));
        assert_eq!(stats.latest_run.unwrap().status, RunStatus::Completed);
    }
}
