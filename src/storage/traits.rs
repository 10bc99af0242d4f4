//! Storage traits and error types

use crate::state::PageState;
use crate::storage::{
    DocumentRecord, NewDocument, PostingRecord, QueryStatistics, RunRecord, RunStatus,
    TermRecord, VisitRecord,
};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Document already exists: {url} (id {document_id})")]
    DocumentExists { url: String, document_id: i64 },

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Term frequency {value} for '{term}' is outside (0, 1]")]
    InvalidTermFrequency { term: String, value: f64 },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// One value of an implementing type is one connection; it is used by a single
/// worker at a time. Concurrent workers each hold their own.
pub trait Storage: Send {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its ID
    fn create_run(&mut self, seed_url: &str, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run finished with its final status and page counts
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        pages_visited: u64,
        pages_failed: u64,
        pages_skipped: u64,
    ) -> StorageResult<()>;

    // ===== Visit Log =====

    /// Records how the visit of one canonical URL ended
    ///
    /// Fails if the URL was already recorded for this run.
    fn record_visit(
        &mut self,
        run_id: i64,
        url: &str,
        state: PageState,
        status_code: Option<u16>,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    fn get_visits(&self, run_id: i64) -> StorageResult<Vec<VisitRecord>>;

    fn count_visits_by_state(&self, run_id: i64) -> StorageResult<HashMap<PageState, u64>>;

    // ===== Documents =====

    /// Inserts a document row without postings
    fn insert_document(&mut self, document: &NewDocument) -> StorageResult<i64>;

    fn get_document(&self, document_id: i64) -> StorageResult<Option<DocumentRecord>>;

    fn get_document_by_url(&self, url: &str) -> StorageResult<Option<DocumentRecord>>;

    fn count_documents(&self) -> StorageResult<u64>;

    // ===== Terms and Postings =====

    /// Inserts the term if absent and returns its ID, in one statement
    fn upsert_term(&mut self, text: &str) -> StorageResult<i64>;

    fn get_term(&self, text: &str) -> StorageResult<Option<TermRecord>>;

    fn get_all_terms(&self) -> StorageResult<Vec<TermRecord>>;

    /// Inserts a posting and increments the term's document frequency atomically
    fn insert_posting(
        &mut self,
        term_id: i64,
        document_id: i64,
        term_frequency: f64,
    ) -> StorageResult<()>;

    fn get_postings_for_term(&self, term_id: i64) -> StorageResult<Vec<PostingRecord>>;

    fn get_postings_for_document(&self, document_id: i64) -> StorageResult<Vec<PostingRecord>>;

    /// Live `COUNT(DISTINCT document_id)` over the term's postings
    fn count_documents_for_term(&self, term_id: i64) -> StorageResult<u64>;

    fn count_terms(&self) -> StorageResult<u64>;

    fn count_postings(&self) -> StorageResult<u64>;

    // ===== Whole-Document Operations =====

    /// Writes a new document with all of its postings in one transaction
    ///
    /// Returns `StorageError::DocumentExists` if the URL is already indexed.
    fn write_document(
        &mut self,
        document: &NewDocument,
        frequencies: &BTreeMap<String, f64>,
    ) -> StorageResult<i64>;

    /// Replaces an indexed document's content and postings, keeping its ID
    ///
    /// Old postings are removed and their document frequencies decremented
    /// before the new ones are written. A URL not yet indexed is inserted.
    fn rewrite_document(
        &mut self,
        document: &NewDocument,
        frequencies: &BTreeMap<String, f64>,
    ) -> StorageResult<i64>;

    /// Reads the corpus size and per-term postings for a query from one snapshot
    fn load_query_statistics(&mut self, terms: &[String]) -> StorageResult<QueryStatistics>;

    /// Removes every document, term, posting and visit
    fn clear_index(&mut self) -> StorageResult<()>;
}
