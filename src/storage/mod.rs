//! Storage module for persisting crawl and index data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Crawl run tracking and the per-run visit log
//! - Documents, terms and postings of the inverted index
//! - Atomic whole-document writes that keep document frequencies consistent

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::StorageConfig;
use crate::state::PageState;
use std::path::{Path, PathBuf};

/// Connection factory for one SQLite database file
///
/// Every crawl worker, indexing thread and query handler opens its own
/// connection; SQLite transactions serialize writers across them.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Creates the database file and schema if needed
    pub fn initialize(path: impl AsRef<Path>) -> StorageResult<Self> {
        let database = Self {
            path: path.as_ref().to_path_buf(),
        };
        database.open()?;
        Ok(database)
    }

    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        Self::initialize(&config.database_path)
    }

    /// Opens a new connection to the database
    pub fn open(&self) -> StorageResult<SqliteStorage> {
        SqliteStorage::new(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub seed_url: String,
    pub config_hash: String,
    pub status: RunStatus,
    pub pages_visited: u64,
    pub pages_failed: u64,
    pub pages_skipped: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One entry of the visit log
#[derive(Debug, Clone)]
pub struct VisitRecord {
    pub run_id: i64,
    pub url: String,
    pub state: PageState,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub visited_at: String,
}

/// An indexed document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub content: String,
    pub token_count: u64,
    pub max_term_frequency: f64,
    pub indexed_at: String,
}

/// A document about to be written, with its precomputed statistics
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub url: String,
    pub title: String,
    pub content: String,
    pub token_count: u64,
    pub max_term_frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermRecord {
    pub id: i64,
    pub text: String,
    pub document_frequency: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostingRecord {
    pub term_id: i64,
    pub document_id: i64,
    pub term_frequency: f64,
}

/// Everything the ranking engine needs for one query, read from a single snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStatistics {
    /// Number of documents in the corpus (N)
    pub total_documents: u64,
    pub terms: Vec<QueryTermStatistics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryTermStatistics {
    pub term: String,
    /// Zero when the term is not in the index
    pub document_frequency: u64,
    pub postings: Vec<ScoredPosting>,
}

/// A posting joined with the document fields needed for scoring and display
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPosting {
    pub document_id: i64,
    pub url: String,
    pub title: String,
    pub term_frequency: f64,
    pub max_term_frequency: f64,
}
