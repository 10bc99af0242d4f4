//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::PageState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    DocumentRecord, NewDocument, PostingRecord, QueryStatistics, QueryTermStatistics,
    RunRecord, RunStatus, ScoredPosting, TermRecord, VisitRecord,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

/// How long a connection waits on another writer's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const RUN_COLUMNS: &str = "id, started_at, finished_at, seed_url, config_hash, status,
     pages_visited, pages_failed, pages_skipped";

const DOCUMENT_COLUMNS: &str =
    "id, url, title, content, token_count, max_term_frequency, indexed_at";

/// SQLite storage backend, one connection per value
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Set before the pragmas so switching to WAL also waits on other writers
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn map_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        seed_url: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
        pages_visited: row.get::<_, i64>(6)? as u64,
        pages_failed: row.get::<_, i64>(7)? as u64,
        pages_skipped: row.get::<_, i64>(8)? as u64,
    })
}

fn map_document(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        token_count: row.get::<_, i64>(4)? as u64,
        max_term_frequency: row.get(5)?,
        indexed_at: row.get(6)?,
    })
}

fn map_term(row: &Row<'_>) -> rusqlite::Result<TermRecord> {
    Ok(TermRecord {
        id: row.get(0)?,
        text: row.get(1)?,
        document_frequency: row.get::<_, i64>(2)? as u64,
    })
}

fn map_posting(row: &Row<'_>) -> rusqlite::Result<PostingRecord> {
    Ok(PostingRecord {
        term_id: row.get(0)?,
        document_id: row.get(1)?,
        term_frequency: row.get(2)?,
    })
}

fn count(conn: &Connection, sql: &str) -> StorageResult<u64> {
    let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count as u64)
}

// ===== Statement helpers shared by single and whole-document operations =====

fn find_document_id(conn: &Connection, url: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM documents WHERE url = ?1",
        params![url],
        |row| row.get(0),
    )
    .optional()
}

fn insert_document_row(conn: &Connection, document: &NewDocument) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO documents (url, title, content, token_count, max_term_frequency, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            document.url,
            document.title,
            document.content,
            document.token_count as i64,
            document.max_term_frequency,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn upsert_term_row(conn: &Connection, text: &str) -> rusqlite::Result<i64> {
    // The no-op update makes RETURNING yield the existing row's id on conflict
    conn.query_row(
        "INSERT INTO terms (text) VALUES (?1)
         ON CONFLICT(text) DO UPDATE SET text = excluded.text
         RETURNING id",
        params![text],
        |row| row.get(0),
    )
}

fn insert_posting_row(
    conn: &Connection,
    term_id: i64,
    document_id: i64,
    term_frequency: f64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO postings (term_id, document_id, term_frequency) VALUES (?1, ?2, ?3)",
        params![term_id, document_id, term_frequency],
    )?;
    conn.execute(
        "UPDATE terms SET document_frequency = document_frequency + 1 WHERE id = ?1",
        params![term_id],
    )?;
    Ok(())
}

fn delete_postings_for_document(conn: &Connection, document_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE terms SET document_frequency = document_frequency - 1
         WHERE id IN (SELECT term_id FROM postings WHERE document_id = ?1)",
        params![document_id],
    )?;
    conn.execute(
        "DELETE FROM postings WHERE document_id = ?1",
        params![document_id],
    )?;
    Ok(())
}

fn check_term_frequency(term: &str, value: f64) -> StorageResult<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(StorageError::InvalidTermFrequency {
            term: term.to_string(),
            value,
        })
    }
}

fn write_postings(
    conn: &Connection,
    document_id: i64,
    frequencies: &BTreeMap<String, f64>,
) -> StorageResult<()> {
    for (term, &term_frequency) in frequencies {
        check_term_frequency(term, term_frequency)?;
        let term_id = upsert_term_row(conn, term)?;
        insert_posting_row(conn, term_id, document_id, term_frequency)?;
    }
    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, seed_url: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_runs (started_at, seed_url, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, seed_url, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM crawl_runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                map_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM crawl_runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                map_run,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        pages_visited: u64,
        pages_failed: u64,
        pages_skipped: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2,
             pages_visited = ?3, pages_failed = ?4, pages_skipped = ?5 WHERE id = ?6",
            params![
                status.to_db_string(),
                now,
                pages_visited as i64,
                pages_failed as i64,
                pages_skipped as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Visit Log =====

    fn record_visit(
        &mut self,
        run_id: i64,
        url: &str,
        state: PageState,
        status_code: Option<u16>,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO visits (run_id, url, state, status_code, error_message, visited_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                url,
                state.to_db_string(),
                status_code,
                error_message,
                now
            ],
        )?;
        Ok(())
    }

    fn get_visits(&self, run_id: i64) -> StorageResult<Vec<VisitRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, url, state, status_code, error_message, visited_at
             FROM visits WHERE run_id = ?1 ORDER BY id",
        )?;

        let visits = stmt
            .query_map(params![run_id], |row| {
                Ok(VisitRecord {
                    run_id: row.get(0)?,
                    url: row.get(1)?,
                    state: PageState::from_db_string(&row.get::<_, String>(2)?)
                        .unwrap_or(PageState::HttpError),
                    status_code: row.get(3)?,
                    error_message: row.get(4)?,
                    visited_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(visits)
    }

    fn count_visits_by_state(&self, run_id: i64) -> StorageResult<HashMap<PageState, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM visits WHERE run_id = ?1 GROUP BY state")?;

        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut summary = HashMap::new();
        for row in rows {
            let (state_str, count) = row?;
            if let Some(state) = PageState::from_db_string(&state_str) {
                summary.insert(state, count as u64);
            }
        }

        Ok(summary)
    }

    // ===== Documents =====

    fn insert_document(&mut self, document: &NewDocument) -> StorageResult<i64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(document_id) = find_document_id(&tx, &document.url)? {
            return Err(StorageError::DocumentExists {
                url: document.url.clone(),
                document_id,
            });
        }
        let document_id = insert_document_row(&tx, document)?;
        tx.commit()?;
        Ok(document_id)
    }

    fn get_document(&self, document_id: i64) -> StorageResult<Option<DocumentRecord>> {
        let document = self
            .conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![document_id],
                map_document,
            )
            .optional()?;
        Ok(document)
    }

    fn get_document_by_url(&self, url: &str) -> StorageResult<Option<DocumentRecord>> {
        let document = self
            .conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE url = ?1", DOCUMENT_COLUMNS),
                params![url],
                map_document,
            )
            .optional()?;
        Ok(document)
    }

    fn count_documents(&self) -> StorageResult<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM documents")
    }

    // ===== Terms and Postings =====

    fn upsert_term(&mut self, text: &str) -> StorageResult<i64> {
        Ok(upsert_term_row(&self.conn, text)?)
    }

    fn get_term(&self, text: &str) -> StorageResult<Option<TermRecord>> {
        let term = self
            .conn
            .query_row(
                "SELECT id, text, document_frequency FROM terms WHERE text = ?1",
                params![text],
                map_term,
            )
            .optional()?;
        Ok(term)
    }

    fn get_all_terms(&self) -> StorageResult<Vec<TermRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, text, document_frequency FROM terms ORDER BY id")?;
        let terms = stmt
            .query_map([], map_term)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(terms)
    }

    fn insert_posting(
        &mut self,
        term_id: i64,
        document_id: i64,
        term_frequency: f64,
    ) -> StorageResult<()> {
        check_term_frequency(&format!("term #{}", term_id), term_frequency)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_posting_row(&tx, term_id, document_id, term_frequency)?;
        tx.commit()?;
        Ok(())
    }

    fn get_postings_for_term(&self, term_id: i64) -> StorageResult<Vec<PostingRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT term_id, document_id, term_frequency FROM postings
             WHERE term_id = ?1 ORDER BY document_id",
        )?;
        let postings = stmt
            .query_map(params![term_id], map_posting)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(postings)
    }

    fn get_postings_for_document(&self, document_id: i64) -> StorageResult<Vec<PostingRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT term_id, document_id, term_frequency FROM postings
             WHERE document_id = ?1 ORDER BY term_id",
        )?;
        let postings = stmt
            .query_map(params![document_id], map_posting)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(postings)
    }

    fn count_documents_for_term(&self, term_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT document_id) FROM postings WHERE term_id = ?1",
            params![term_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_terms(&self) -> StorageResult<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM terms")
    }

    fn count_postings(&self) -> StorageResult<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM postings")
    }

    // ===== Whole-Document Operations =====

    fn write_document(
        &mut self,
        document: &NewDocument,
        frequencies: &BTreeMap<String, f64>,
    ) -> StorageResult<i64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(document_id) = find_document_id(&tx, &document.url)? {
            return Err(StorageError::DocumentExists {
                url: document.url.clone(),
                document_id,
            });
        }

        let document_id = insert_document_row(&tx, document)?;
        write_postings(&tx, document_id, frequencies)?;
        tx.commit()?;

        Ok(document_id)
    }

    fn rewrite_document(
        &mut self,
        document: &NewDocument,
        frequencies: &BTreeMap<String, f64>,
    ) -> StorageResult<i64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let document_id = match find_document_id(&tx, &document.url)? {
            Some(document_id) => {
                delete_postings_for_document(&tx, document_id)?;
                tx.execute(
                    "UPDATE documents SET title = ?1, content = ?2, token_count = ?3,
                     max_term_frequency = ?4, indexed_at = ?5 WHERE id = ?6",
                    params![
                        document.title,
                        document.content,
                        document.token_count as i64,
                        document.max_term_frequency,
                        Utc::now().to_rfc3339(),
                        document_id
                    ],
                )?;
                document_id
            }
            None => insert_document_row(&tx, document)?,
        };

        write_postings(&tx, document_id, frequencies)?;
        tx.commit()?;

        Ok(document_id)
    }

    fn load_query_statistics(&mut self, terms: &[String]) -> StorageResult<QueryStatistics> {
        let tx = self.conn.transaction()?;

        let total_documents = count(&tx, "SELECT COUNT(*) FROM documents")?;
        let mut statistics = QueryStatistics {
            total_documents,
            terms: Vec::with_capacity(terms.len()),
        };

        {
            let mut term_stmt =
                tx.prepare("SELECT id, document_frequency FROM terms WHERE text = ?1")?;
            let mut posting_stmt = tx.prepare(
                "SELECT p.document_id, d.url, d.title, p.term_frequency, d.max_term_frequency
                 FROM postings p JOIN documents d ON d.id = p.document_id
                 WHERE p.term_id = ?1 ORDER BY p.document_id",
            )?;

            for term in terms {
                let found: Option<(i64, i64)> = term_stmt
                    .query_row(params![term], |row| Ok((row.get(0)?, row.get(1)?)))
                    .optional()?;

                let Some((term_id, document_frequency)) = found else {
                    statistics.terms.push(QueryTermStatistics {
                        term: term.clone(),
                        document_frequency: 0,
                        postings: Vec::new(),
                    });
                    continue;
                };

                let postings = posting_stmt
                    .query_map(params![term_id], |row| {
                        Ok(ScoredPosting {
                            document_id: row.get(0)?,
                            url: row.get(1)?,
                            title: row.get(2)?,
                            term_frequency: row.get(3)?,
                            max_term_frequency: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                statistics.terms.push(QueryTermStatistics {
                    term: term.clone(),
                    document_frequency: document_frequency as u64,
                    postings,
                });
            }
        }

        tx.commit()?;
        Ok(statistics)
    }

    fn clear_index(&mut self) -> StorageResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(
            "
            DELETE FROM postings;
            DELETE FROM terms;
            DELETE FROM documents;
            DELETE FROM visits;
        ",
        )?;
        tx.commit()?;
        Ok(())
    }
}
