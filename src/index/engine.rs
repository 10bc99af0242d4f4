use crate::index::tokenizer::{TermStatistics, Tokenizer, WhitespaceTokenizer};
use crate::storage::{Database, NewDocument, Storage, StorageError};
use crate::{Result, SearchError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A crawled page handed to the indexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInput {
    /// Canonical URL
    pub url: String,
    pub title: String,
    pub content: String,
}

impl DocumentInput {
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Builds the inverted index
///
/// The indexer holds no connection of its own; callers pass the storage to
/// write into, so one indexer can be shared across workers.
#[derive(Debug, Clone)]
pub struct Indexer {
    tokenizer: Arc<dyn Tokenizer>,
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new(Arc::new(WhitespaceTokenizer))
    }
}

impl Indexer {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    pub fn tokenizer(&self) -> Arc<dyn Tokenizer> {
        Arc::clone(&self.tokenizer)
    }

    /// Tokenizes a document and computes its term statistics
    pub fn analyze(&self, document: &DocumentInput) -> (NewDocument, TermStatistics) {
        let tokens = self.tokenizer.tokenize(&document.content);
        let stats = TermStatistics::from_tokens(&tokens);

        let new_document = NewDocument {
            url: document.url.clone(),
            title: document.title.clone(),
            content: document.content.clone(),
            token_count: stats.token_count,
            max_term_frequency: stats.max_term_frequency,
        };

        (new_document, stats)
    }

    /// Indexes a document that is not yet in the index
    ///
    /// Returns `SearchError::DuplicateDocument` if the URL already has a
    /// document; use [`Indexer::reindex`] to replace it.
    pub fn index(&self, storage: &mut dyn Storage, document: &DocumentInput) -> Result<i64> {
        let (new_document, stats) = self.analyze(document);
        let document_id = storage
            .write_document(&new_document, &stats.frequencies)
            .map_err(into_search_error)?;

        debug!(
            "Indexed {} as document {} ({} tokens, {} terms)",
            document.url,
            document_id,
            stats.token_count,
            stats.frequencies.len()
        );
        Ok(document_id)
    }

    /// Replaces an indexed document, keeping its ID
    ///
    /// All prior postings are removed (and their document frequencies
    /// decremented) before the new ones are written, in one transaction.
    pub fn reindex(&self, storage: &mut dyn Storage, document: &DocumentInput) -> Result<i64> {
        let (new_document, stats) = self.analyze(document);
        let document_id = storage
            .rewrite_document(&new_document, &stats.frequencies)
            .map_err(into_search_error)?;

        debug!("Re-indexed {} as document {}", document.url, document_id);
        Ok(document_id)
    }

    /// Indexes many documents on up to `parallelism` threads
    ///
    /// Each thread opens its own connection. Results are returned in input
    /// order; one failed document does not affect the others.
    pub fn index_all(
        &self,
        database: &Database,
        documents: Vec<DocumentInput>,
        parallelism: usize,
    ) -> Vec<Result<i64>> {
        let total = documents.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = parallelism.clamp(1, total);

        let mut slots: Vec<Option<Result<i64>>> = (0..total).map(|_| None).collect();
        let documents = &documents;

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    scope.spawn(move || self.index_stride(database, documents, worker, workers))
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(results) => {
                        for (position, result) in results {
                            slots[position] = Some(result);
                        }
                    }
                    Err(_) => warn!("Indexing thread panicked"),
                }
            }
        });

        let results: Vec<Result<i64>> = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(SearchError::Task("indexing thread panicked".to_string())))
            })
            .collect();

        let indexed = results.iter().filter(|r| r.is_ok()).count();
        info!("Indexed {} of {} documents", indexed, total);

        results
    }

    /// Indexes documents `start, start + step, ...` over one connection
    fn index_stride(
        &self,
        database: &Database,
        documents: &[DocumentInput],
        start: usize,
        step: usize,
    ) -> Vec<(usize, Result<i64>)> {
        let positions = (start..documents.len()).step_by(step);

        let mut storage = match database.open() {
            Ok(storage) => storage,
            Err(e) => {
                let message = e.to_string();
                return positions
                    .map(|position| {
                        let error = StorageError::Database(message.clone());
                        (position, Err(SearchError::Storage(error)))
                    })
                    .collect();
            }
        };

        positions
            .map(|position| (position, self.index(&mut storage, &documents[position])))
            .collect()
    }
}

fn into_search_error(err: StorageError) -> SearchError {
    match err {
        StorageError::DocumentExists { url, document_id } => {
            SearchError::DuplicateDocument { url, document_id }
        }
        other => SearchError::Storage(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn cat() -> DocumentInput {
        DocumentInput::new("https://example.com/a", "A", "the cat sat on the mat")
    }

    #[test]
    fn test_index_writes_document_and_postings() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let indexer = Indexer::default();

        let id = indexer.index(&mut storage, &cat()).unwrap();

        let document = storage.get_document(id).unwrap().unwrap();
        assert_eq!(document.token_count, 6);
        assert!((document.max_term_frequency - 2.0 / 6.0).abs() < 1e-12);
        assert_eq!(storage.get_postings_for_document(id).unwrap().len(), 5);
        assert_eq!(storage.get_term("the").unwrap().unwrap().document_frequency, 1);
    }

    #[test]
    fn test_document_ids_are_monotonic() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let indexer = Indexer::default();

        let a = indexer.index(&mut storage, &cat()).unwrap();
        let b = indexer
            .index(
                &mut storage,
                &DocumentInput::new("https://example.com/b", "B", "the dog"),
            )
            .unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_duplicate_url_is_rejected() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let indexer = Indexer::default();

        let id = indexer.index(&mut storage, &cat()).unwrap();
        let err = indexer.index(&mut storage, &cat()).unwrap_err();

        match err {
            SearchError::DuplicateDocument { document_id, url } => {
                assert_eq!(document_id, id);
                assert_eq!(url, "https://example.com/a");
            }
            other => panic!("expected DuplicateDocument, got {:?}", other),
        }
        assert_eq!(storage.get_term("cat").unwrap().unwrap().document_frequency, 1);
    }

    #[test]
    fn test_empty_content_yields_document_without_postings() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let indexer = Indexer::default();

        let id = indexer
            .index(
                &mut storage,
                &DocumentInput::new("https://example.com/empty", "", ""),
            )
            .unwrap();

        let document = storage.get_document(id).unwrap().unwrap();
        assert_eq!(document.token_count, 0);
        assert!(storage.get_postings_for_document(id).unwrap().is_empty());
    }

    #[test]
    fn test_reindex_keeps_id_and_adjusts_frequencies() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let indexer = Indexer::default();

        let id = indexer.index(&mut storage, &cat()).unwrap();
        let replaced = indexer
            .reindex(
                &mut storage,
                &DocumentInput::new("https://example.com/a", "A", "a dog sat"),
            )
            .unwrap();

        assert_eq!(id, replaced);
        assert_eq!(storage.get_term("cat").unwrap().unwrap().document_frequency, 0);
        assert_eq!(storage.get_term("sat").unwrap().unwrap().document_frequency, 1);
        assert_eq!(storage.get_term("dog").unwrap().unwrap().document_frequency, 1);
        assert_eq!(storage.count_documents().unwrap(), 1);
    }
}
