//! Indexing engine
//!
//! Turns crawled documents into persisted term statistics. Every document is
//! written with all of its postings in one transaction, and each term's
//! document frequency is updated inside that same transaction.

mod engine;
mod tokenizer;

pub use engine::{DocumentInput, Indexer};
pub use tokenizer::{TermStatistics, Tokenizer, WhitespaceTokenizer};
