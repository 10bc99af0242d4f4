//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The page source abstraction and its HTTP implementation
//! - HTML parsing into title, paragraphs and links
//! - The shared frontier and per-origin politeness pacing
//! - Overall crawl coordination over a pool of workers

mod coordinator;
mod fetcher;
mod frontier;
mod pacer;
mod parser;

pub use coordinator::{run_crawl, Coordinator, CrawlSummary};
pub use fetcher::{build_http_client, FetchedPage, HttpPageSource, PageSource, TransportError};
pub use frontier::{Frontier, FrontierStats, OutcomeKind, VisitOutcome};
pub use pacer::Pacer;
pub use parser::{parse_html, ParsedPage};

use crate::config::Config;
use crate::Result;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the index database (clearing it first when `fresh` is set)
/// 2. Record a new crawl run
/// 3. Fetch pages from the seed until the frontier is exhausted,
///    `max-pages` pages are indexed, or the deadline passes
/// 4. Index every page with paragraph text
/// 5. Close the run and return its summary
pub async fn crawl(config: Config, config_hash: String, fresh: bool) -> Result<CrawlSummary> {
    run_crawl(config, config_hash, fresh).await
}
