//! Crawler coordinator - main crawl orchestration logic
//!
//! This module runs one crawl: it records the run, seeds the frontier, and
//! drives a pool of workers. Each worker:
//! - Pulls the next URL from the shared frontier (parking while it is empty)
//! - Waits for its own politeness turn on the URL's origin
//! - Fetches the page under the per-request timeout
//! - Resolves and scopes outgoing links against the page's final URL
//! - Indexes the page and records the visit over its own storage connection

use crate::config::{Config, PolitenessDelay};
use crate::crawler::fetcher::{FetchedPage, HttpPageSource, PageSource};
use crate::crawler::frontier::{Frontier, FrontierStats, VisitOutcome};
use crate::crawler::pacer::Pacer;
use crate::index::{DocumentInput, Indexer};
use crate::state::PageState;
use crate::storage::{Database, RunStatus, SqliteStorage, Storage};
use crate::url::{normalize_url, resolve_href, CrawlScope};
use crate::{Result, SearchError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use url::Url;

/// Progress is logged every this many completed visits
const PROGRESS_INTERVAL: u64 = 10;

/// What a finished crawl run reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub run_id: i64,
    /// Successful visits (pages indexed or re-indexed)
    pub pages_visited: u64,
    pub pages_failed: u64,
    /// Pages fetched whose URL was already indexed
    pub pages_skipped: u64,
    pub duration: Duration,
}

impl CrawlSummary {
    fn from_stats(run_id: i64, stats: &FrontierStats, duration: Duration) -> Self {
        Self {
            run_id,
            pages_visited: stats.succeeded,
            pages_failed: stats.failed,
            pages_skipped: stats.skipped,
            duration,
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    database: Database,
    source: Arc<dyn PageSource>,
    scope: CrawlScope,
    indexer: Indexer,
    seed: Url,
    config_hash: String,
    fresh: bool,
}

impl Coordinator {
    /// Creates a coordinator that fetches over HTTP
    ///
    /// With `fresh`, the existing index and visit log are cleared before crawling.
    pub fn new(config: Config, fresh: bool) -> Result<Self> {
        let source = HttpPageSource::from_config(&config)?;
        Self::with_source(config, Arc::new(source), fresh)
    }

    /// Creates a coordinator over any page source
    pub fn with_source(config: Config, source: Arc<dyn PageSource>, fresh: bool) -> Result<Self> {
        let seed = normalize_url(&config.crawler.seed_url)?;
        let scope = CrawlScope::from_config(&config.scope, &seed);
        let database = Database::from_config(&config.storage)?;

        Ok(Self {
            config: Arc::new(config),
            database,
            source,
            scope,
            indexer: Indexer::default(),
            seed,
            config_hash: String::new(),
            fresh,
        })
    }

    /// Sets the configuration hash recorded with the run
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    pub fn with_indexer(mut self, indexer: Indexer) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Runs the crawl to completion and returns its summary
    ///
    /// The run ends when the frontier is exhausted, `max-pages` successful
    /// visits have happened, or the deadline passes. Individual page failures
    /// never end the run.
    pub async fn run(&self) -> Result<CrawlSummary> {
        let crawler = &self.config.crawler;
        let mut storage = self.database.open()?;

        if self.fresh {
            storage.clear_index()?;
            tracing::info!("Cleared existing index and visit log");
        }

        let run_id = storage.create_run(self.seed.as_str(), &self.config_hash)?;
        tracing::info!(
            "Starting crawl run {} from {} ({} workers, max {} pages)",
            run_id,
            self.seed,
            crawler.concurrency,
            crawler.max_pages
        );

        let started = Instant::now();
        let frontier = Arc::new(Frontier::new(u64::from(crawler.max_pages)));
        frontier.seed(self.seed.clone());

        let deadline_task = crawler.deadline().map(|deadline| {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                tracing::info!("Deadline of {:?} reached, draining in-flight visits", deadline);
                frontier.drain();
            })
        });

        let context = Arc::new(WorkerContext {
            run_id,
            frontier: Arc::clone(&frontier),
            source: Arc::clone(&self.source),
            scope: self.scope.clone(),
            indexer: self.indexer.clone(),
            database: self.database.clone(),
            delay: crawler.politeness_delay(),
            request_timeout: crawler.request_timeout(),
            reindex_existing: crawler.reindex_existing,
            started,
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..crawler.concurrency {
            workers.spawn(run_worker(worker_id, Arc::clone(&context)));
        }

        let mut worker_failed = false;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Crawl worker failed: {}", e);
                worker_failed = true;
                frontier.close();
            }
        }

        if let Some(task) = deadline_task {
            task.abort();
        }

        let stats = frontier.stats();
        let summary = CrawlSummary::from_stats(run_id, &stats, started.elapsed());
        let status = if worker_failed {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        // A failed run update is logged; the summary is returned regardless
        if let Err(e) = storage.finish_run(
            run_id,
            status,
            summary.pages_visited,
            summary.pages_failed,
            summary.pages_skipped,
        ) {
            tracing::error!("Failed to record the end of crawl run {}: {}", run_id, e);
        }

        tracing::info!(
            "Crawl completed: {} pages indexed, {} failed, {} skipped in {:?}",
            summary.pages_visited,
            summary.pages_failed,
            summary.pages_skipped,
            summary.duration
        );
        if stats.dropped > 0 {
            tracing::warn!("{} discovered links were dropped because the pending queue was full", stats.dropped);
        }

        Ok(summary)
    }
}

/// Runs a complete crawl over HTTP
///
/// # Example
///
/// ```no_run
/// use sumi_seek::config::load_config_with_hash;
/// use sumi_seek::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let summary = run_crawl(config, hash, false).await?;
/// println!("{} pages indexed", summary.pages_visited);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, config_hash: String, fresh: bool) -> Result<CrawlSummary> {
    Coordinator::new(config, fresh)?
        .with_config_hash(config_hash)
        .run()
        .await
}

/// State shared by all workers of one run
struct WorkerContext {
    run_id: i64,
    frontier: Arc<Frontier>,
    source: Arc<dyn PageSource>,
    scope: CrawlScope,
    indexer: Indexer,
    database: Database,
    delay: PolitenessDelay,
    request_timeout: Duration,
    reindex_existing: bool,
    started: Instant,
}

/// Everything learned about one dispatched URL
#[derive(Debug)]
struct PageVisit {
    /// Canonical URL the page was served from
    final_url: Option<Url>,
    state: PageState,
    status_code: Option<u16>,
    error: Option<String>,
    links: Vec<Url>,
    /// Present when the page should be indexed
    document: Option<DocumentInput>,
}

impl PageVisit {
    fn failed(state: PageState, status_code: Option<u16>, error: String) -> Self {
        Self {
            final_url: None,
            state,
            status_code,
            error: Some(error),
            links: Vec::new(),
            document: None,
        }
    }

    fn outcome(&self) -> VisitOutcome {
        let links = self.links.clone();
        if self.state.is_success() {
            VisitOutcome::succeeded(links)
        } else if self.state.is_skipped() {
            VisitOutcome::skipped(links)
        } else {
            VisitOutcome::failed_with_links(links)
        }
    }
}

async fn run_worker(worker_id: u32, ctx: Arc<WorkerContext>) {
    let mut pacer = Pacer::new(ctx.delay);
    let mut storage: Option<SqliteStorage> = None;

    while let Some(url) = ctx.frontier.next().await {
        tracing::debug!("Worker {} processing {}", worker_id, url);

        pacer.wait_turn(&url).await;
        let visit = ctx.fetch(&url).await;
        let (returned, visit) = ctx.persist(storage.take(), url.clone(), visit).await;
        storage = returned;

        let outcome = visit.outcome();
        let stats = ctx.frontier.complete(visit.final_url.as_ref(), outcome);
        ctx.report_progress(&stats);
    }

    tracing::debug!("Worker {} finished", worker_id);
}

impl WorkerContext {
    /// Fetches a URL and classifies the response
    async fn fetch(&self, url: &Url) -> PageVisit {
        let fetched = tokio::time::timeout(self.request_timeout, self.source.fetch(url)).await;

        let page = match fetched {
            Err(_) => {
                tracing::warn!("Request to {} timed out after {:?}", url, self.request_timeout);
                return PageVisit::failed(
                    PageState::TimedOut,
                    None,
                    format!("Request exceeded {:?}", self.request_timeout),
                );
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to fetch {}: {}", url, e);
                return PageVisit::failed(e.page_state(), None, e.to_string());
            }
            Ok(Ok(page)) => page,
        };

        let final_url = normalize_url(page.final_url.as_str()).unwrap_or_else(|_| url.clone());
        if &final_url != url {
            tracing::debug!("{} was served from {}", url, final_url);
        }
        let status_code = Some(page.status_code);

        // Dispatched URLs are already in scope; only a redirect can leave it
        if &final_url != url && !self.scope.allows(&final_url) {
            tracing::warn!("{} redirected out of scope to {}", url, final_url);
            return PageVisit {
                final_url: Some(final_url.clone()),
                ..PageVisit::failed(
                    PageState::OutOfScope,
                    status_code,
                    format!("Redirected to {}", final_url),
                )
            };
        }

        if !page.is_success() {
            tracing::warn!("HTTP {} for {}", page.status_code, url);
            return PageVisit {
                final_url: Some(final_url),
                ..PageVisit::failed(
                    PageState::from_http_status(page.status_code),
                    status_code,
                    format!("HTTP {}", page.status_code),
                )
            };
        }

        if !page.is_html() {
            let content_type = page.content_type.clone().unwrap_or_default();
            tracing::debug!("Skipping non-HTML {} ({})", url, content_type);
            return PageVisit {
                final_url: Some(final_url),
                ..PageVisit::failed(
                    PageState::ContentMismatch,
                    status_code,
                    format!("Content-Type {}", content_type),
                )
            };
        }

        let links = self.extract_links(&page);

        if page.paragraphs.is_empty() {
            let err = SearchError::Parse {
                url: url.to_string(),
                message: "no paragraph text".to_string(),
            };
            tracing::debug!("{}", err);
            return PageVisit {
                final_url: Some(final_url),
                links,
                ..PageVisit::failed(PageState::NoContent, status_code, err.to_string())
            };
        }

        if page.title.is_none() {
            tracing::debug!("No title on {}, indexing with an empty one", url);
        }

        let document = DocumentInput::new(
            final_url.as_str(),
            page.title.clone().unwrap_or_default(),
            page.content(),
        );

        PageVisit {
            final_url: Some(final_url),
            state: PageState::Indexed,
            status_code,
            error: None,
            links,
            document: Some(document),
        }
    }

    /// Resolves the page's links against its final URL and keeps those in scope
    fn extract_links(&self, page: &FetchedPage) -> Vec<Url> {
        page.links
            .iter()
            .filter_map(|href| match resolve_href(href, &page.final_url) {
                Ok(link) => Some(link),
                Err(e) => {
                    tracing::debug!("Ignoring link '{}': {}", href, e);
                    None
                }
            })
            .filter(|link| self.scope.allows(link))
            .collect()
    }

    /// Indexes the page (if any) and records the visit on a blocking thread
    ///
    /// The worker's connection is moved in and handed back; it is reopened
    /// lazily if it was never opened or got lost.
    async fn persist(
        &self,
        storage: Option<SqliteStorage>,
        url: Url,
        visit: PageVisit,
    ) -> (Option<SqliteStorage>, PageVisit) {
        let database = self.database.clone();
        let indexer = self.indexer.clone();
        let run_id = self.run_id;
        let reindex_existing = self.reindex_existing;
        let final_url = visit.final_url.clone();

        let job = tokio::task::spawn_blocking(move || {
            let mut visit = visit;
            let mut storage = match storage.map_or_else(|| database.open(), Ok) {
                Ok(storage) => storage,
                Err(e) => {
                    tracing::warn!("Could not open storage for {}: {}", url, e);
                    if visit.document.take().is_some() {
                        visit.state = PageState::StorageFailed;
                        visit.error = Some(e.to_string());
                    }
                    return (None, visit);
                }
            };

            index_and_record(&mut storage, &indexer, run_id, &url, &mut visit, reindex_existing);
            (Some(storage), visit)
        });

        match job.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Storage task failed: {}", e);
                let mut visit =
                    PageVisit::failed(PageState::StorageFailed, None, SearchError::from(e).to_string());
                visit.final_url = final_url;
                (None, visit)
            }
        }
    }

    fn report_progress(&self, stats: &FrontierStats) {
        let completed = stats.completed();
        if completed == 0 || completed % PROGRESS_INTERVAL != 0 {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            completed as f64 / elapsed
        } else {
            0.0
        };
        tracing::info!(
            "Progress: {} visited ({} indexed, {} failed, {} skipped), {} pending, {:.2} pages/sec",
            completed,
            stats.succeeded,
            stats.failed,
            stats.skipped,
            stats.pending,
            rate
        );
    }
}

fn index_and_record(
    storage: &mut SqliteStorage,
    indexer: &Indexer,
    run_id: i64,
    url: &Url,
    visit: &mut PageVisit,
    reindex_existing: bool,
) {
    if let Some(document) = visit.document.take() {
        match indexer.index(storage, &document) {
            Ok(document_id) => {
                tracing::debug!("Indexed {} as document {}", document.url, document_id);
                visit.state = PageState::Indexed;
            }
            Err(SearchError::DuplicateDocument { document_id, .. }) if reindex_existing => {
                match indexer.reindex(storage, &document) {
                    Ok(_) => {
                        tracing::info!("Re-indexed {} (document {})", document.url, document_id);
                        visit.state = PageState::Reindexed;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to re-index {}: {}", document.url, e);
                        visit.state = PageState::StorageFailed;
                        visit.error = Some(e.to_string());
                    }
                }
            }
            Err(SearchError::DuplicateDocument { document_id, .. }) => {
                tracing::info!("{} is already indexed as document {}", document.url, document_id);
                visit.state = PageState::AlreadyIndexed;
            }
            Err(e) => {
                if e.is_recoverable() {
                    tracing::warn!("Failed to index {}: {}", document.url, e);
                } else {
                    tracing::error!("Failed to index {}: {}", document.url, e);
                }
                visit.state = PageState::StorageFailed;
                visit.error = Some(e.to_string());
            }
        }
    }

    if let Err(e) = storage.record_visit(
        run_id,
        url.as_str(),
        visit.state,
        visit.status_code,
        visit.error.as_deref(),
    ) {
        tracing::warn!("Failed to record visit of {}: {}", url, e);
    }
}
