//! Integration tests for the crawler
//!
//! The HTTP tests use wiremock to serve a small site and run the full crawl
//! cycle end-to-end. The rest drive the coordinator over an in-memory link
//! graph to check deduplication, termination and the page and time limits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_seek::config::{parse_config, Config};
use sumi_seek::crawler::{Coordinator, FetchedPage, PageSource, TransportError};
use sumi_seek::state::PageState;
use sumi_seek::storage::{RunStatus, Storage, StorageError};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with no politeness delay
fn create_test_config(
    seed_url: &str,
    db_path: &Path,
    max_pages: u32,
    concurrency: u32,
    extra_crawler: &str,
) -> Config {
    parse_config(&format!(
        r#"
[crawler]
seed-url = "{}"
max-pages = {}
concurrency = {}
politeness-delay-min = 0
politeness-delay-max = 0
{}

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[storage]
database-path = "{}"
"#,
        seed_url,
        max_pages,
        concurrency,
        extra_crawler,
        db_path.display()
    ))
    .expect("Failed to build test config")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r##"<html><head><title>Home</title></head><body>
            <p>Welcome to the cat site</p>
            <a href="/page1">Page 1</a>
            <a href="/page1#section">Page 1 again</a>
            <a href="page2/">Page 2</a>
            <a href="/missing">Missing</a>
            <a href="https://elsewhere.example.org/">External</a>
            <a href="mailto:someone@example.com">Mail</a>
            </body></html>"##,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(
            r#"<html><head><title>Page 1</title></head><body>
            <p>The cat sat on the mat</p>
            <a href="/">Home</a>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html(
            "<html><head><title>Page 2</title></head><body><p>The dog sat</p></body></html>",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config = create_test_config(&base_url, &db_path, 100, 3, "");

    let coordinator = Coordinator::new(config, false).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.pages_visited, 3);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.pages_skipped, 0);

    let storage = coordinator.database().open().unwrap();
    assert_eq!(storage.count_documents().unwrap(), 3);

    let home = storage
        .get_document_by_url(&format!("{}/", base_url))
        .unwrap()
        .expect("home page indexed");
    assert_eq!(home.title, "Home");
    assert_eq!(home.content, "Welcome to the cat site");

    let page2 = storage
        .get_document_by_url(&format!("{}/page2", base_url))
        .unwrap()
        .expect("page2 indexed under its canonical URL");
    assert_eq!(page2.title, "Page 2");

    let visits = storage.get_visits(summary.run_id).unwrap();
    assert_eq!(visits.len(), 4);
    let missing = visits
        .iter()
        .find(|v| v.url.ends_with("/missing"))
        .expect("missing page recorded");
    assert_eq!(missing.state, PageState::DeadLink);
    assert_eq!(missing.status_code, Some(404));

    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.pages_visited, 3);
    assert_eq!(run.pages_failed, 1);
}

#[tokio::test]
async fn test_redirect_target_is_not_fetched_twice() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Home</title></head><body>
            <p>Start here</p>
            <a href="/old">Old</a>
            <a href="/new">New</a>
            </body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html(
            "<html><head><title>New</title></head><body><p>Moved here</p></body></html>",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config = create_test_config(&base_url, &db_path, 100, 1, "");

    let coordinator = Coordinator::new(config, false).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.pages_visited, 2);

    let storage = coordinator.database().open().unwrap();
    assert!(storage
        .get_document_by_url(&format!("{}/new", base_url))
        .unwrap()
        .is_some());
    assert!(storage
        .get_document_by_url(&format!("{}/old", base_url))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_non_html_and_empty_pages_fail_without_stopping_crawl() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Nav</title></head><body>
            <a href="/report.pdf">Report</a>
            <a href="/article">Article</a>
            </body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(html("<html><body><p>Untitled words</p></body></html>"))
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config = create_test_config(&base_url, &db_path, 100, 2, "");

    let coordinator = Coordinator::new(config, false).unwrap();
    let summary = coordinator.run().await.unwrap();

    // The navigation page has no paragraphs but its links are still followed
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.pages_failed, 2);

    let storage = coordinator.database().open().unwrap();
    let states = storage.count_visits_by_state(summary.run_id).unwrap();
    assert_eq!(states.get(&PageState::NoContent), Some(&1));
    assert_eq!(states.get(&PageState::ContentMismatch), Some(&1));
    assert_eq!(states.get(&PageState::Indexed), Some(&1));

    let article = storage
        .get_document_by_url(&format!("{}/article", base_url))
        .unwrap()
        .unwrap();
    assert_eq!(article.title, "");
}

#[tokio::test]
async fn test_redirect_limit_and_loop_fail_without_stopping_crawl() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Home</title></head><body>
            <p>Links that go nowhere</p>
            <a href="/chain0">Chain</a>
            <a href="/loop-a">Loop</a>
            <a href="/ok">Fine</a>
            </body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    // Three hops with max-redirects = 2
    for hop in 0..3 {
        Mock::given(method("GET"))
            .and(path(format!("/chain{}", hop)))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("/chain{}", hop + 1).as_str()),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/chain3"))
        .respond_with(html("<html><body><p>Too far</p></body></html>"))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/loop-a"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop-b"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/loop-b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop-a"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(html("<html><head><title>Ok</title></head><body><p>Still crawling</p></body></html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config = create_test_config(&base_url, &db_path, 100, 2, "max-redirects = 2");

    let coordinator = Coordinator::new(config, false).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.pages_failed, 2);

    let storage = coordinator.database().open().unwrap();
    let states = storage.count_visits_by_state(summary.run_id).unwrap();
    assert_eq!(states.get(&PageState::RedirectFailed), Some(&2));
    assert!(storage
        .get_document_by_url(&format!("{}/ok", base_url))
        .unwrap()
        .is_some());
    assert!(storage
        .get_document_by_url(&format!("{}/chain3", base_url))
        .unwrap()
        .is_none());

    let visits = storage.get_visits(summary.run_id).unwrap();
    for failed in ["/chain0", "/loop-a"] {
        let visit = visits
            .iter()
            .find(|v| v.url.ends_with(failed))
            .expect("redirect failure recorded");
        assert_eq!(visit.state, PageState::RedirectFailed);
    }

    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

/// In-memory site where page `i` links to a few other pages
struct LinkGraph {
    pages: usize,
    latency: Duration,
    unreachable: Vec<usize>,
    slow: Vec<usize>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl LinkGraph {
    fn new(pages: usize) -> Self {
        Self {
            pages,
            latency: Duration::ZERO,
            unreachable: Vec::new(),
            slow: Vec::new(),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn with_unreachable(mut self, pages: Vec<usize>) -> Self {
        self.unreachable = pages;
        self
    }

    /// Pages that take three seconds to answer
    fn with_slow(mut self, pages: Vec<usize>) -> Self {
        self.slow = pages;
        self
    }

    fn seed() -> String {
        "https://graph.test/p/0".to_string()
    }

    fn fetch_counts(&self) -> HashMap<String, usize> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for LinkGraph {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, TransportError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let index: usize = url
            .path()
            .trim_start_matches("/p/")
            .parse()
            .expect("graph URL");

        if self.slow.contains(&index) {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }

        if self.unreachable.contains(&index) {
            return Err(TransportError::Connect {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }

        let n = self.pages;
        let links = [(index + 1) % n, (index * 7 + 3) % n, (index * 3) % n]
            .iter()
            .map(|target| format!("/p/{}", target))
            .collect();

        Ok(FetchedPage {
            status_code: 200,
            final_url: url.clone(),
            content_type: Some("text/html".to_string()),
            title: Some(format!("Page {}", index)),
            paragraphs: vec![format!("graph page number {}", index)],
            links,
        })
    }
}

#[tokio::test]
async fn test_every_url_is_fetched_at_most_once() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&LinkGraph::seed(), &temp_dir.path().join("graph.db"), 1000, 8, "");

    let graph = Arc::new(LinkGraph::new(60).with_unreachable(vec![5, 17]));
    let coordinator = Coordinator::with_source(config, graph.clone(), false).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(30), coordinator.run())
        .await
        .expect("crawl terminates")
        .unwrap();

    let fetches = graph.fetch_counts();
    assert_eq!(fetches.len(), 60);
    assert!(fetches.values().all(|&count| count == 1));

    assert_eq!(summary.pages_visited, 58);
    assert_eq!(summary.pages_failed, 2);

    let storage = coordinator.database().open().unwrap();
    let visits = storage.get_visits(summary.run_id).unwrap();
    assert_eq!(visits.len(), 60);
    let states = storage.count_visits_by_state(summary.run_id).unwrap();
    assert_eq!(states.get(&PageState::Unreachable), Some(&2));
}

#[tokio::test]
async fn test_max_pages_stops_the_crawl() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&LinkGraph::seed(), &temp_dir.path().join("graph.db"), 10, 4, "");

    let graph = Arc::new(LinkGraph::new(200));
    let coordinator = Coordinator::with_source(config, graph.clone(), false).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.pages_visited, 10);
    assert_eq!(graph.fetch_counts().len(), 10);

    let storage = coordinator.database().open().unwrap();
    assert_eq!(storage.count_documents().unwrap(), 10);
}

#[tokio::test]
async fn test_deadline_drains_the_crawl() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(
        &LinkGraph::seed(),
        &temp_dir.path().join("graph.db"),
        10_000,
        2,
        "deadline = 1",
    );

    let graph = Arc::new(LinkGraph::new(5_000).with_latency(Duration::from_millis(100)));
    let coordinator = Coordinator::with_source(config, graph.clone(), false).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("deadline ends the crawl")
        .unwrap();

    assert!(summary.pages_visited > 0);
    assert!(summary.pages_visited < 5_000);
    assert!(summary.duration < Duration::from_secs(5));

    let storage = coordinator.database().open().unwrap();
    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.pages_visited, summary.pages_visited);
}

#[tokio::test]
async fn test_reindex_existing_replaces_documents() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("graph.db");

    let first = Coordinator::with_source(
        create_test_config(&LinkGraph::seed(), &db_path, 100, 2, ""),
        Arc::new(LinkGraph::new(5)),
        false,
    )
    .unwrap();
    let summary = first.run().await.unwrap();
    assert_eq!(summary.pages_visited, 5);

    let second = Coordinator::with_source(
        create_test_config(&LinkGraph::seed(), &db_path, 100, 2, "reindex-existing = true"),
        Arc::new(LinkGraph::new(5)),
        false,
    )
    .unwrap();
    let summary = second.run().await.unwrap();
    assert_eq!(summary.pages_visited, 5);
    assert_eq!(summary.pages_skipped, 0);

    let storage = second.database().open().unwrap();
    assert_eq!(storage.count_documents().unwrap(), 5);
    let states = storage.count_visits_by_state(summary.run_id).unwrap();
    assert_eq!(states.get(&PageState::Reindexed), Some(&5));

    for term in storage.get_all_terms().unwrap() {
        assert_eq!(
            term.document_frequency,
            storage.count_documents_for_term(term.id).unwrap()
        );
    }
}

#[tokio::test]
async fn test_slow_page_times_out_and_crawl_completes() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(
        &LinkGraph::seed(),
        &temp_dir.path().join("graph.db"),
        100,
        2,
        "request-timeout = 1",
    );

    let graph = Arc::new(LinkGraph::new(5).with_slow(vec![2]));
    let coordinator = Coordinator::with_source(config, graph, false).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(20), coordinator.run())
        .await
        .expect("crawl terminates")
        .unwrap();

    assert_eq!(summary.pages_visited, 4);
    assert_eq!(summary.pages_failed, 1);

    let storage = coordinator.database().open().unwrap();
    let states = storage.count_visits_by_state(summary.run_id).unwrap();
    assert_eq!(states.get(&PageState::TimedOut), Some(&1));
    assert!(storage
        .get_document_by_url("https://graph.test/p/2")
        .unwrap()
        .is_none());

    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.pages_failed, 1);
}

/// Serves `/` with a link to `/away`, which redirects to another host
struct OffsiteRedirect;

#[async_trait]
impl PageSource for OffsiteRedirect {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, TransportError> {
        let (final_url, links) = match url.path() {
            "/away" => (Url::parse("https://other.test/landing").unwrap(), vec![]),
            _ => (url.clone(), vec!["/away".to_string()]),
        };

        Ok(FetchedPage {
            status_code: 200,
            final_url,
            content_type: Some("text/html".to_string()),
            title: Some("Page".to_string()),
            paragraphs: vec![format!("words at {}", url.path())],
            links,
        })
    }
}

#[tokio::test]
async fn test_redirect_out_of_scope_is_not_indexed() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config("https://site.test/", &temp_dir.path().join("scope.db"), 100, 1, "");

    let coordinator = Coordinator::with_source(config, Arc::new(OffsiteRedirect), false).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.pages_failed, 1);

    let storage = coordinator.database().open().unwrap();
    assert_eq!(storage.count_documents().unwrap(), 1);
    assert!(storage
        .get_document_by_url("https://other.test/landing")
        .unwrap()
        .is_none());

    let states = storage.count_visits_by_state(summary.run_id).unwrap();
    assert_eq!(states.get(&PageState::OutOfScope), Some(&1));
    let visits = storage.get_visits(summary.run_id).unwrap();
    let away = visits.iter().find(|v| v.url.ends_with("/away")).unwrap();
    assert_eq!(away.state, PageState::OutOfScope);
}

/// Single-page site that deletes every run row while the page is being fetched
struct RunEraser {
    db_path: std::path::PathBuf,
}

#[async_trait]
impl PageSource for RunEraser {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, TransportError> {
        let conn = rusqlite::Connection::open(&self.db_path).unwrap();
        conn.execute("DELETE FROM crawl_runs", []).unwrap();

        Ok(FetchedPage {
            status_code: 200,
            final_url: url.clone(),
            content_type: Some("text/html".to_string()),
            title: Some("Only".to_string()),
            paragraphs: vec!["the only page".to_string()],
            links: vec![],
        })
    }
}

#[tokio::test]
async fn test_summary_survives_lost_run_record() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("lost.db");
    let config = create_test_config("https://site.test/", &db_path, 100, 1, "");

    let source = Arc::new(RunEraser {
        db_path: db_path.clone(),
    });
    let coordinator = Coordinator::with_source(config, source, false).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.pages_failed, 0);

    let storage = coordinator.database().open().unwrap();
    assert!(storage
        .get_document_by_url("https://site.test/")
        .unwrap()
        .is_some());
    assert!(matches!(
        storage.get_run(summary.run_id),
        Err(StorageError::RunNotFound(id)) if id == summary.run_id
    ));
}
