//! Page source and HTTP fetcher
//!
//! The crawler only sees pages through the [`PageSource`] trait. The HTTP
//! implementation:
//! - Builds a client with the configured user agent and request timeout
//! - Follows redirects manually, up to a hop limit, with loop detection
//! - Parses HTML bodies into title, paragraphs and raw link targets
//! - Classifies transport failures

use crate::config::{Config, UserAgentConfig};
use crate::crawler::parser::parse_html;
use crate::state::PageState;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Fetch failures that produced no HTTP response to interpret
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Too many redirects from {url} (limit {limit})")]
    TooManyRedirects { url: String, limit: u32 },

    #[error("Redirect loop detected at {url}")]
    RedirectLoop { url: String },

    #[error("Invalid redirect from {url} to '{location}'")]
    InvalidRedirect { url: String, location: String },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl TransportError {
    /// The visit outcome recorded for this failure
    pub fn page_state(&self) -> PageState {
        match self {
            Self::Timeout { .. } => PageState::TimedOut,
            Self::TooManyRedirects { .. }
            | Self::RedirectLoop { .. }
            | Self::InvalidRedirect { .. } => PageState::RedirectFailed,
            Self::Connect { .. } | Self::Http { .. } | Self::ClientBuild(_) => {
                PageState::Unreachable
            }
        }
    }

    fn from_reqwest(url: &Url, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_connect() {
            Self::Connect {
                url,
                message: err.to_string(),
            }
        } else {
            Self::Http { url, source: err }
        }
    }
}

/// What a page source returns for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status_code: u16,

    /// URL the content was served from, after redirects
    pub final_url: Url,

    pub content_type: Option<String>,
    pub title: Option<String>,
    pub paragraphs: Vec<String>,

    /// Raw link targets, to be resolved against `final_url`
    pub links: Vec<String>,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// True when the response is HTML, or does not say what it is
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            None => true,
            Some(content_type) => {
                let content_type = content_type.to_ascii_lowercase();
                content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
            }
        }
    }

    /// The indexed content: paragraph texts joined by newlines
    pub fn content(&self) -> String {
        self.paragraphs.join("\n")
    }
}

/// Source of crawled pages
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, TransportError>;
}

/// Builds an HTTP client with the crawler's identity
///
/// Redirects are disabled on the client; [`HttpPageSource`] follows them itself.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sumi_seek::config::UserAgentConfig;
/// use sumi_seek::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiSeek".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    request_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(request_timeout)
        .connect_timeout(request_timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages over HTTP
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
    max_redirects: u32,
}

impl HttpPageSource {
    pub fn new(client: Client, max_redirects: u32) -> Self {
        Self {
            client,
            max_redirects,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let client = build_http_client(&config.user_agent, config.crawler.request_timeout())
            .map_err(TransportError::ClientBuild)?;
        Ok(Self::new(client, config.crawler.max_redirects))
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    /// Fetches a URL, following up to `max_redirects` hops
    ///
    /// Non-2xx final responses are returned as pages (with no content) so the
    /// caller can classify them; only failures without a usable response are errors.
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, TransportError> {
        let mut current = url.clone();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(current.to_string());

        for _ in 0..=self.max_redirects {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| TransportError::from_reqwest(&current, e))?;

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();

                let next = current
                    .join(&location)
                    .ok()
                    .filter(|next| next.scheme() == "http" || next.scheme() == "https")
                    .ok_or_else(|| TransportError::InvalidRedirect {
                        url: current.to_string(),
                        location: location.clone(),
                    })?;

                if !seen.insert(next.to_string()) {
                    return Err(TransportError::RedirectLoop {
                        url: next.to_string(),
                    });
                }

                tracing::debug!("Redirect {} -> {}", current, next);
                current = next;
                continue;
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let mut page = FetchedPage {
                status_code: status.as_u16(),
                final_url: current.clone(),
                content_type,
                title: None,
                paragraphs: Vec::new(),
                links: Vec::new(),
            };

            if !page.is_success() || !page.is_html() {
                return Ok(page);
            }

            let body = response
                .text()
                .await
                .map_err(|e| TransportError::from_reqwest(&current, e))?;

            let parsed = parse_html(&body);
            page.title = parsed.title;
            page.paragraphs = parsed.paragraphs;
            page.links = parsed.links;

            return Ok(page);
        }

        Err(TransportError::TooManyRedirects {
            url: url.to_string(),
            limit: self.max_redirects,
        })
    }
}
