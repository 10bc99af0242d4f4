use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Seek
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// URL the crawl starts from
    #[serde(rename = "seed-url")]
    pub seed_url: String,

    /// Number of successful page visits after which the crawl stops
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Number of crawl workers
    pub concurrency: u32,

    /// Lower bound of the delay between two requests to the same origin (milliseconds)
    #[serde(rename = "politeness-delay-min", default = "default_politeness_delay_min")]
    pub politeness_delay_min: u64,

    /// Upper bound of the jittered politeness delay (milliseconds)
    #[serde(rename = "politeness-delay-max", default = "default_politeness_delay_max")]
    pub politeness_delay_max: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Maximum redirect hops followed for a single fetch
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Optional wall-clock budget for the whole run (seconds)
    #[serde(default)]
    pub deadline: Option<u64>,

    /// Re-index pages whose URL is already in the index instead of rejecting them
    #[serde(rename = "reindex-existing", default)]
    pub reindex_existing: bool,
}

fn default_politeness_delay_min() -> u64 {
    500
}

fn default_politeness_delay_max() -> u64 {
    2000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_redirects() -> u32 {
    10
}

impl CrawlerConfig {
    /// Returns the jittered politeness delay range
    pub fn politeness_delay(&self) -> PolitenessDelay {
        PolitenessDelay {
            min: Duration::from_millis(self.politeness_delay_min),
            max: Duration::from_millis(self.politeness_delay_max),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline.map(Duration::from_secs)
    }
}

/// Inclusive range the per-origin delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolitenessDelay {
    pub min: Duration,
    pub max: Duration,
}

impl PolitenessDelay {
    /// A delay of zero, used by tests and local crawls
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Which discovered links the crawler is allowed to follow
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeConfig {
    /// Domain patterns (e.g., "example.com" or "*.example.com"); empty means the seed host only
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Path prefixes a link must start with; empty means any path
    #[serde(rename = "path-prefixes", default)]
    pub path_prefixes: Vec<String>,
}

/// Query service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address the query service binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}
