use crate::config::ScopeConfig;
use url::Url;

/// Checks if a domain matches a pattern
///
/// `"example.com"` matches only itself; `"*.example.com"` matches the bare
/// domain and any subdomain at any depth.
///
/// # Examples
///
/// ```
/// use sumi_seek::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.wikipedia.org", "en.wikipedia.org"));
/// assert!(matches_wildcard("*.wikipedia.org", "wikipedia.org"));
/// assert!(!matches_wildcard("*.wikipedia.org", "notwikipedia.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .map_or(false, |head| head.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Decides which discovered links the crawler follows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlScope {
    domains: Vec<String>,
    path_prefixes: Vec<String>,
}

impl CrawlScope {
    /// Builds the scope from configuration
    ///
    /// An empty domain list restricts the crawl to the seed's own host.
    pub fn from_config(config: &ScopeConfig, seed: &Url) -> Self {
        let domains = if config.allowed_domains.is_empty() {
            seed.host_str()
                .map(|host| vec![host.to_lowercase()])
                .unwrap_or_default()
        } else {
            config
                .allowed_domains
                .iter()
                .map(|pattern| pattern.to_lowercase())
                .collect()
        };

        Self {
            domains,
            path_prefixes: config.path_prefixes.clone(),
        }
    }

    /// Scope that accepts only URLs on the seed's host
    pub fn seed_host(seed: &Url) -> Self {
        Self::from_config(&ScopeConfig::default(), seed)
    }

    /// Returns true if the crawler may visit `url`
    pub fn allows(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();

        let domain_ok = self
            .domains
            .iter()
            .any(|pattern| matches_wildcard(pattern, &host));
        if !domain_ok {
            return false;
        }

        self.path_prefixes.is_empty()
            || self
                .path_prefixes
                .iter()
                .any(|prefix| url.path().starts_with(prefix.as_str()))
    }
}
