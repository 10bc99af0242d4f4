use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_seek::url::extract_domain;
///
/// let url = Url::parse("https://EN.Wikipedia.org/wiki/Cat").unwrap();
/// assert_eq!(extract_domain(&url), Some("en.wikipedia.org".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the origin key (`scheme://host[:port]`) politeness is tracked under
///
/// Two URLs share an origin only when scheme, host and effective port agree, so
/// `http://example.com` and `https://example.com` are paced independently.
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}
