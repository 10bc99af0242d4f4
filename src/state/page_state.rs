/// Outcome of a single page visit, as recorded in the visit log
use std::fmt;

/// Represents how the visit of one canonical URL ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    // ===== Success States =====
    /// Page was fetched and its document indexed for the first time
    Indexed,

    /// Page was already indexed and its document was replaced
    Reindexed,

    // ===== Skip States =====
    /// Page URL already has a document and re-indexing was not requested
    AlreadyIndexed,

    // ===== Error States =====
    /// Page had no extractable paragraph text
    NoContent,

    /// Response Content-Type is not HTML
    ContentMismatch,

    /// Page returned HTTP 404 or 410
    DeadLink,

    /// Page returned another 4xx or 5xx status
    HttpError,

    /// Connection, DNS or TLS failure
    Unreachable,

    /// Request exceeded the per-request timeout
    TimedOut,

    /// Redirect chain was too long, looped, or pointed somewhere invalid
    RedirectFailed,

    /// Redirect landed on a URL the crawl scope does not allow
    OutOfScope,

    /// Indexing the page failed in the storage layer
    StorageFailed,
}

impl PageState {
    /// Returns true if this visit counts toward the crawl's page limit
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Indexed | Self::Reindexed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::AlreadyIndexed)
    }

    pub fn is_error(&self) -> bool {
        !self.is_success() && !self.is_skipped()
    }

    /// Converts the page state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Indexed => "indexed",
            Self::Reindexed => "reindexed",
            Self::AlreadyIndexed => "already_indexed",
            Self::NoContent => "no_content",
            Self::ContentMismatch => "content_mismatch",
            Self::DeadLink => "dead_link",
            Self::HttpError => "http_error",
            Self::Unreachable => "unreachable",
            Self::TimedOut => "timed_out",
            Self::RedirectFailed => "redirect_failed",
            Self::OutOfScope => "out_of_scope",
            Self::StorageFailed => "storage_failed",
        }
    }

    /// Parses a page state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::all_states()
            .into_iter()
            .find(|state| state.to_db_string() == s)
    }

    /// Classifies a non-success HTTP status
    pub fn from_http_status(status: u16) -> Self {
        match status {
            404 | 410 => Self::DeadLink,
            _ => Self::HttpError,
        }
    }

    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Indexed,
            Self::Reindexed,
            Self::AlreadyIndexed,
            Self::NoContent,
            Self::ContentMismatch,
            Self::DeadLink,
            Self::HttpError,
            Self::Unreachable,
            Self::TimedOut,
            Self::RedirectFailed,
            Self::OutOfScope,
            Self::StorageFailed,
        ]
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
