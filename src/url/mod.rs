//! URL handling for Sumi-Seek
//!
//! Every URL the crawler compares, records or indexes goes through the same
//! canonicalization rule in [`normalize_url`] / [`resolve_href`].

mod domain;
mod normalize;
mod scope;

pub use domain::{extract_domain, origin_key};
pub use normalize::{normalize_url, resolve_href};
pub use scope::{matches_wildcard, CrawlScope};
