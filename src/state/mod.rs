//! State tracked while crawling
//!
//! - `PageState`: how the visit of a URL ended, persisted in the visit log
//! - `OriginState`: per-origin pacing kept by each crawl worker

mod origin_state;
mod page_state;

pub use origin_state::OriginState;
pub use page_state::PageState;
