//! Crawl frontier
//!
//! Shared between all crawl workers. One mutex guards the pending queue, the
//! queued/visited sets and the counters; it is never held across an await.
//! Idle workers park on a [`Notify`] instead of polling, and the frontier
//! finishes itself once nothing is pending and nothing is in flight.
//! The pending queue is capped; links discovered past the cap are dropped
//! and counted.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use url::Url;

/// Maximum number of URLs waiting in the pending queue
pub const DEFAULT_PENDING_LIMIT: usize = 100_000;

/// How a dispatched URL ended, from the frontier's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Counts toward the page limit
    Succeeded,
    /// Fetched fine but nothing new was indexed
    Skipped,
    Failed,
}

/// Result of one dispatched URL, handed back with [`Frontier::complete`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitOutcome {
    pub kind: OutcomeKind,
    /// Canonical, in-scope links discovered on the page
    pub links: Vec<Url>,
}

impl VisitOutcome {
    pub fn succeeded(links: Vec<Url>) -> Self {
        Self {
            kind: OutcomeKind::Succeeded,
            links,
        }
    }

    pub fn skipped(links: Vec<Url>) -> Self {
        Self {
            kind: OutcomeKind::Skipped,
            links,
        }
    }

    pub fn failed() -> Self {
        Self::failed_with_links(Vec::new())
    }

    /// A failed visit whose page still yielded links (e.g. no indexable text)
    pub fn failed_with_links(links: Vec<Url>) -> Self {
        Self {
            kind: OutcomeKind::Failed,
            links,
        }
    }
}

/// Snapshot of frontier counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierStats {
    pub pending: usize,
    pub visited: usize,
    pub in_flight: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Links refused because the pending queue was full
    pub dropped: u64,
}

impl FrontierStats {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.skipped
    }
}

#[derive(Debug)]
struct FrontierState {
    pending: VecDeque<Url>,
    /// URLs currently in `pending`
    queued: HashSet<String>,
    /// URLs already dispatched; never enqueued again
    visited: HashSet<String>,
    in_flight: usize,
    succeeded: u64,
    failed: u64,
    skipped: u64,
    dropped: u64,
    max_pages: u64,
    pending_limit: usize,
    draining: bool,
    finished: bool,
}

impl FrontierState {
    fn enqueue(&mut self, url: Url) -> bool {
        let key = url.as_str();
        if self.visited.contains(key) || self.queued.contains(key) {
            return false;
        }
        if self.pending.len() >= self.pending_limit {
            self.dropped += 1;
            if self.dropped == 1 {
                tracing::warn!(
                    "Pending queue is full ({} URLs); dropping newly discovered links",
                    self.pending_limit
                );
            } else {
                tracing::debug!("Pending queue full, dropped {}", key);
            }
            return false;
        }
        self.queued.insert(key.to_string());
        self.pending.push_back(url);
        true
    }

    /// No new dispatches: deadline reached or enough successes
    fn stopping(&self) -> bool {
        self.draining || self.succeeded >= self.max_pages
    }

    /// In-flight visits may all succeed, so they count against the limit
    fn can_dispatch(&self) -> bool {
        !self.draining && self.succeeded + (self.in_flight as u64) < self.max_pages
    }

    fn quiescent(&self) -> bool {
        self.in_flight == 0 && (self.pending.is_empty() || self.stopping())
    }

    fn stats(&self) -> FrontierStats {
        FrontierStats {
            pending: self.pending.len(),
            visited: self.visited.len(),
            in_flight: self.in_flight,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            dropped: self.dropped,
        }
    }
}

/// Pending queue and visited set for one crawl run
#[derive(Debug)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
}

impl Frontier {
    /// Creates an empty frontier that stops after `max_pages` successful visits
    pub fn new(max_pages: u64) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                pending: VecDeque::new(),
                queued: HashSet::new(),
                visited: HashSet::new(),
                in_flight: 0,
                succeeded: 0,
                failed: 0,
                skipped: 0,
                dropped: 0,
                max_pages,
                pending_limit: DEFAULT_PENDING_LIMIT,
                draining: false,
                finished: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Caps the pending queue at `limit` URLs
    pub fn with_pending_limit(mut self, limit: usize) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .pending_limit = limit;
        self
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a canonical URL unless it was already queued or visited, or the
    /// pending queue is full
    ///
    /// Returns true if the URL was enqueued.
    pub fn push(&self, url: Url) -> bool {
        let added = self.lock().enqueue(url);
        if added {
            self.notify.notify_waiters();
        }
        added
    }

    /// Seeds the frontier with the crawl's starting URL
    pub fn seed(&self, url: Url) -> bool {
        self.push(url)
    }

    /// Waits for the next URL to visit
    ///
    /// The URL is marked visited before it is returned, so no other worker can
    /// receive it. Returns None once the crawl is over: the frontier is
    /// quiescent, the page limit is reached, or it was drained.
    pub async fn next(&self) -> Option<Url> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a wakeup between the check and the await is not lost
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.finished {
                    return None;
                }

                if state.can_dispatch() {
                    if let Some(url) = state.pending.pop_front() {
                        state.queued.remove(url.as_str());
                        state.visited.insert(url.as_str().to_string());
                        state.in_flight += 1;
                        return Some(url);
                    }
                }

                if state.quiescent() {
                    state.finished = true;
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Reports the end of a visit handed out by [`Frontier::next`]
    ///
    /// `final_url` is the canonical URL the page was actually served from; if
    /// a redirect landed on another URL, that URL is marked visited too.
    pub fn complete(&self, final_url: Option<&Url>, outcome: VisitOutcome) -> FrontierStats {
        let stats = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);

            if let Some(final_url) = final_url {
                let key = final_url.as_str();
                if !state.visited.contains(key) {
                    state.visited.insert(key.to_string());
                    if state.queued.remove(key) {
                        state.pending.retain(|queued| queued.as_str() != key);
                    }
                }
            }

            match outcome.kind {
                OutcomeKind::Succeeded => state.succeeded += 1,
                OutcomeKind::Skipped => state.skipped += 1,
                OutcomeKind::Failed => state.failed += 1,
            }

            if !state.stopping() {
                for link in outcome.links {
                    state.enqueue(link);
                }
            }

            if state.quiescent() {
                state.finished = true;
            }

            state.stats()
        };

        self.notify.notify_waiters();
        stats
    }

    /// Stops new dispatches; visits already in flight may still complete
    pub fn drain(&self) {
        {
            let mut state = self.lock();
            state.draining = true;
            if state.in_flight == 0 {
                state.finished = true;
            }
        }
        self.notify.notify_waiters();
    }

    /// Ends the crawl immediately and releases every waiting worker
    ///
    /// Used when a worker died and its in-flight visit will never complete.
    pub fn close(&self) {
        self.lock().finished = true;
        self.notify.notify_waiters();
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.lock().visited.contains(url.as_str())
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    pub fn stats(&self) -> FrontierStats {
        self.lock().stats()
    }
}
