use std::time::{Duration, Instant};

/// Tracks the pacing of one origin as seen by a single crawl worker
///
/// Each worker keeps its own map of these, so politeness is enforced per
/// worker rather than through a global lock.
#[derive(Debug, Clone, Default)]
pub struct OriginState {
    /// Number of requests this worker has made to the origin
    pub request_count: u32,

    /// When the last request to this origin was started
    pub last_request_time: Option<Instant>,

    /// Jittered spacing required before the next request
    pub next_delay: Duration,
}

impl OriginState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates how long to wait before the next request may start
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.next_delay).then(|| self.next_delay - elapsed)
    }

    /// Records a request started at `now`, and the delay the following one must respect
    pub fn record_request(&mut self, now: Instant, next_delay: Duration) {
        self.request_count += 1;
        self.last_request_time = Some(now);
        self.next_delay = next_delay;
    }
}
