//! Per-worker politeness pacing
//!
//! Each crawl worker owns a [`Pacer`]. Consecutive requests a worker makes to
//! the same origin are spaced by a delay drawn uniformly from the configured
//! range; different workers are never serialized against each other.

use crate::config::PolitenessDelay;
use crate::state::OriginState;
use crate::url::origin_key;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug)]
pub struct Pacer {
    delay: PolitenessDelay,
    origins: HashMap<String, OriginState>,
}

impl Pacer {
    pub fn new(delay: PolitenessDelay) -> Self {
        Self {
            delay,
            origins: HashMap::new(),
        }
    }

    /// Draws the jittered spacing for the next request
    fn draw_delay(&self) -> Duration {
        if self.delay.max <= self.delay.min {
            return self.delay.min;
        }
        rand::thread_rng().gen_range(self.delay.min..=self.delay.max)
    }

    /// How long a request to `url` would have to wait right now
    pub fn wait_time(&self, url: &Url, now: Instant) -> Option<Duration> {
        self.origins
            .get(&origin_key(url))
            .and_then(|state| state.time_until_next_request(now))
    }

    /// Sleeps until this worker may request `url`, then records the request
    pub async fn wait_turn(&mut self, url: &Url) {
        let next_delay = self.draw_delay();
        let state = self.origins.entry(origin_key(url)).or_default();

        if let Some(wait) = state.time_until_next_request(Instant::now()) {
            tracing::debug!("Waiting {:?} before requesting {}", wait, url);
            tokio::time::sleep(wait).await;
        }

        state.record_request(Instant::now(), next_delay);
    }

    pub fn requests_to(&self, url: &Url) -> u32 {
        self.origins
            .get(&origin_key(url))
            .map_or(0, |state| state.request_count)
    }
}
