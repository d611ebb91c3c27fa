//! Per-client sliding-window admission control.
//!
//! Each client key owns two 60-second windows: one counting every limited
//! request and one counting only expensive ones. The check and the append run
//! under the client's DashMap shard lock, so two concurrent requests can never
//! both slip past the last free slot.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::Error;
use crate::config::AppConfig;

/// Width of both sliding windows.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Seconds a rejected caller is told to wait.
pub const RETRY_AFTER_SECS: u64 = 60;

/// Which quota a route draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    /// Counted against the general window only.
    General,
    /// Crawl-like work; counted against both windows.
    Expensive,
}

/// Timestamps of admitted requests for one client.
#[derive(Debug, Default)]
pub struct RateWindow {
    general: VecDeque<Instant>,
    expensive: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(WINDOW) else {
            return;
        };
        while self.general.front().is_some_and(|t| *t <= cutoff) {
            self.general.pop_front();
        }
        while self.expensive.front().is_some_and(|t| *t <= cutoff) {
            self.expensive.pop_front();
        }
    }

    fn is_idle(&self) -> bool {
        self.general.is_empty() && self.expensive.is_empty()
    }
}

/// In-memory, single-process rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    general_limit: usize,
    expensive_limit: usize,
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new(general_per_minute: u32, expensive_per_minute: u32) -> Self {
        Self {
            general_limit: general_per_minute as usize,
            expensive_limit: expensive_per_minute as usize,
            windows: DashMap::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.general_per_minute, config.expensive_per_minute)
    }

    /// Admit or reject a request from `client` now.
    pub fn check(&self, client: &str, class: EndpointClass) -> Result<(), Error> {
        self.check_at(client, class, Instant::now())
    }

    /// Admit or reject a request from `client` at `now`.
    ///
    /// Rejected requests are not recorded.
    pub fn check_at(&self, client: &str, class: EndpointClass, now: Instant) -> Result<(), Error> {
        let mut window = self.windows.entry(client.to_string()).or_default();
        window.prune(now);

        if class == EndpointClass::Expensive && window.expensive.len() >= self.expensive_limit {
            tracing::warn!(client, limit = self.expensive_limit, "expensive rate limit exceeded");
            return Err(Error::RateLimited {
                reason: format!("Rate limit exceeded for expensive endpoints: {}/minute", self.expensive_limit),
                retry_after: RETRY_AFTER_SECS,
            });
        }

        if window.general.len() >= self.general_limit {
            tracing::warn!(client, limit = self.general_limit, "rate limit exceeded");
            return Err(Error::RateLimited {
                reason: format!("Rate limit exceeded: {}/minute", self.general_limit),
                retry_after: RETRY_AFTER_SECS,
            });
        }

        window.general.push_back(now);
        if class == EndpointClass::Expensive {
            window.expensive.push_back(now);
            tracing::info!(client, "expensive endpoint admitted");
        }
        Ok(())
    }

    /// Drop clients with no requests left in their windows.
    ///
    /// Returns the number of clients still tracked.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        self.windows.retain(|_, window| {
            window.prune(now);
            !window.is_idle()
        });
        self.windows.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
