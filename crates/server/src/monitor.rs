//! Request and cache metrics for the admin surface.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;

use cag_core::Namespace;

use crate::state::AppState;

/// Latencies kept for the recent average.
const RECENT_WINDOW: usize = 100;

#[derive(Debug, Default)]
struct RouteStats {
    count: u64,
    errors: u64,
    total: f64,
    min: f64,
    max: f64,
    recent: VecDeque<f64>,
}

impl RouteStats {
    fn add(&mut self, secs: f64, failed: bool) {
        self.min = if self.count == 0 { secs } else { self.min.min(secs) };
        self.max = self.max.max(secs);
        self.count += 1;
        self.total += secs;
        if failed {
            self.errors += 1;
        }
        if self.recent.len() == RECENT_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(secs);
    }

    fn summary(&self) -> RouteSummary {
        let recent_avg =
            if self.recent.is_empty() { 0.0 } else { self.recent.iter().sum::<f64>() / self.recent.len() as f64 };
        RouteSummary {
            count: self.count,
            errors: self.errors,
            avg_time: round(self.total / self.count.max(1) as f64, 3),
            min_time: round(self.min, 3),
            max_time: round(self.max, 3),
            recent_avg_time: round(recent_avg, 3),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct HitMiss {
    hits: u64,
    misses: u64,
}

impl HitMiss {
    fn summary(self) -> CacheSummary {
        let total = self.hits + self.misses;
        let hit_rate = if total == 0 { 0.0 } else { self.hits as f64 / total as f64 * 100.0 };
        CacheSummary { hits: self.hits, misses: self.misses, hit_rate: round(hit_rate, 2) }
    }
}

#[derive(Debug)]
struct Inner {
    started: Instant,
    started_at: DateTime<Utc>,
    routes: BTreeMap<String, RouteStats>,
    errors: BTreeMap<String, u64>,
    crawl: HitMiss,
    llm: HitMiss,
}

impl Inner {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            routes: BTreeMap::new(),
            errors: BTreeMap::new(),
            crawl: HitMiss::default(),
            llm: HitMiss::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub count: u64,
    pub errors: u64,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
    pub recent_avg_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSummary {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Point-in-time view returned by `GET /admin/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub uptime_formatted: String,
    pub started_at: DateTime<Utc>,
    pub total_requests: u64,
    pub routes: BTreeMap<String, RouteSummary>,
    pub cache_stats: BTreeMap<&'static str, CacheSummary>,
    pub errors: BTreeMap<String, u64>,
    pub tracked_clients: usize,
    pub timestamp: DateTime<Utc>,
}

/// Process-local request monitor.
#[derive(Debug)]
pub struct Monitor {
    inner: Mutex<Inner>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one finished request. 4xx and 5xx responses count as errors.
    pub fn record_request(&self, route: &str, elapsed: Duration, status: StatusCode) {
        let failed = status.is_client_error() || status.is_server_error();
        let mut inner = self.lock();
        inner.routes.entry(route.to_string()).or_default().add(elapsed.as_secs_f64(), failed);
        if failed {
            *inner.errors.entry(format!("{route} {}", status.as_u16())).or_default() += 1;
        }
        tracing::debug!(route, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "recorded request");
    }

    pub fn record_cache(&self, namespace: Namespace, hit: bool) {
        let mut inner = self.lock();
        let counter = match namespace {
            Namespace::Crawl => &mut inner.crawl,
            Namespace::Llm => &mut inner.llm,
            Namespace::History => return,
        };
        if hit {
            counter.hits += 1;
        } else {
            counter.misses += 1;
        }
    }

    pub fn snapshot(&self, tracked_clients: usize) -> MetricsSnapshot {
        let inner = self.lock();
        let uptime = inner.started.elapsed().as_secs_f64();
        MetricsSnapshot {
            uptime_seconds: round(uptime, 2),
            uptime_formatted: format_uptime(uptime as u64),
            started_at: inner.started_at,
            total_requests: inner.routes.values().map(|r| r.count).sum(),
            routes: inner.routes.iter().map(|(k, v)| (k.clone(), v.summary())).collect(),
            cache_stats: BTreeMap::from([("crawl_cache", inner.crawl.summary()), ("llm_cache", inner.llm.summary())]),
            errors: inner.errors.clone(),
            tracked_clients,
            timestamp: Utc::now(),
        }
    }

    /// Clear every counter and restart the uptime clock.
    pub fn reset(&self) {
        *self.lock() = Inner::new();
        tracing::info!("metrics reset");
    }
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn format_uptime(secs: u64) -> String {
    let (days, hours, minutes, seconds) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60, secs % 60);
    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Middleware timing every matched route.
pub async fn track(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let route = format!("{} {route}", request.method());

    let start = Instant::now();
    let response = next.run(request).await;
    state.monitor.record_request(&route, start.elapsed(), response.status());
    response
}
