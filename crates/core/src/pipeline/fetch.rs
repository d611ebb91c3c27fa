//! Cache-or-crawl stage.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run_detached;
use crate::Error;
use crate::cache::{Coalescer, KeyedCache};
use crate::upstream::{CrawledPage, Crawler, UpstreamError};

/// One crawled page as returned by [`FetchStage::fetch`].
///
/// `served_from_cache` and `cached_at` describe how this particular call was
/// satisfied and are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub markdown: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub status_code: u16,
    pub success: bool,
    #[serde(skip)]
    pub served_from_cache: bool,
    #[serde(skip)]
    pub cached_at: Option<DateTime<Utc>>,
}

impl CrawlResult {
    fn from_page(url: String, page: CrawledPage) -> Self {
        Self {
            url,
            markdown: page.markdown,
            title: page.title.unwrap_or_default(),
            timestamp: Utc::now(),
            status_code: page.status_code.unwrap_or(200),
            success: page.success.unwrap_or(true),
            served_from_cache: false,
            cached_at: None,
        }
    }
}

type CrawlOutcome = Result<CrawlResult, UpstreamError>;

/// Wraps a [`Crawler`] behind the crawl cache.
#[derive(Clone)]
pub struct FetchStage {
    crawler: Arc<dyn Crawler>,
    cache: KeyedCache<CrawlResult>,
    timeout: Duration,
    single_flight: Option<Coalescer<CrawlOutcome>>,
}

impl FetchStage {
    pub fn new(crawler: Arc<dyn Crawler>, cache: KeyedCache<CrawlResult>, timeout: Duration) -> Self {
        Self { crawler, cache, timeout, single_flight: None }
    }

    /// Share one crawl between concurrent misses on the same URL.
    pub fn with_single_flight(mut self) -> Self {
        self.single_flight = Some(Coalescer::new());
        self
    }

    pub fn cache(&self) -> &KeyedCache<CrawlResult> {
        &self.cache
    }

    /// Return the page for `url`, from cache when allowed.
    ///
    /// A miss calls the crawler exactly once and always writes the result
    /// back, even when `use_cache` is false.
    pub async fn fetch(&self, url: &str, use_cache: bool) -> Result<CrawlResult, Error> {
        if use_cache && let Some(entry) = self.cache.get(url).await {
            tracing::debug!(url, cached_at = %entry.created_at, "crawl served from cache");
            let mut result = entry.payload;
            result.served_from_cache = true;
            result.cached_at = Some(entry.created_at);
            return Ok(result);
        }

        let crawler = Arc::clone(&self.crawler);
        let cache = self.cache.clone();
        let timeout = self.timeout;
        let target = url.to_string();

        let work = async move {
            let started = std::time::Instant::now();
            let page = match tokio::time::timeout(timeout, crawler.crawl(&target)).await {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    tracing::warn!(url = %target, error = %e, "crawl failed");
                    return Err(e);
                }
                Err(_) => {
                    tracing::warn!(url = %target, timeout_ms = timeout.as_millis() as u64, "crawl timed out");
                    return Err(UpstreamError::Timeout(timeout.as_millis() as u64));
                }
            };

            let result = CrawlResult::from_page(target.clone(), page);
            tracing::info!(
                url = %target,
                status = result.status_code,
                bytes = result.markdown.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "crawled page"
            );
            cache.set(&target, result.clone()).await;
            Ok(result)
        };

        let key = self.cache.key(url);
        run_detached(self.single_flight.as_ref(), &key, work)
            .await
            .unwrap_or_else(|| Err(UpstreamError::Provider("crawl task aborted".into())))
            .map_err(Error::FetchFailed)
    }
}
