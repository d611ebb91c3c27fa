//! HTTP crawler that turns a page into markdown.
//!
//! ### Safety Gates
//! - Every redirect hop is re-checked by the URL guard; at most 5 hops.
//! - Optionally resolves the host and rejects private/reserved answers.
//! - Body size capped by `max_bytes`, checked against `Content-Length`
//!   first and again while streaming.
//!
//! ### Conversion
//! - `text/html` (or no content type) goes through [`html_to_markdown`].
//! - Other `text/*` bodies pass through unchanged.
//! - Anything else is reported as a parse failure.
//!
//! Callers are expected to have validated the initial URL already; the
//! crawler re-validates only what the caller cannot see (redirect targets and
//! DNS answers).

pub mod markdown;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use reqwest::{Client, Response, header, redirect};
use tokio::net::lookup_host;
use url::{Host, Url};

use cag_core::guard::{UrlGuard, validate_ip};
use cag_core::{AppConfig, CrawledPage, Crawler, UpstreamError};

pub use markdown::{ConvertedPage, html_to_markdown};

const ACCEPT: &str = "text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.5";

/// Configuration for the crawler.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// User agent string (default: "cag-gateway/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Resolve hostnames and reject private answers (default: true)
    pub resolve_dns: bool,

    /// Extra hostnames rejected on redirect.
    pub denylist: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: "cag-gateway/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            resolve_dns: true,
            denylist: Vec::new(),
        }
    }
}

impl CrawlConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.crawl_timeout(),
            resolve_dns: config.resolve_dns,
            denylist: config.denylist_domains.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum BodyKind {
    Html,
    Text,
    Unsupported(String),
}

fn classify(content_type: Option<&str>) -> BodyKind {
    let Some(content_type) = content_type else {
        return BodyKind::Html;
    };
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_lowercase();
    match mime.as_str() {
        "" | "text/html" | "application/xhtml+xml" => BodyKind::Html,
        m if m.starts_with("text/") => BodyKind::Text,
        _ => BodyKind::Unsupported(mime),
    }
}

/// HTTP crawler with redirect, DNS and size checks.
#[derive(Debug, Clone)]
pub struct HttpCrawler {
    http: Client,
    config: CrawlConfig,
}

impl HttpCrawler {
    /// Create a new crawler with the given configuration.
    pub fn new(config: CrawlConfig) -> Result<Self, UpstreamError> {
        let guard = Arc::new(UrlGuard::new(&config.denylist));
        let max_redirects = config.max_redirects;

        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                return attempt.error(format!("too many redirects (max {max_redirects})"));
            }
            match guard.validate(attempt.url().as_str()) {
                Ok(_) => attempt.follow(),
                Err(rejection) => attempt.error(rejection.to_string()),
            }
        });

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(policy)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| UpstreamError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn map_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout_ms())
        } else if err.is_redirect() {
            UpstreamError::Blocked(err.without_url().to_string())
        } else {
            UpstreamError::Network(err.without_url().to_string())
        }
    }

    /// Resolve a domain host and reject it if any answer is private.
    async fn check_dns(&self, url: &Url) -> Result<(), UpstreamError> {
        let Some(Host::Domain(domain)) = url.host() else {
            return Ok(());
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let addrs = tokio::time::timeout(self.config.timeout, lookup_host((domain, port)))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout_ms()))?
            .map_err(|e| UpstreamError::Network(format!("DNS lookup failed for {domain}: {e}")))?;

        let mut resolved = false;
        for addr in addrs {
            resolved = true;
            validate_ip(addr.ip()).map_err(|e| {
                tracing::warn!(host = %domain, error = %e, "host resolved to blocked address");
                UpstreamError::Blocked(e.to_string())
            })?;
        }

        if resolved { Ok(()) } else { Err(UpstreamError::Network(format!("no addresses found for {domain}"))) }
    }

    async fn read_body(&self, mut response: Response) -> Result<BytesMut, UpstreamError> {
        let max = self.config.max_bytes;
        if let Some(len) = response.content_length()
            && len as usize > max
        {
            return Err(UpstreamError::TooLarge(max));
        }

        let capacity = response.content_length().map_or(8 * 1024, |len| len as usize);
        let mut body = BytesMut::with_capacity(capacity.min(max));
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            if body.len() + chunk.len() > max {
                return Err(UpstreamError::TooLarge(max));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl Crawler for HttpCrawler {
    async fn crawl(&self, url: &str) -> Result<CrawledPage, UpstreamError> {
        let start = Instant::now();
        let url = Url::parse(url).map_err(|e| UpstreamError::Blocked(format!("invalid URL: {e}")))?;

        if self.config.resolve_dns {
            self.check_dns(&url).await?;
        }

        let response = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = self.read_body(response).await?;
        let text = String::from_utf8_lossy(&body);

        let (markdown, title) = match classify(content_type.as_deref()) {
            BodyKind::Html => {
                let page = html_to_markdown(&text, &final_url);
                (page.markdown, page.title)
            }
            BodyKind::Text => (text.trim().to_string(), None),
            BodyKind::Unsupported(_) if !status.is_success() => (String::new(), None),
            BodyKind::Unsupported(mime) => {
                return Err(UpstreamError::Parse(format!("unsupported content type: {mime}")));
            }
        };

        tracing::debug!(
            "crawled {} -> {} in {}ms ({} bytes, status {})",
            url,
            final_url,
            start.elapsed().as_millis(),
            body.len(),
            status.as_u16()
        );

        Ok(CrawledPage {
            markdown,
            title,
            status_code: Some(status.as_u16()),
            success: Some(status.is_success()),
        })
    }
}
