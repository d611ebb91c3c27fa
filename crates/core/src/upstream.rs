//! Interfaces of the external collaborators the pipeline calls.
//!
//! Concrete HTTP implementations live in `cag-client`; tests substitute
//! in-process stubs.

/// What a crawler returns for one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawledPage {
    pub markdown: String,
    pub title: Option<String>,
    pub status_code: Option<u16>,
    pub success: Option<bool>,
}

/// Failure reported by a crawler or model backend.
///
/// Messages never contain request URLs with credentials or raw provider
/// payloads; they are safe to show to a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("blocked: {0}")]
    Blocked(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    #[error("authentication with provider failed")]
    Auth,

    #[error("provider rate limit reached")]
    RateLimited,

    #[error("could not parse upstream response: {0}")]
    Parse(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("response exceeded {0} bytes")]
    TooLarge(usize),
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout(_))
    }
}

/// Fetches a page and renders it as markdown.
#[async_trait::async_trait]
pub trait Crawler: Send + Sync {
    async fn crawl(&self, url: &str) -> Result<CrawledPage, UpstreamError>;
}

/// Produces text for a prompt.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;
}
