//! Gemini client error types.

use std::sync::Arc;

use cag_core::UpstreamError;

/// Errors from the Gemini generation client.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    /// No API key configured.
    #[error("missing API key: CAG_GOOGLE_API_KEY not set")]
    MissingApiKey,

    /// Prompt rejected before sending.
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    /// Authentication failed (invalid API key).
    #[error("authentication failed: invalid API key")]
    AuthError,

    /// Rate limited by the provider.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout, in milliseconds.
    #[error("request timeout after {0}ms")]
    Timeout(u64),

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Prompt refused by the provider's safety filters.
    #[error("prompt blocked: {0}")]
    Blocked(String),

    /// The model returned no text.
    #[error("empty response (finish reason: {})", .0.as_deref().unwrap_or("unknown"))]
    EmptyResponse(Option<String>),
}

impl From<GeminiError> for UpstreamError {
    fn from(err: GeminiError) -> Self {
        match err {
            GeminiError::AuthError => UpstreamError::Auth,
            GeminiError::RateLimited => UpstreamError::RateLimited,
            GeminiError::HttpError { status } => UpstreamError::Status { status },
            GeminiError::Timeout(ms) => UpstreamError::Timeout(ms),
            GeminiError::Network(e) => UpstreamError::Network(e.to_string()),
            GeminiError::Parse(msg) => UpstreamError::Parse(msg),
            other @ (GeminiError::MissingApiKey
            | GeminiError::InvalidPrompt(_)
            | GeminiError::Blocked(_)
            | GeminiError::EmptyResponse(_)) => UpstreamError::Provider(other.to_string()),
        }
    }
}
