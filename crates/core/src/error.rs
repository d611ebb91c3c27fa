//! Unified error types for the CAG gateway.
//!
//! Every variant renders with a stable upper-case code prefix. The HTTP layer
//! maps [`Error::code`] onto a status code and never forwards raw upstream text
//! for storage failures.

use tokio_rusqlite::rusqlite;

use crate::upstream::UpstreamError;

/// Unified error types for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input rejected by a guard before any stage ran.
    #[error("VALIDATION_FAILED: {0}")]
    ValidationFailed(String),

    /// The caller exhausted its quota for the current window.
    #[error("RATE_LIMITED: {reason}")]
    RateLimited { reason: String, retry_after: u64 },

    /// The crawler failed or timed out.
    #[error("FETCH_FAILED: {0}")]
    FetchFailed(UpstreamError),

    /// The language model failed or timed out.
    #[error("GENERATE_FAILED: {0}")]
    GenerateFailed(UpstreamError),

    /// Cache read/write failed. Absorbed by `KeyedCache`, never surfaced by a stage.
    #[error("CACHE_UNAVAILABLE: {0}")]
    CacheUnavailable(String),

    /// History read/write failed.
    #[error("HISTORY_UNAVAILABLE: {0}")]
    HistoryUnavailable(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A non-SQLite backing store could not serve the request.
    #[error("STORE_ERROR: {0}")]
    StoreUnavailable(String),

    /// A stored payload could not be encoded or decoded.
    #[error("SERIALIZATION_FAILED: {0}")]
    Serialization(String),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ValidationFailed(_) => "VALIDATION_FAILED",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::FetchFailed(_) => "FETCH_FAILED",
            Error::GenerateFailed(_) => "GENERATE_FAILED",
            Error::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
            Error::HistoryUnavailable(_) => "HISTORY_UNAVAILABLE",
            Error::Database(_) | Error::MigrationFailed(_) | Error::StoreUnavailable(_) => "STORE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_FAILED",
        }
    }

    /// Seconds the caller should wait before retrying, for rate-limit rejections.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// True when an upstream call ran out of time rather than failing outright.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::FetchFailed(e) | Error::GenerateFailed(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Message that is safe to hand to an HTTP client.
    ///
    /// Validation, rate-limit and upstream messages are built by this crate
    /// from sanitized parts; storage internals are replaced by a generic line.
    pub fn public_message(&self) -> String {
        match self {
            Error::ValidationFailed(msg) => msg.clone(),
            Error::FetchFailed(e) => format!("Failed to fetch page: {e}"),
            Error::GenerateFailed(e) => format!("Failed to generate response: {e}"),
            Error::RateLimited { reason, .. } => reason.clone(),
            Error::CacheUnavailable(_) => "cache unavailable".to_string(),
            Error::HistoryUnavailable(_) => "history unavailable".to_string(),
            Error::Database(_) | Error::MigrationFailed(_) | Error::StoreUnavailable(_) => {
                "storage unavailable".to_string()
            }
            Error::Serialization(_) => "internal serialization error".to_string(),
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
