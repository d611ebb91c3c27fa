//! HTTP error responses for the gateway.
//!
//! Every failure leaves as `{error, message, retry_after?}` JSON with a status
//! chosen from the core error code.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use cag_core::Error;

/// Errors returned by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A failure from the CAG core.
    #[error(transparent)]
    Core(#[from] Error),

    /// Malformed request body or query string.
    #[error("BAD_REQUEST: {0}")]
    BadRequest(String),

    /// The addressed resource does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => match e {
                Error::ValidationFailed(_) => StatusCode::BAD_REQUEST,
                Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                Error::FetchFailed(_) | Error::GenerateFailed(_) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
                Error::FetchFailed(_) | Error::GenerateFailed(_) => StatusCode::BAD_GATEWAY,
                Error::CacheUnavailable(_) | Error::HistoryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::Database(_) | Error::MigrationFailed(_) | Error::StoreUnavailable(_) | Error::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Core(e) => e.code(),
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Core(e) => ErrorBody { error: e.code(), message: e.public_message(), retry_after: e.retry_after() },
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => {
                ErrorBody { error: self.code(), message: msg.clone(), retry_after: None }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }

        let body = self.body();
        let retry_after = body.retry_after;
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
