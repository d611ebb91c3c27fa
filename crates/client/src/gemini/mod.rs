//! Google Gemini generation client.
//!
//! ### Protocol
//!
//! - **Endpoint**: `{base_url}/models/{model}:generateContent`
//! - **Authentication**: Uses `x-goog-api-key` header.
//! - **Key loading**: deferred; a missing key fails the first call that
//!   actually reaches the model, not startup.
//! - **Errors**: 401/403 map to auth failures, 429 to rate limiting, and
//!   safety blocks or empty candidates to provider errors.

pub mod error;
pub mod request;
pub mod response;

pub use error::GeminiError;
pub use request::{Content, GenerateContentRequest, GenerationConfig, Part};
pub use response::{ApiErrorResponse, GenerateContentResponse};

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header;

use cag_core::{AppConfig, LlmBackend, UpstreamError};

/// Default base URL for the Generative Language API.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model.
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "cag-gateway/0.1";

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key from CAG_GOOGLE_API_KEY.
    pub api_key: Option<String>,
    /// Base URL (default: https://generativelanguage.googleapis.com/v1beta).
    pub base_url: String,
    /// Model identifier (default: gemini-2.0-flash).
    pub model: String,
    /// Request timeout (default: 60s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl GeminiConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            api_key: config.google_api_key.clone().filter(|key| !key.is_empty()),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            model: config.llm_model.clone(),
            timeout: config.generate_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Gemini API client.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    /// Create a new client. The API key is checked per call.
    pub fn new(config: GeminiConfig) -> Result<Self, GeminiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| GeminiError::Network(Arc::new(e)))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.config.base_url, self.config.model)
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// The endpoint URL is dropped from transport errors before they can reach a client.
    fn map_error(&self, err: reqwest::Error) -> GeminiError {
        if err.is_timeout() {
            GeminiError::Timeout(self.timeout_ms())
        } else {
            GeminiError::Network(Arc::new(err.without_url()))
        }
    }

    /// Send one `generateContent` request and return the model's text.
    pub async fn generate_content(&self, req: GenerateContentRequest) -> Result<String, GeminiError> {
        let api_key = self.config.api_key.as_deref().ok_or(GeminiError::MissingApiKey)?;
        req.validate()?;

        let start = Instant::now();
        tracing::debug!(model = %self.config.model, "calling Gemini generateContent");

        let http_response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, &self.config.user_agent)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = http_response.status();
        tracing::debug!("Gemini API response status: {}", status);

        let bytes = http_response.bytes().await.map_err(|e| self.map_error(e))?;

        if !status.is_success() {
            if let Ok(body) = serde_json::from_slice::<ApiErrorResponse>(&bytes) {
                tracing::warn!(status = %body.error.status, message = %body.error.message, "Gemini API error");
            }
            return Err(match status.as_u16() {
                401 | 403 => GeminiError::AuthError,
                429 => GeminiError::RateLimited,
                code => GeminiError::HttpError { status: code },
            });
        }

        let api_response: GenerateContentResponse =
            serde_json::from_slice(&bytes).map_err(|e| GeminiError::Parse(e.to_string()))?;
        let text = api_response.text()?;

        tracing::debug!("generation completed in {:?}, {} chars", start.elapsed(), text.len());

        Ok(text)
    }
}

#[async_trait::async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        self.generate_content(GenerateContentRequest::from_prompt(prompt))
            .await
            .map_err(UpstreamError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    #[derive(Clone)]
    struct Mock {
        status: StatusCode,
        body: Option<Value>,
        delay: Duration,
    }

    async fn handler(
        State(mock): State<Mock>, Path(call): Path<String>, headers: HeaderMap, Json(req): Json<Value>,
    ) -> Response {
        tokio::time::sleep(mock.delay).await;

        if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("test-key") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"code": 401, "message": "bad key"}})))
                .into_response();
        }
        if call != "test-model:generateContent" {
            return StatusCode::NOT_FOUND.into_response();
        }
        match mock.body {
            Some(body) => (mock.status, Json(body)).into_response(),
            None => {
                let prompt = req["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
                Json(json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": format!("echo: {prompt}")}]},
                        "finishReason": "STOP"
                    }]
                }))
                .into_response()
            }
        }
    }

    async fn serve(mock: Mock) -> String {
        let router = Router::new().route("/models/{call}", post(handler)).with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn echo() -> Mock {
        Mock { status: StatusCode::OK, body: None, delay: Duration::ZERO }
    }

    fn backend(base_url: String, api_key: Option<&str>) -> GeminiBackend {
        GeminiBackend::new(GeminiConfig {
            api_key: api_key.map(str::to_string),
            base_url,
            model: "test-model".into(),
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_from_app() {
        let app = AppConfig {
            google_api_key: Some(String::new()),
            llm_base_url: "http://localhost:9999/v1beta/".into(),
            generate_timeout_ms: 1234,
            ..Default::default()
        };
        let config = GeminiConfig::from_app(&app);
        assert!(config.api_key.is_none());
        assert_eq!(config.base_url, "http://localhost:9999/v1beta");
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.timeout, Duration::from_millis(1234));
    }

    #[tokio::test]
    async fn test_generate_round_trip() {
        let base = serve(echo()).await;
        let text = backend(base, Some("test-key")).generate("What is Rust?").await.unwrap();
        assert_eq!(text, "echo: What is Rust?");
    }

    #[tokio::test]
    async fn test_missing_key_fails_at_call_time() {
        let base = serve(echo()).await;
        let client = backend(base, None);
        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Provider(msg) if msg.contains("API key")));
    }

    #[tokio::test]
    async fn test_invalid_key_maps_to_auth() {
        let base = serve(echo()).await;
        let err = backend(base, Some("wrong")).generate("hello").await.unwrap_err();
        assert_eq!(err, UpstreamError::Auth);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let base = serve(Mock {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: Some(json!({"error": {"code": 429, "message": "quota"}})),
            delay: Duration::ZERO,
        })
        .await;
        assert_eq!(backend(base, Some("test-key")).generate("hi").await.unwrap_err(), UpstreamError::RateLimited);

        let base = serve(Mock {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: Some(json!({"error": {"code": 500, "message": "boom"}})),
            delay: Duration::ZERO,
        })
        .await;
        assert_eq!(
            backend(base, Some("test-key")).generate("hi").await.unwrap_err(),
            UpstreamError::Status { status: 500 }
        );
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_provider_error() {
        let base = serve(Mock {
            status: StatusCode::OK,
            body: Some(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
            delay: Duration::ZERO,
        })
        .await;
        let err = backend(base, Some("test-key")).generate("hi").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Provider(msg) if msg.contains("SAFETY")));
    }

    #[tokio::test]
    async fn test_network_error_omits_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = backend(format!("http://{addr}/v1beta"), Some("test-key"))
            .generate("hi")
            .await
            .unwrap_err();
        let UpstreamError::Network(msg) = err else {
            panic!("expected network error, got {err:?}");
        };
        assert!(!msg.contains(&addr.to_string()), "endpoint leaked: {msg}");
        assert!(!msg.contains("generateContent"), "endpoint leaked: {msg}");
    }

    #[tokio::test]
    async fn test_timeout() {
        let base = serve(Mock { delay: Duration::from_millis(500), ..echo() }).await;
        let client = GeminiBackend::new(GeminiConfig {
            api_key: Some("test-key".into()),
            base_url: base,
            model: "test-model".into(),
            timeout: Duration::from_millis(100),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.generate("hi").await.unwrap_err(), UpstreamError::Timeout(100));
    }
}
