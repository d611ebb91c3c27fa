//! Cache-or-generate stage.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prompt::normalize_prompt;
use super::run_detached;
use crate::Error;
use crate::cache::{Coalescer, KeyedCache};
use crate::upstream::{LlmBackend, UpstreamError};

/// Model output for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub prompt: String,
    pub text: String,
    #[serde(skip)]
    pub served_from_cache: bool,
    #[serde(skip)]
    pub cached_at: Option<DateTime<Utc>>,
}

type GenerateOutcome = Result<GenerationResult, UpstreamError>;

/// Wraps an [`LlmBackend`] behind the model-response cache.
///
/// Entries are keyed by the normalized prompt, exact match only.
#[derive(Clone)]
pub struct GenerateStage {
    backend: Arc<dyn LlmBackend>,
    cache: KeyedCache<GenerationResult>,
    timeout: Duration,
    single_flight: Option<Coalescer<GenerateOutcome>>,
}

impl GenerateStage {
    pub fn new(backend: Arc<dyn LlmBackend>, cache: KeyedCache<GenerationResult>, timeout: Duration) -> Self {
        Self { backend, cache, timeout, single_flight: None }
    }

    pub fn with_single_flight(mut self) -> Self {
        self.single_flight = Some(Coalescer::new());
        self
    }

    pub fn cache(&self) -> &KeyedCache<GenerationResult> {
        &self.cache
    }

    /// Return the model's answer for `prompt`, from cache when allowed.
    ///
    /// Only successful generations are written back.
    pub async fn generate(&self, prompt: &str, use_cache: bool) -> Result<GenerationResult, Error> {
        let normalized = normalize_prompt(prompt);

        if use_cache && let Some(entry) = self.cache.get(&normalized).await {
            tracing::debug!(key = %entry.key, "generation served from cache");
            let mut result = entry.payload;
            result.served_from_cache = true;
            result.cached_at = Some(entry.created_at);
            return Ok(result);
        }

        let backend = Arc::clone(&self.backend);
        let cache = self.cache.clone();
        let timeout = self.timeout;
        let prompt = prompt.to_string();
        let input = normalized.clone();

        let work = async move {
            let started = std::time::Instant::now();
            let text = match tokio::time::timeout(timeout, backend.generate(&prompt)).await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "generation failed");
                    return Err(e);
                }
                Err(_) => {
                    tracing::warn!(timeout_ms = timeout.as_millis() as u64, "generation timed out");
                    return Err(UpstreamError::Timeout(timeout.as_millis() as u64));
                }
            };

            tracing::info!(
                prompt_chars = prompt.chars().count(),
                response_chars = text.chars().count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "generated response"
            );

            let result = GenerationResult { prompt, text, served_from_cache: false, cached_at: None };
            cache.set(&input, result.clone()).await;
            Ok(result)
        };

        let key = self.cache.key(&normalized);
        run_detached(self.single_flight.as_ref(), &key, work)
            .await
            .unwrap_or_else(|| Err(UpstreamError::Provider("generation task aborted".into())))
            .map_err(Error::GenerateFailed)
    }
}
