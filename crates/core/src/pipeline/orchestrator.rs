//! End-to-end CAG pipeline.
//!
//! Every public operation follows the same order: validate the input, consult
//! the rate limiter, then do the work. A rejected input therefore never
//! consumes quota and never reaches the network.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fetch::{CrawlResult, FetchStage};
use super::generate::{GenerateStage, GenerationResult};
use super::prompt;
use crate::Error;
use crate::cache::{KeyedCache, Namespace};
use crate::config::AppConfig;
use crate::guard::{UrlGuard, canonical_key, validate_prompt, validate_user_id};
use crate::history::{HistoryStore, HistoryTurn, Role};
use crate::ratelimit::{EndpointClass, RateLimiter};
use crate::store::Store;
use crate::upstream::{Crawler, LlmBackend};

/// Stage a CAG request is in, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Validating,
    RateLimitCheck,
    Fetching,
    ComposingPrompt,
    Generating,
    PersistingHistory,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Validating => "validating",
            PipelineState::RateLimitCheck => "rate_limit_check",
            PipelineState::Fetching => "fetching",
            PipelineState::ComposingPrompt => "composing_prompt",
            PipelineState::Generating => "generating",
            PipelineState::PersistingHistory => "persisting_history",
            PipelineState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Input of one CAG call.
#[derive(Debug, Clone, Deserialize)]
pub struct CagRequest {
    pub url: String,
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    #[serde(default)]
    pub include_history: bool,
}

fn default_use_cache() -> bool {
    true
}

/// Provenance of the page the answer was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sources {
    pub title: String,
    pub status_code: u16,
    pub success: bool,
}

/// Result of one CAG call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CagResponse {
    pub response: String,
    pub url: String,
    pub query: String,
    pub crawl_cached: bool,
    pub llm_cached: bool,
    pub crawl_timestamp: DateTime<Utc>,
    /// Seconds from pipeline entry to completion.
    pub processing_time: f64,
    pub sources: Sources,
}

/// Constructed once at startup and shared by all request handlers.
pub struct Orchestrator {
    url_guard: UrlGuard,
    limiter: RateLimiter,
    fetch: FetchStage,
    generate: GenerateStage,
    history: HistoryStore,
    history_turns: usize,
    store: Arc<dyn Store>,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig, store: Arc<dyn Store>, crawler: Arc<dyn Crawler>, llm: Arc<dyn LlmBackend>,
    ) -> Self {
        let crawl_cache = KeyedCache::new(Arc::clone(&store), Namespace::Crawl, config.crawl_ttl());
        let llm_cache = KeyedCache::new(Arc::clone(&store), Namespace::Llm, config.llm_ttl());

        let mut fetch = FetchStage::new(crawler, crawl_cache, config.crawl_timeout());
        let mut generate = GenerateStage::new(llm, llm_cache, config.generate_timeout());
        if config.single_flight {
            fetch = fetch.with_single_flight();
            generate = generate.with_single_flight();
        }

        Self {
            url_guard: UrlGuard::new(&config.denylist_domains),
            limiter: RateLimiter::from_config(config),
            fetch,
            generate,
            history: HistoryStore::new(Arc::clone(&store)),
            history_turns: config.history_context_turns,
            store,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn history_store(&self) -> &HistoryStore {
        &self.history
    }

    pub fn crawl_cache(&self) -> &KeyedCache<CrawlResult> {
        self.fetch.cache()
    }

    pub fn llm_cache(&self) -> &KeyedCache<GenerationResult> {
        self.generate.cache()
    }

    /// Run the full validate, fetch, compose, generate, persist pipeline.
    #[tracing::instrument(skip_all, fields(client = %client, url = %request.url))]
    pub async fn cag(&self, client: &str, request: CagRequest) -> Result<CagResponse, Error> {
        let started = Instant::now();

        let result = self.run_cag(client, &request, started).await;
        if let Err(e) = &result {
            tracing::warn!(code = e.code(), error = %e, "cag pipeline failed");
        }
        result
    }

    async fn run_cag(&self, client: &str, request: &CagRequest, started: Instant) -> Result<CagResponse, Error> {
        Self::enter(PipelineState::Validating);
        let url = self.url_guard.validate(&request.url)?;
        validate_prompt(&request.query)?;
        if let Some(user_id) = &request.user_id {
            validate_user_id(user_id)?;
        }

        Self::enter(PipelineState::RateLimitCheck);
        self.limiter.check(client, EndpointClass::Expensive)?;

        Self::enter(PipelineState::Fetching);
        let crawl = self.fetch.fetch(&canonical_key(&url), request.use_cache).await?;

        Self::enter(PipelineState::ComposingPrompt);
        let context = match (&request.user_id, request.include_history) {
            (Some(user_id), true) => self.history_context(user_id).await,
            _ => Vec::new(),
        };
        let final_prompt = prompt::compose(&crawl.markdown, &request.query, &context);

        Self::enter(PipelineState::Generating);
        let generation = self.generate.generate(&final_prompt, request.use_cache).await?;

        if let Some(user_id) = &request.user_id {
            Self::enter(PipelineState::PersistingHistory);
            self.persist_turns(user_id, &request.query, &generation.text).await;
        }

        Self::enter(PipelineState::Done);
        let processing_time = started.elapsed().as_secs_f64();
        tracing::info!(
            crawl_cached = crawl.served_from_cache,
            llm_cached = generation.served_from_cache,
            elapsed_ms = (processing_time * 1000.0) as u64,
            "cag request complete"
        );

        Ok(CagResponse {
            response: generation.text,
            url: request.url.clone(),
            query: request.query.clone(),
            crawl_cached: crawl.served_from_cache,
            llm_cached: generation.served_from_cache,
            crawl_timestamp: crawl.timestamp,
            processing_time,
            sources: Sources { title: crawl.title, status_code: crawl.status_code, success: crawl.success },
        })
    }

    fn enter(state: PipelineState) {
        tracing::debug!(state = %state, "pipeline transition");
    }

    async fn history_context(&self, user_id: &str) -> Vec<HistoryTurn> {
        match self.history.recent(user_id, self.history_turns).await {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "history unavailable, continuing without context");
                Vec::new()
            }
        }
    }

    async fn persist_turns(&self, user_id: &str, query: &str, answer: &str) {
        if let Err(e) = self.history.append(user_id, Role::User, query).await {
            tracing::warn!(user_id, error = %e, "failed to record user turn");
            return;
        }
        if let Err(e) = self.history.append(user_id, Role::Assistant, answer).await {
            tracing::warn!(user_id, error = %e, "failed to record assistant turn");
        }
    }

    /// Fetch a page on its own.
    pub async fn crawl(&self, client: &str, url: &str, use_cache: bool) -> Result<CrawlResult, Error> {
        let url = self.url_guard.validate(url)?;
        self.limiter.check(client, EndpointClass::Expensive)?;
        self.fetch.fetch(&canonical_key(&url), use_cache).await
    }

    /// Generate text for a bare prompt.
    pub async fn generate(&self, client: &str, prompt: &str, use_cache: bool) -> Result<GenerationResult, Error> {
        validate_prompt(prompt)?;
        self.limiter.check(client, EndpointClass::General)?;
        self.generate.generate(prompt, use_cache).await
    }

    /// Append a single turn. Store failures are reported, not swallowed.
    pub async fn add_history(&self, client: &str, user_id: &str, role: &str, message: &str) -> Result<(), Error> {
        validate_user_id(user_id)?;
        let role: Role = role.parse()?;
        if message.trim().is_empty() {
            return Err(Error::ValidationFailed("Message must be a non-empty string".into()));
        }
        self.limiter.check(client, EndpointClass::General)?;
        self.history.append(user_id, role, message).await
    }

    pub async fn history(&self, client: &str, user_id: &str) -> Result<Vec<HistoryTurn>, Error> {
        validate_user_id(user_id)?;
        self.limiter.check(client, EndpointClass::General)?;
        self.history.list(user_id).await
    }

    /// Returns `false` when the user had no history.
    pub async fn clear_history(&self, client: &str, user_id: &str) -> Result<bool, Error> {
        validate_user_id(user_id)?;
        self.limiter.check(client, EndpointClass::General)?;
        self.history.clear(user_id).await
    }
}
