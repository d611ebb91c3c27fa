//! Health, metrics and maintenance handlers. None of these are rate limited.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use cag_core::{AppConfig, Error, GenerationResult, Namespace, Role, Store, StoreKind};

use crate::error::ApiError;
use crate::monitor::MetricsSnapshot;
use crate::state::AppState;

const PROBE_KEY: &str = "health:probe";
const SELF_TEST_PREFIX: &str = "self-test";

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn probe_store(store: &Arc<dyn Store>) -> Value {
    let start = Instant::now();
    let marker = Utc::now().to_rfc3339();

    let result: Result<Option<String>, Error> = async {
        store.set_with_ttl(PROBE_KEY, &marker, Duration::from_secs(60)).await?;
        store.get(PROBE_KEY).await
    }
    .await;

    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(Some(value)) if value == marker => json!({ "status": "ok", "latency_ms": latency_ms }),
        Ok(_) => json!({ "status": "error", "error": "probe value not read back" }),
        Err(e) => {
            tracing::warn!(error = %e, "store health probe failed");
            json!({ "status": "error", "error": e.code() })
        }
    }
}

/// `GET /admin/health/detailed`
pub async fn health_detailed(State(state): State<AppState>) -> Json<Value> {
    let store = probe_store(state.orchestrator.store()).await;
    let api_key_set = state.config.require_google_api_key().is_ok();
    let environment = json!({
        "status": if api_key_set { "ok" } else { "warning" },
        "google_api_key_set": api_key_set,
        "store": state.config.store,
    });

    let statuses = [&store, &environment].map(|c| c["status"].as_str().unwrap_or("unknown"));
    let status = if statuses.contains(&"error") {
        "unhealthy"
    } else if statuses.contains(&"warning") {
        "degraded"
    } else {
        "healthy"
    };

    Json(json!({
        "timestamp": Utc::now(),
        "app_name": "cag-gateway",
        "app_version": env!("CARGO_PKG_VERSION"),
        "status": status,
        "components": { "store": store, "environment": environment },
    }))
}

/// `GET /admin/metrics`
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    tracing::info!("application metrics requested");
    Json(state.monitor.snapshot(state.orchestrator.limiter().tracked_clients()))
}

/// `POST /admin/metrics/reset`
pub async fn reset_metrics(State(state): State<AppState>) -> Json<Value> {
    tracing::warn!("application metrics reset requested");
    state.monitor.reset();
    Json(json!({ "status": "success", "message": "Metrics reset successfully" }))
}

/// Configuration with secrets reduced to presence flags.
#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub app_version: &'static str,
    pub bind_addr: String,
    pub store: StoreKind,
    pub db_path: String,
    pub llm_model: String,
    pub llm_base_url: String,
    pub user_agent: String,
    pub max_bytes: usize,
    pub crawl_timeout_ms: u64,
    pub generate_timeout_ms: u64,
    pub crawl_ttl_secs: u64,
    pub llm_ttl_secs: u64,
    pub general_per_minute: u32,
    pub expensive_per_minute: u32,
    pub history_context_turns: usize,
    pub single_flight: bool,
    pub resolve_dns: bool,
    pub denylist_domains: usize,
    pub crawl_prefix: String,
    pub llm_prefix: String,
    pub google_api_key_configured: bool,
}

impl From<&AppConfig> for ConfigView {
    fn from(config: &AppConfig) -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION"),
            bind_addr: config.bind_addr.clone(),
            store: config.store,
            db_path: config.db_path.display().to_string(),
            llm_model: config.llm_model.clone(),
            llm_base_url: config.llm_base_url.clone(),
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            crawl_timeout_ms: config.crawl_timeout_ms,
            generate_timeout_ms: config.generate_timeout_ms,
            crawl_ttl_secs: config.crawl_ttl_secs,
            llm_ttl_secs: config.llm_ttl_secs,
            general_per_minute: config.general_per_minute,
            expensive_per_minute: config.expensive_per_minute,
            history_context_turns: config.history_context_turns,
            single_flight: config.single_flight,
            resolve_dns: config.resolve_dns,
            denylist_domains: config.denylist_domains.len(),
            crawl_prefix: Namespace::Crawl.key_prefix(),
            llm_prefix: Namespace::Llm.key_prefix(),
            google_api_key_configured: config.require_google_api_key().is_ok(),
        }
    }
}

/// `GET /admin/config`
pub async fn config(State(state): State<AppState>) -> Json<ConfigView> {
    Json(ConfigView::from(state.config.as_ref()))
}

#[derive(Debug, Deserialize)]
pub struct ClearParams {
    pub namespace: Option<String>,
}

/// `POST /admin/cache/clear?namespace=crawl|llm`
///
/// Without a namespace both caches are cleared. History is never touched.
pub async fn clear_cache(
    State(state): State<AppState>, params: Result<Query<ClearParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    let namespaces = match params.namespace.as_deref().map(Namespace::parse) {
        None => vec![Namespace::Crawl, Namespace::Llm],
        Some(Some(ns @ (Namespace::Crawl | Namespace::Llm))) => vec![ns],
        Some(_) => return Err(ApiError::BadRequest("namespace must be 'crawl' or 'llm'".to_string())),
    };

    let mut cleared = serde_json::Map::new();
    for namespace in namespaces {
        let removed = match namespace {
            Namespace::Crawl => state.orchestrator.crawl_cache().clear().await?,
            _ => state.orchestrator.llm_cache().clear().await?,
        };
        tracing::warn!(namespace = namespace.prefix(), removed, "cache cleared");
        cleared.insert(namespace.prefix().to_string(), json!(removed));
    }

    Ok(Json(json!({ "status": "success", "cleared": cleared })))
}

/// `POST /admin/cache/purge`
pub async fn purge_cache(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let purged = state.orchestrator.store().purge_expired().await?;
    tracing::info!(purged, "expired entries purged");
    Ok(Json(json!({ "status": "success", "purged": purged })))
}

/// `GET /admin/stats/system`
pub async fn system_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let orchestrator = &state.orchestrator;
    let crawl_entries = orchestrator.crawl_cache().count().await?;
    let llm_entries = orchestrator.llm_cache().count().await?;
    let users = orchestrator.history_store().user_count().await?;

    Ok(Json(json!({
        "timestamp": Utc::now(),
        "cache": {
            "crawl_entries": crawl_entries,
            "llm_entries": llm_entries,
            "crawl_ttl_secs": orchestrator.crawl_cache().ttl().as_secs(),
            "llm_ttl_secs": orchestrator.llm_cache().ttl().as_secs(),
        },
        "history": { "users": users },
        "rate_limiter": { "tracked_clients": orchestrator.limiter().tracked_clients() },
        "configuration": {
            "store": state.config.store,
            "single_flight": state.config.single_flight,
            "resolve_dns": state.config.resolve_dns,
        },
    })))
}

fn check(passed: bool, details: String) -> Value {
    json!({ "status": if passed { "pass" } else { "fail" }, "details": details })
}

fn check_error(e: &Error) -> Value {
    json!({ "status": "error", "details": e.public_message() })
}

async fn cache_round_trip(state: &AppState, stamp: i64) -> Value {
    let cache = state.orchestrator.llm_cache();
    let input = format!("{SELF_TEST_PREFIX}:{stamp}");
    let expected = GenerationResult {
        prompt: input.clone(),
        text: "self-test value".to_string(),
        served_from_cache: false,
        cached_at: None,
    };

    let result = async {
        cache.try_set(&input, expected.clone()).await?;
        let read = cache.try_get(&input).await?;
        cache.remove(&input).await?;
        Ok::<_, Error>(read)
    }
    .await;

    match result {
        Ok(read) => {
            let matched = read.is_some_and(|entry| entry.payload.text == expected.text);
            check(matched, format!("Set and retrieved value: {matched}"))
        }
        Err(e) => check_error(&e),
    }
}

async fn history_round_trip(state: &AppState, stamp: i64) -> Value {
    let history = state.orchestrator.history_store();
    let user_id = format!("{SELF_TEST_PREFIX}-{stamp}");

    let result = async {
        history.append(&user_id, Role::User, "self-test message").await?;
        let turns = history.list(&user_id).await?;
        history.clear(&user_id).await?;
        Ok::<_, Error>(turns.len())
    }
    .await;

    match result {
        Ok(n) => check(n > 0, format!("Added and retrieved history: {n} entries")),
        Err(e) => check_error(&e),
    }
}

/// `POST /admin/test/cag`
///
/// Round-trips a value through the model cache and a turn through history,
/// then removes both. No upstream call is made.
pub async fn self_test(State(state): State<AppState>) -> Json<Value> {
    let stamp = Utc::now().timestamp_millis();
    let cache = cache_round_trip(&state, stamp).await;
    let history = history_round_trip(&state, stamp).await;

    let passed = [&cache, &history].iter().all(|t| t["status"] == "pass");
    if !passed {
        tracing::warn!(cache = %cache, history = %history, "pipeline self-test failed");
    }

    Json(json!({
        "timestamp": Utc::now(),
        "status": if passed { "pass" } else { "fail" },
        "tests": { "cache": cache, "history": history },
    }))
}
