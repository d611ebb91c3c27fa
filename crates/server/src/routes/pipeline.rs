//! Crawl, generate and CAG handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cag_core::{CagRequest, CagResponse, Namespace};

use super::client::ClientKey;
use crate::error::ApiError;
use crate::state::AppState;

fn default_use_cache() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CrawlBody {
    pub url: String,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

#[derive(Debug, Serialize)]
pub struct CrawlReply {
    pub url: String,
    pub markdown: String,
    pub title: String,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
    pub status_code: u16,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerateReply {
    pub text: String,
    pub cached: bool,
}

/// `POST /crawl`
pub async fn crawl(
    State(state): State<AppState>, client: ClientKey, payload: Result<Json<CrawlBody>, JsonRejection>,
) -> Result<Json<CrawlReply>, ApiError> {
    let Json(body) = payload?;
    let result = state
        .orchestrator
        .crawl(client.as_str(), &body.url, body.use_cache)
        .await?;
    state.monitor.record_cache(Namespace::Crawl, result.served_from_cache);

    Ok(Json(CrawlReply {
        url: body.url,
        markdown: result.markdown,
        title: result.title,
        cached: result.served_from_cache,
        timestamp: result.timestamp,
        status_code: result.status_code,
        success: result.success,
    }))
}

/// `POST /generate`
pub async fn generate(
    State(state): State<AppState>, client: ClientKey, payload: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GenerateReply>, ApiError> {
    let Json(body) = payload?;
    let result = state
        .orchestrator
        .generate(client.as_str(), &body.prompt, body.use_cache)
        .await?;
    state.monitor.record_cache(Namespace::Llm, result.served_from_cache);

    Ok(Json(GenerateReply { text: result.text, cached: result.served_from_cache }))
}

/// `POST /cag`
pub async fn cag(
    State(state): State<AppState>, client: ClientKey, payload: Result<Json<CagRequest>, JsonRejection>,
) -> Result<Json<CagResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state.orchestrator.cag(client.as_str(), request).await?;
    state.monitor.record_cache(Namespace::Crawl, response.crawl_cached);
    state.monitor.record_cache(Namespace::Llm, response.llm_cached);
    Ok(Json(response))
}
