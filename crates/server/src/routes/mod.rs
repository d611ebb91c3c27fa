//! HTTP surface of the gateway.
//!
//! | route                              | limit class |
//! |------------------------------------|-------------|
//! | `POST /crawl`, `POST /cag`         | expensive   |
//! | `POST /generate`, `/history/*`     | general     |
//! | `GET /health`, `/admin/*`          | none        |
//!
//! Limits are enforced by the orchestrator after input validation, so the
//! handlers here only decode, delegate and shape the reply.

pub mod admin;
pub mod client;
pub mod history;
pub mod pipeline;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};

use crate::monitor;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/crawl", post(pipeline::crawl))
        .route("/generate", post(pipeline::generate))
        .route("/cag", post(pipeline::cag))
        .route("/history/add", post(history::add))
        .route("/history/get/{user_id}", get(history::get))
        .route("/history/clear/{user_id}", delete(history::clear))
        .route("/health", get(admin::health))
        .route("/admin/health/detailed", get(admin::health_detailed))
        .route("/admin/metrics", get(admin::metrics))
        .route("/admin/metrics/reset", post(admin::reset_metrics))
        .route("/admin/stats/system", get(admin::system_stats))
        .route("/admin/test/cag", post(admin::self_test))
        .route("/admin/config", get(admin::config))
        .route("/admin/cache/clear", post(admin::clear_cache))
        .route("/admin/cache/purge", post(admin::purge_cache))
        .route_layer(middleware::from_fn_with_state(state.clone(), monitor::track))
        .with_state(state)
}
