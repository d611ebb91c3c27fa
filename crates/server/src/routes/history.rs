//! Conversation history handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use cag_core::HistoryTurn;

use super::client::ClientKey;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddTurnBody {
    pub user_id: String,
    pub message: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryReply {
    pub user_id: String,
    pub history: Vec<HistoryTurn>,
}

/// `POST /history/add`
pub async fn add(
    State(state): State<AppState>, client: ClientKey, payload: Result<Json<AddTurnBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    state
        .orchestrator
        .add_history(client.as_str(), &body.user_id, &body.role, &body.message)
        .await?;
    Ok(Json(json!({ "message": "Chat turn added successfully." })))
}

/// `GET /history/get/{user_id}`
pub async fn get(
    State(state): State<AppState>, client: ClientKey, Path(user_id): Path<String>,
) -> Result<Json<HistoryReply>, ApiError> {
    let history = state.orchestrator.history(client.as_str(), &user_id).await?;
    Ok(Json(HistoryReply { user_id, history }))
}

/// `DELETE /history/clear/{user_id}`
pub async fn clear(
    State(state): State<AppState>, client: ClientKey, Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.orchestrator.clear_history(client.as_str(), &user_id).await? {
        Ok(Json(json!({ "message": format!("History cleared for user {user_id}") })))
    } else {
        Err(ApiError::NotFound("No history found for user".to_string()))
    }
}
