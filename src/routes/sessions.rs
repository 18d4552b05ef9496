use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::pipeline::ModelConfig;
use crate::session::SessionSnapshot;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub industry: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Request header first, then the server's own key for the configured provider.
fn resolve_api_key(headers: &HeaderMap, state: &AppState) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| state.config.server_api_key())
}

pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionSnapshot>) {
    let session = state.sessions.create().await;
    (StatusCode::CREATED, Json(session.snapshot().await))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionSnapshot>> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.snapshot().await))
}

pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> AppResult<Json<SessionSnapshot>> {
    let session = state.sessions.get(id).await?;

    let model = ModelConfig {
        api_key: resolve_api_key(&headers, &state),
        model: body
            .model
            .unwrap_or_else(|| state.config.default_model.clone()),
        temperature: body
            .temperature
            .unwrap_or(state.config.default_temperature),
    };

    let snapshot = session.submit(&body.industry, model).await?;
    Ok(Json(snapshot))
}

pub async fn reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionSnapshot>> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.reset().await))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.sessions.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
