use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "industry-report-assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.sessions.len().await,
    }))
}
