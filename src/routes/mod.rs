pub mod health;
pub mod models;
pub mod sessions;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/models", get(models::list_models))
        .route("/api/sessions", post(sessions::create_session))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/api/sessions/{id}/submit", post(sessions::submit))
        .route("/api/sessions/{id}/reset", post(sessions::reset))
        .with_state(state)
}
