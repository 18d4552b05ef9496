use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub provider: String,
    pub default_model: String,
    pub models: Vec<String>,
    pub default_temperature: f32,
    pub word_limit: usize,
    pub required_sources: usize,
    /// Whether a submit without `x-api-key` can fall back to a server key.
    pub server_key_configured: bool,
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let config = &state.config;
    Json(ModelsResponse {
        provider: config.llm_provider.clone(),
        default_model: config.default_model.clone(),
        models: config.allowed_models.clone(),
        default_temperature: config.default_temperature,
        word_limit: config.word_limit,
        required_sources: config.max_sources,
        server_key_configured: config.server_api_key().is_some(),
    })
}
