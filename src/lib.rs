pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod routes;
pub mod session;
pub mod sources;
pub mod telemetry;

use std::sync::Arc;

pub use config::Config;

use session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionStore>,
}
