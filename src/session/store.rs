use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::pipeline::Pipeline;
use crate::telemetry::metrics::SESSIONS_ACTIVE;

use super::controller::SessionController;

/// In-memory registry of live sessions. Nothing outlives the process.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<SessionController>>>,
    pipeline: Pipeline,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(pipeline: Pipeline, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pipeline,
            ttl,
        }
    }

    pub async fn create(&self) -> Arc<SessionController> {
        let session = Arc::new(SessionController::new(self.pipeline.clone()));
        self.sessions
            .write()
            .await
            .insert(session.id(), session.clone());
        SESSIONS_ACTIVE.add(1, &[]);
        tracing::info!(session.id = %session.id(), "session created");
        session
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Arc<SessionController>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
    }

    pub async fn remove(&self, id: Uuid) -> AppResult<()> {
        match self.sessions.write().await.remove(&id) {
            Some(_) => {
                SESSIONS_ACTIVE.add(-1, &[]);
                tracing::info!(session.id = %id, "session removed");
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Session {id} not found"))),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops sessions untouched for longer than the TTL, returning how many went.
    pub async fn evict_idle(&self) -> usize {
        let cutoff = Utc::now().timestamp_millis() - self.ttl.as_millis() as i64;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.last_activity_ms() > cutoff);
        let evicted = before - sessions.len();

        if evicted > 0 {
            SESSIONS_ACTIVE.add(-(evicted as i64), &[]);
            tracing::info!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }

    /// Runs `evict_idle` every `every` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.evict_idle().await;
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("session sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}
