use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded mode and live session count, probing the storage backend on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.storage().require().await {
        Ok(backend) => {
            if let Err(err) = backend.store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let live_sessions = state.registry().session_count();
    if state.is_degraded() {
        HealthResponse::degraded(live_sessions)
    } else {
        HealthResponse::ok(live_sessions)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::game_store::memory::{MemoryGameStore, MemoryQuizCatalog},
        state::{AppState, Backend},
    };

    #[tokio::test]
    async fn reports_degraded_without_backend() {
        let state = AppState::new(AppConfig::default());
        let status = health_status(&state).await;
        assert_eq!(status.status, "degraded");
        assert_eq!(status.live_sessions, 0);
    }

    #[tokio::test]
    async fn reports_ok_with_memory_backend() {
        let state = AppState::with_backend(
            AppConfig::default(),
            Backend::new(
                Arc::new(MemoryGameStore::new()),
                Arc::new(MemoryQuizCatalog::new()),
            ),
        );
        assert_eq!(health_status(&state).await.status, "ok");
    }
}
