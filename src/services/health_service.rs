use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the degraded flag with live counters, logging storage issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.record_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "record store health check failed");
            }
        }
        None if state.is_degraded() => warn!("record store unavailable (degraded mode)"),
        None => {}
    }

    let tokens = state.repository().lock().await.tokens().count();
    HealthResponse::new(state.is_degraded(), state.sessions().len(), tokens)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::record_store::memory::MemoryRecordStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_without_a_store() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, "degraded");

        state
            .install_record_store(Arc::new(MemoryRecordStore::new()))
            .await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.tokens, 0);
    }
}
