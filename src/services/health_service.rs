use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the store through the data access layer, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.dal().health_check().await {
        Ok(()) => HealthResponse::ok(),
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            HealthResponse::degraded()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dao::{
            badge_store::memory::MemoryBadgeStore,
            dal::{Dal, DalOptions},
            testing::StaticFeed,
        },
        state::AppState,
    };

    fn state(feed: StaticFeed) -> crate::state::SharedState {
        let dal = Dal::new(
            Arc::new(MemoryBadgeStore::new()),
            Arc::new(feed),
            DalOptions::default(),
        );
        AppState::new(Arc::new(dal))
    }

    #[tokio::test]
    async fn healthy_store_reports_ok() {
        let state = state(StaticFeed::default());
        assert!(health_status(&state).await.is_ok());
    }

    #[tokio::test]
    async fn rejected_initialization_reports_degraded() {
        let state = state(StaticFeed::failing());
        assert!(state.dal().initialize().await.is_err());
        assert!(!health_status(&state).await.is_ok());
    }
}
