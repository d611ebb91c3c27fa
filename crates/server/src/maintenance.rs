//! Periodic housekeeping: drop idle rate-limit windows and expired entries.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::state::AppState;

/// How often housekeeping runs.
pub const INTERVAL: Duration = Duration::from_secs(60);

/// Run one housekeeping pass.
pub async fn run_once(state: &AppState) {
    let pruned = state.orchestrator.limiter().prune_idle();
    match state.orchestrator.store().purge_expired().await {
        Ok(purged) => tracing::debug!(pruned, purged, "maintenance pass complete"),
        Err(e) => tracing::warn!(pruned, error = %e, "failed to purge expired entries"),
    }
}

pub fn spawn(state: AppState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_once(&state).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use cag_core::{AppConfig, CrawledPage, Crawler, LlmBackend, MemoryStore, Orchestrator, Store, UpstreamError};

    struct Unused;

    #[async_trait::async_trait]
    impl Crawler for Unused {
        async fn crawl(&self, _url: &str) -> Result<CrawledPage, UpstreamError> {
            Err(UpstreamError::Network("unused".into()))
        }
    }

    #[async_trait::async_trait]
    impl LlmBackend for Unused {
        async fn generate(&self, _prompt: &str) -> Result<String, UpstreamError> {
            Err(UpstreamError::Network("unused".into()))
        }
    }

    #[tokio::test]
    async fn test_run_once_purges_expired() {
        let store = Arc::new(MemoryStore::new());
        store.set_with_ttl("crawl:old", "v", Duration::from_millis(5)).await.unwrap();
        store.set_with_ttl("crawl:new", "v", Duration::from_secs(60)).await.unwrap();

        let config = AppConfig::default();
        let orchestrator = Orchestrator::new(&config, store.clone(), Arc::new(Unused), Arc::new(Unused));
        let state = AppState::new(config, orchestrator);

        tokio::time::sleep(Duration::from_millis(20)).await;
        run_once(&state).await;

        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert!(store.get("crawl:new").await.unwrap().is_some());
    }
}
