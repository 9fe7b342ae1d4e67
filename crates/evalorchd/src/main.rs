use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use evalorch_core::{telemetry, OrchestratorConfig};
use evalorch_state::{AsyncCorrelationStore, SurrealCorrelationStore};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = OrchestratorConfig::from_env().context("loading EVALORCH_* configuration")?;
    telemetry::init(&config);

    let store: Arc<dyn AsyncCorrelationStore> = Arc::new(
        SurrealCorrelationStore::from_env(config.context_ttl)
            .await
            .context("connecting correlation store")?,
    );

    info!(
        context_ttl_s = config.context_ttl.as_secs(),
        reaper_interval_s = config.reaper_interval.as_secs(),
        "evalorchd started"
    );

    let purged = reap_until(store, config.reaper_interval, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
    })
    .await;

    info!(purged, "evalorchd stopped");
    Ok(())
}

/// Purge expired contexts every `interval` until `shutdown` resolves.
/// Returns the total number of contexts removed.
async fn reap_until<S>(store: Arc<dyn AsyncCorrelationStore>, interval: Duration, shutdown: S) -> usize
where
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut total = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => match store.purge_expired().await {
                Ok(n) => total += n,
                Err(e) => warn!(error = %e, "purge of expired contexts failed"),
            },
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalorch_state::fakes::MemoryCorrelationStore;
    use evalorch_state::{AsyncContext, InvocationId, Session};

    fn ctx(id: i64) -> AsyncContext {
        AsyncContext {
            invocation_id: InvocationId::from(id),
            space_id: 1,
            issued_at_ms: 0,
            session: Session::new("u1"),
            callee: None,
            event: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_purges_expired_until_shutdown() {
        let store = Arc::new(MemoryCorrelationStore::with_ttl(Duration::ZERO));
        store.put(&ctx(1)).await.unwrap();
        store.put(&ctx(2)).await.unwrap();

        let purged = reap_until(
            store.clone(),
            Duration::from_secs(60),
            tokio::time::sleep(Duration::from_secs(150)),
        )
        .await;

        assert_eq!(purged, 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn reaper_stops_on_immediate_shutdown() {
        let store = Arc::new(MemoryCorrelationStore::new());
        let purged = reap_until(store, Duration::from_secs(60), async {}).await;
        assert_eq!(purged, 0);
    }
}
