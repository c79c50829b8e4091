use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Background task that rewrites the journal once enough appends have piled
/// up, and drops notification channels nobody listens on.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold).await {
            warn!("journal compaction failed: {e}");
        }
        let before = engine.notify.channel_count();
        engine.notify.prune();
        let pruned = before.saturating_sub(engine.notify.channel_count());
        if pruned > 0 {
            debug!("pruned {pruned} idle notification channels");
        }
    }
}

/// Compact when at least `threshold` events were appended since the last
/// compaction. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, crate::engine::EngineError> {
    let appends = engine.journal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    engine.compact_journal().await?;
    info!("compacted journal after {appends} appends");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("timebarter_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(&path, Arc::new(NotifyHub::new())).unwrap();

        let ada = Ulid::new();
        engine.register_account(ada, "Ada".into()).await.unwrap();
        assert!(!compact_if_due(&engine, 5).await.unwrap());

        for _ in 0..4 {
            engine
                .update_preference(ada, Some("mornings".into()))
                .await
                .unwrap();
        }
        assert!(compact_if_due(&engine, 5).await.unwrap());
        assert_eq!(engine.journal_appends_since_compact().await, 0);

        drop(engine);
        let reopened = Engine::new(&path, Arc::new(NotifyHub::new())).unwrap();
        let account = reopened.account(ada).await.unwrap();
        assert_eq!(account.preferred_hours.as_deref(), Some("mornings"));
    }
}
