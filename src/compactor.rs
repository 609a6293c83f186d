use std::sync::Arc;
use std::time::Duration;

use chrono::Days;
use tracing::info;

use crate::engine::Engine;

/// Background task that keeps one venue's journal bounded: prunes day shards
/// that fell out of the retention window, then rewrites the journal once
/// enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, compact_threshold: u64, retention_days: i64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;

        let cutoff = engine
            .today()
            .checked_sub_days(Days::new(retention_days.max(0) as u64));
        if let Some(cutoff) = cutoff {
            let dropped = engine.prune_days_before(cutoff).await;
            if dropped > 0 {
                info!("pruned {dropped} day shards older than {cutoff}");
            }
        }

        let appends = engine.wal_appends_since_compact().await;
        if appends >= compact_threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("journal compacted after {appends} appends"),
                Err(e) => tracing::warn!("journal compaction failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Days;
    use ulid::Ulid;

    use crate::config::ScheduleConfig;
    use crate::engine::BookingRequest;
    use crate::notify::NotifyHub;

    use super::*;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("greenroom_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn prune_drops_day_and_index() {
        let engine = Engine::new(
            ScheduleConfig::default(),
            test_wal_path("prune.wal"),
            Arc::new(NotifyHub::new()),
        )
        .unwrap();

        let date = engine.today() + Days::new(1);
        let id = Ulid::new();
        engine
            .create_booking(BookingRequest {
                id,
                date,
                start: 14 * 60,
                duration_hours: 1,
                band_name: "Short Stay".into(),
                email: "ss@example.org".into(),
                phone: None,
                members_count: 2,
                notes: None,
            })
            .await
            .unwrap();
        assert!(engine.get_booking(id).await.is_some());

        // Cutoff beyond the booking's date: the shard and its index entries go
        let dropped = engine.prune_days_before(date + Days::new(1)).await;
        assert_eq!(dropped, 1);
        assert!(engine.get_booking(id).await.is_none());

        // Pruning again is a no-op
        assert_eq!(engine.prune_days_before(date + Days::new(1)).await, 0);
    }

    #[tokio::test]
    async fn compact_resets_append_counter() {
        let engine = Engine::new(
            ScheduleConfig::default(),
            test_wal_path("compact_counter.wal"),
            Arc::new(NotifyHub::new()),
        )
        .unwrap();

        let date = engine.today() + Days::new(1);
        for i in 0..3 {
            engine
                .create_booking(BookingRequest {
                    id: Ulid::new(),
                    date,
                    start: (9 + i) * 60,
                    duration_hours: 1,
                    band_name: "Churn".into(),
                    email: "churn@example.org".into(),
                    phone: None,
                    members_count: 2,
                    notes: None,
                })
                .await
                .unwrap();
        }
        assert_eq!(engine.wal_appends_since_compact().await, 3);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }
}
