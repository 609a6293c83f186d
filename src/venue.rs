use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::compactor;
use crate::config::ScheduleConfig;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;

/// Manages per-venue engines. Each venue is one rehearsal room with its own
/// engine + journal + compactor. Venue = database name from the pgwire
/// connection.
pub struct VenueManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    cfg: ScheduleConfig,
    compact_threshold: u64,
    retention_days: i64,
}

impl VenueManager {
    pub fn new(
        data_dir: PathBuf,
        cfg: ScheduleConfig,
        compact_threshold: u64,
        retention_days: i64,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            cfg,
            compact_threshold,
            retention_days,
        }
    }

    /// Get or lazily create an engine for the given venue.
    pub fn get_or_create(&self, venue: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(venue) {
            return Ok(engine.value().clone());
        }
        if venue.len() > MAX_VENUE_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "venue name too long",
            ));
        }
        if self.engines.len() >= MAX_VENUES {
            return Err(std::io::Error::other("too many venues"));
        }

        // Sanitize venue name to prevent path traversal
        let safe_name: String = venue
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty venue name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(self.cfg.clone(), wal_path, notify)?);

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        let retention = self.retention_days;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold, retention).await;
        });

        self.engines.insert(venue.to_string(), engine.clone());
        metrics::gauge!(crate::observability::VENUES_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
