use std::collections::HashMap;

use caissa_common::protocol::CaissaError;
use tokio::sync::RwLock;

use crate::spot::{SpotConfig, SpotRecord, MAX_PRIORITY};

/// Thread-safe pool of spot records.
///
/// The registry is the single writer path for all spot state: request
/// outcomes, probe outcomes, and the administrative enabled flag. No other
/// component holds a reference into live records; readers get point-in-time
/// copies via [`SpotRegistry::snapshot`].
///
/// Outcome reports for an id that was never registered are a programming
/// error and panic rather than being silently dropped.
pub struct SpotRegistry {
    down_threshold: u32,
    spots: RwLock<HashMap<String, SpotRecord>>,
}

impl SpotRegistry {
    /// Creates an empty registry. `down_threshold` is the consecutive-failure
    /// count at which a spot transitions to `Down`.
    pub fn new(down_threshold: u32) -> Self {
        Self {
            down_threshold,
            spots: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new spot with fresh metrics.
    ///
    /// # Errors
    /// - [`CaissaError::DuplicateSpot`] if the id is already registered
    /// - [`CaissaError::InvalidRequest`] if the priority exceeds [`MAX_PRIORITY`]
    pub async fn register(&self, config: SpotConfig) -> Result<(), CaissaError> {
        if config.priority > MAX_PRIORITY {
            return Err(CaissaError::InvalidRequest(format!(
                "spot {}: priority {} exceeds {MAX_PRIORITY}",
                config.id, config.priority
            )));
        }
        let mut spots = self.spots.write().await;
        if spots.contains_key(&config.id) {
            return Err(CaissaError::DuplicateSpot(config.id));
        }
        tracing::info!("registered spot {} at {}", config.id, config.endpoint);
        spots.insert(config.id.clone(), SpotRecord::new(config));
        Ok(())
    }

    /// Returns a consistent point-in-time copy of all records, sorted by id.
    pub async fn snapshot(&self) -> Vec<SpotRecord> {
        let spots = self.spots.read().await;
        let mut records: Vec<SpotRecord> = spots.values().cloned().collect();
        records.sort_by(|a, b| a.config.id.cmp(&b.config.id));
        records
    }

    /// Returns a copy of one record, if registered.
    pub async fn get(&self, id: &str) -> Option<SpotRecord> {
        self.spots.read().await.get(id).cloned()
    }

    pub async fn spot_count(&self) -> usize {
        self.spots.read().await.len()
    }

    /// Records the outcome of one real analysis call against `id`.
    ///
    /// On success the latency feeds the running mean and the spot becomes
    /// `Healthy`; on failure the consecutive-failure streak advances and the
    /// spot becomes `Degraded` or `Down`. `latency_ms` is ignored for
    /// failures.
    ///
    /// # Panics
    /// Panics if `id` was never registered.
    pub async fn report_outcome(&self, id: &str, success: bool, latency_ms: f64) {
        let mut spots = self.spots.write().await;
        let Some(record) = spots.get_mut(id) else {
            panic!("outcome reported for unregistered spot '{id}'");
        };
        if success {
            record.metrics.record_success(latency_ms);
        } else {
            record.metrics.record_failure(self.down_threshold);
        }
    }

    /// Records a health-probe outcome for `id`. Used only by the health
    /// monitor; never affects the request counters.
    ///
    /// # Panics
    /// Panics if `id` was never registered.
    pub async fn report_probe(&self, id: &str, healthy: bool) {
        let mut spots = self.spots.write().await;
        let Some(record) = spots.get_mut(id) else {
            panic!("probe reported for unregistered spot '{id}'");
        };
        record.metrics.record_probe(healthy, self.down_threshold);
    }

    /// Toggles the administrative enabled flag. Does not affect status.
    ///
    /// Returns `false` if no spot with that id is registered.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut spots = self.spots.write().await;
        match spots.get_mut(id) {
            Some(record) => {
                record.config.enabled = enabled;
                true
            }
            None => false,
        }
    }
}
