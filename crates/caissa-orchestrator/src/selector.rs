use crate::spot::{SpotConfig, SpotRecord, SpotStatus};

/// Produces the best-first candidate ordering for one request.
///
/// Disabled spots are dropped outright. The remaining spots are tiered by
/// status: the `Healthy` tier is used if non-empty, otherwise the `Degraded`
/// tier; `Down` and `Unknown` spots are never candidates. Within the chosen
/// tier the order is priority descending, then average latency ascending,
/// then success rate descending, then id ascending.
///
/// Returns the whole ordering, not just the head: the failover loop walks it
/// front to back. Pure function over a snapshot; runs on every request's hot
/// path and does no I/O.
pub fn order(records: &[SpotRecord]) -> Vec<SpotConfig> {
    let mut healthy: Vec<&SpotRecord> = Vec::new();
    let mut degraded: Vec<&SpotRecord> = Vec::new();

    for record in records.iter().filter(|r| r.config.enabled) {
        match record.metrics.status {
            SpotStatus::Healthy => healthy.push(record),
            SpotStatus::Degraded => degraded.push(record),
            SpotStatus::Down | SpotStatus::Unknown => {}
        }
    }

    let mut tier = if healthy.is_empty() { degraded } else { healthy };

    tier.sort_by(|a, b| {
        b.config
            .priority
            .cmp(&a.config.priority)
            .then_with(|| a.metrics.avg_latency_ms.total_cmp(&b.metrics.avg_latency_ms))
            .then_with(|| b.metrics.success_rate.total_cmp(&a.metrics.success_rate))
            .then_with(|| a.config.id.cmp(&b.config.id))
    });

    tier.into_iter().map(|r| r.config.clone()).collect()
}
