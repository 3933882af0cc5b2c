use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Highest allowed spot priority.
pub const MAX_PRIORITY: u8 = 200;

/// Returns the current wall-clock time as milliseconds since the UNIX epoch.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Immutable configuration of one analysis spot, set at registration.
///
/// `enabled` is the one administratively toggled field; everything else
/// requires re-registration to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotConfig {
    /// Unique identifier.
    pub id: String,
    /// Network address of the spot, host:port.
    pub endpoint: String,
    /// Free-text label, informational only.
    #[serde(default)]
    pub region: String,
    /// Selection priority in [0, 200]; higher is preferred.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Administrative toggle, independent of health.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_priority() -> u8 {
    100
}

fn default_enabled() -> bool {
    true
}

impl SpotConfig {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            region: String::new(),
            priority: default_priority(),
            enabled: true,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Health state of a spot as observed by the relay.
///
/// `Unknown` is the only legal initial value and is never re-entered once a
/// probe or call outcome has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpotStatus {
    Unknown,
    Healthy,
    Degraded,
    Down,
}

/// Live metrics of one spot. Owned exclusively by the registry; every
/// mutation goes through the `record_*` methods below, under the registry's
/// lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotMetrics {
    pub status: SpotStatus,
    /// Running average latency of successful analysis calls, in milliseconds.
    pub avg_latency_ms: f64,
    pub total_requests: u64,
    pub failure_count: u64,
    /// Derived: `(total_requests - failure_count) / total_requests`,
    /// `1.0` while no request has been recorded.
    pub success_rate: f64,
    /// Failures (call or probe) since the last success.
    pub consecutive_failures: u32,
    /// Milliseconds since the UNIX epoch of the last success or passing probe.
    pub last_healthy_at: Option<u64>,
}

impl SpotMetrics {
    pub fn new() -> Self {
        Self {
            status: SpotStatus::Unknown,
            avg_latency_ms: 0.0,
            total_requests: 0,
            failure_count: 0,
            success_rate: 1.0,
            consecutive_failures: 0,
            last_healthy_at: None,
        }
    }

    /// Records a successful analysis call with its measured latency.
    pub(crate) fn record_success(&mut self, latency_ms: f64) {
        self.total_requests += 1;
        self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / self.total_requests as f64;
        self.consecutive_failures = 0;
        self.status = SpotStatus::Healthy;
        self.last_healthy_at = Some(unix_millis());
        self.recompute_success_rate();
    }

    /// Records a failed analysis call.
    pub(crate) fn record_failure(&mut self, down_threshold: u32) {
        self.total_requests += 1;
        self.failure_count += 1;
        self.bump_consecutive_failures(down_threshold);
        self.recompute_success_rate();
    }

    /// Records a health-probe outcome. Probes drive status transitions but
    /// never touch the request counters or the success rate.
    pub(crate) fn record_probe(&mut self, healthy: bool, down_threshold: u32) {
        if healthy {
            self.consecutive_failures = 0;
            self.status = SpotStatus::Healthy;
            self.last_healthy_at = Some(unix_millis());
        } else {
            self.bump_consecutive_failures(down_threshold);
        }
    }

    fn bump_consecutive_failures(&mut self, down_threshold: u32) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= down_threshold {
            self.status = SpotStatus::Down;
        } else if self.status != SpotStatus::Down {
            self.status = SpotStatus::Degraded;
        }
    }

    fn recompute_success_rate(&mut self) {
        self.success_rate = if self.total_requests == 0 {
            1.0
        } else {
            (self.total_requests - self.failure_count) as f64 / self.total_requests as f64
        };
    }
}

impl Default for SpotMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration plus live metrics of one spot, keyed by `config.id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRecord {
    pub config: SpotConfig,
    pub metrics: SpotMetrics,
}

impl SpotRecord {
    pub fn new(config: SpotConfig) -> Self {
        Self {
            config,
            metrics: SpotMetrics::new(),
        }
    }
}
