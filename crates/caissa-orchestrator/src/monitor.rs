use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::probe::HealthProbe;
use crate::registry::SpotRegistry;

/// Background health monitor.
///
/// Spawned once at orchestrator startup. Every `interval` it snapshots the
/// registry and probes each enabled spot; probes within one cycle run
/// concurrently, so one hanging spot cannot delay the others (each probe
/// carries its own deadline). Individual probe failures are logged and fed
/// into the registry; nothing short of the shutdown signal stops the loop.
pub struct HealthMonitor {
    registry: Arc<SpotRegistry>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<SpotRegistry>,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            probe,
            interval,
            shutdown,
        }
    }

    /// Starts the monitor task. The first probe cycle runs immediately, so
    /// spots leave `Unknown` as soon as they answer a probe.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.probe_all_spots().await,
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("health monitor stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Probes every enabled spot once and reports the outcomes.
    async fn probe_all_spots(&self) {
        let records = self.registry.snapshot().await;

        let checks: Vec<_> = records
            .iter()
            .filter(|r| r.config.enabled)
            .map(|record| {
                let probe = Arc::clone(&self.probe);
                let config = record.config.clone();
                async move {
                    let healthy = probe.check(&config).await;
                    (config.id, healthy)
                }
            })
            .collect();

        for (id, healthy) in join_all(checks).await {
            if healthy {
                debug!("health probe passed for spot {}", id);
            } else {
                warn!("health probe failed for spot {}", id);
            }
            self.registry.report_probe(&id, healthy).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spot::{SpotConfig, SpotStatus};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that answers from a fixed table and counts checks per spot.
    struct TableProbe {
        verdicts: HashMap<String, bool>,
        checks: AtomicUsize,
    }

    impl TableProbe {
        fn new(verdicts: &[(&str, bool)]) -> Arc<Self> {
            Arc::new(Self {
                verdicts: verdicts
                    .iter()
                    .map(|(id, healthy)| (id.to_string(), *healthy))
                    .collect(),
                checks: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HealthProbe for TableProbe {
        async fn check(&self, spot: &SpotConfig) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.verdicts.get(&spot.id).copied().unwrap_or(false)
        }
    }

    async fn registry_with(ids: &[&str]) -> Arc<SpotRegistry> {
        let registry = Arc::new(SpotRegistry::new(3));
        for id in ids {
            registry
                .register(SpotConfig::new(*id, format!("{id}:9101")))
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn one_cycle_updates_every_enabled_spot() {
        let registry = registry_with(&["alpha", "beta"]).await;
        let probe = TableProbe::new(&[("alpha", true), ("beta", false)]);
        let (_tx, rx) = watch::channel(false);

        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            probe.clone(),
            Duration::from_secs(3600),
            rx,
        );
        monitor.probe_all_spots().await;

        assert_eq!(
            registry.get("alpha").await.unwrap().metrics.status,
            SpotStatus::Healthy
        );
        assert_eq!(
            registry.get("beta").await.unwrap().metrics.status,
            SpotStatus::Degraded
        );
        assert_eq!(probe.checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_spots_are_not_probed() {
        let registry = registry_with(&["alpha", "beta"]).await;
        registry.set_enabled("beta", false).await;
        let probe = TableProbe::new(&[("alpha", true), ("beta", true)]);
        let (_tx, rx) = watch::channel(false);

        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            probe.clone(),
            Duration::from_secs(3600),
            rx,
        );
        monitor.probe_all_spots().await;

        assert_eq!(probe.checks.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry.get("beta").await.unwrap().metrics.status,
            SpotStatus::Unknown
        );
    }

    #[tokio::test]
    async fn loop_probes_immediately_and_stops_on_shutdown() {
        let registry = registry_with(&["alpha"]).await;
        let probe = TableProbe::new(&[("alpha", true)]);
        let (tx, rx) = watch::channel(false);

        let handle = HealthMonitor::new(
            Arc::clone(&registry),
            probe.clone(),
            Duration::from_secs(3600),
            rx,
        )
        .spawn();

        // The first tick fires on spawn.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if registry.get("alpha").await.unwrap().metrics.status == SpotStatus::Healthy {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("spot never became healthy");

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn repeated_cycles_take_a_spot_down() {
        let registry = registry_with(&["alpha"]).await;
        let probe = TableProbe::new(&[("alpha", false)]);
        let (_tx, rx) = watch::channel(false);

        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            probe,
            Duration::from_secs(3600),
            rx,
        );
        for _ in 0..3 {
            monitor.probe_all_spots().await;
        }

        assert_eq!(
            registry.get("alpha").await.unwrap().metrics.status,
            SpotStatus::Down
        );
    }
}
