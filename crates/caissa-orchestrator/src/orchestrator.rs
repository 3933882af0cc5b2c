use std::sync::Arc;
use std::time::Duration;

use caissa_common::protocol::{AnalysisRequest, AnalysisResult, CaissaError, SpotFailure};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{HttpSpotClient, SpotClient};
use crate::monitor::HealthMonitor;
use crate::probe::{HealthProbe, HttpHealthProbe};
use crate::registry::SpotRegistry;
use crate::selector;
use crate::spot::{SpotConfig, SpotRecord};

/// Tunables of the relay, normally supplied by the host application's
/// configuration layer.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for one analysis attempt against one spot.
    ///
    /// Default: 30s
    pub per_attempt_timeout: Duration,
    /// Failover budget beyond the initial attempt.
    ///
    /// Total attempts = min(max_retries + 1, candidate count).
    /// Default: 2
    pub max_retries: usize,
    /// Period of the background health-probe loop.
    ///
    /// Default: 30s
    pub health_check_interval: Duration,
    /// Deadline for one health probe, independent of the analysis timeout.
    ///
    /// Default: 5s
    pub probe_timeout: Duration,
    /// Consecutive failures at which a spot transitions to `Down`.
    ///
    /// Default: 3
    pub down_threshold: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            per_attempt_timeout: Duration::from_secs(30),
            max_retries: 2,
            health_check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            down_threshold: 3,
        }
    }
}

/// The analysis relay facade.
///
/// For each incoming request the orchestrator computes a candidate ordering
/// from a registry snapshot, attempts spots in that order up to the retry
/// budget, and returns the first success or a terminal aggregated failure.
/// The ordering is computed once per request, so a request's failover path is
/// deterministic even while concurrent requests update the metrics.
///
/// A background [`HealthMonitor`] probes every enabled spot and keeps the
/// registry's status fields current; it starts with the orchestrator and
/// stops on [`Orchestrator::shutdown`].
pub struct Orchestrator {
    registry: Arc<SpotRegistry>,
    client: Arc<dyn SpotClient>,
    probe: Arc<dyn HealthProbe>,
    config: OrchestratorConfig,
    shutdown: watch::Sender<bool>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over HTTP spots with default tunables.
    pub async fn new(spots: Vec<SpotConfig>) -> Result<Self, CaissaError> {
        Self::with_config(spots, OrchestratorConfig::default()).await
    }

    /// Creates an orchestrator over HTTP spots with custom tunables.
    pub async fn with_config(
        spots: Vec<SpotConfig>,
        config: OrchestratorConfig,
    ) -> Result<Self, CaissaError> {
        let probe = Arc::new(HttpHealthProbe::new(config.probe_timeout));
        Self::with_client(spots, config, Arc::new(HttpSpotClient::new()), probe).await
    }

    /// Creates an orchestrator with explicit client and probe
    /// implementations. This is the constructor the tests use to substitute
    /// scripted fakes for the network.
    pub async fn with_client(
        spots: Vec<SpotConfig>,
        config: OrchestratorConfig,
        client: Arc<dyn SpotClient>,
        probe: Arc<dyn HealthProbe>,
    ) -> Result<Self, CaissaError> {
        let registry = Arc::new(SpotRegistry::new(config.down_threshold));
        for spot in spots {
            registry.register(spot).await?;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&probe),
            config.health_check_interval,
            shutdown_rx,
        );
        let monitor_handle = monitor.spawn();

        info!(
            "orchestrator initialized with {} spot(s)",
            registry.spot_count().await
        );

        Ok(Self {
            registry,
            client,
            probe,
            config,
            shutdown,
            monitor_handle: Mutex::new(Some(monitor_handle)),
        })
    }

    /// Routes one analysis request to the best available spot, failing over
    /// across candidates on per-spot errors.
    ///
    /// # Errors
    /// - [`CaissaError::InvalidRequest`]: malformed request, nothing routed
    /// - [`CaissaError::NoUsableSpots`]: empty candidate ordering, no network
    ///   call made
    /// - [`CaissaError::AllSpotsDown`]: every attempted candidate failed;
    ///   carries the ordered per-spot failure trail
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, CaissaError> {
        request.validate()?;

        // One ordering per request; never re-queried mid-loop.
        let candidates = selector::order(&self.registry.snapshot().await);
        if candidates.is_empty() {
            return Err(CaissaError::NoUsableSpots);
        }

        let max_attempts = (self.config.max_retries + 1).min(candidates.len());
        let mut failures: Vec<SpotFailure> = Vec::new();

        for spot in candidates.iter().take(max_attempts) {
            match self
                .client
                .call(spot, request, self.config.per_attempt_timeout)
                .await
            {
                Ok(outcome) => {
                    self.registry
                        .report_outcome(&spot.id, true, outcome.latency_ms)
                        .await;
                    debug!(
                        "spot {} answered in {:.1}ms (attempt {})",
                        spot.id,
                        outcome.latency_ms,
                        failures.len() + 1
                    );
                    let mut result = outcome.result;
                    result.spot_id = Some(spot.id.clone());
                    return Ok(result);
                }
                Err(error) => {
                    self.registry.report_outcome(&spot.id, false, 0.0).await;
                    warn!("spot {} failed: {}; failing over", spot.id, error);
                    failures.push(SpotFailure {
                        spot_id: spot.id.clone(),
                        error,
                    });
                }
            }
        }

        Err(CaissaError::AllSpotsDown(failures))
    }

    /// Read-only snapshot of every registered spot, for the administrative
    /// surface.
    pub async fn list_spots(&self) -> Vec<SpotRecord> {
        self.registry.snapshot().await
    }

    /// Re-enables a spot for selection. Returns `false` if the id is unknown.
    pub async fn enable_spot(&self, id: &str) -> bool {
        let enabled = self.registry.set_enabled(id, true).await;
        if enabled {
            info!("spot {} enabled", id);
        }
        enabled
    }

    /// Excludes a spot from selection without touching its health state.
    /// Returns `false` if the id is unknown.
    pub async fn disable_spot(&self, id: &str) -> bool {
        let disabled = self.registry.set_enabled(id, false).await;
        if disabled {
            info!("spot {} disabled", id);
        }
        disabled
    }

    /// Probes one spot immediately, outside the monitor's schedule, and
    /// records the outcome. Returns the probe verdict.
    ///
    /// # Errors
    /// [`CaissaError::UnknownSpot`] if the id is not registered.
    pub async fn force_health_check(&self, id: &str) -> Result<bool, CaissaError> {
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| CaissaError::UnknownSpot(id.to_string()))?;
        let healthy = self.probe.check(&record.config).await;
        self.registry.report_probe(id, healthy).await;
        Ok(healthy)
    }

    pub async fn spot_count(&self) -> usize {
        self.registry.spot_count().await
    }

    /// Stops the health monitor and waits for it to finish. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.monitor_handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CallOutcome;
    use async_trait::async_trait;
    use caissa_common::protocol::SpotCallError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    /// Scripted client: per-spot verdicts, a total call counter and an
    /// ordered log of attempted spot ids.
    struct ScriptedClient {
        verdicts: HashMap<String, Result<f64, SpotCallError>>,
        calls: AtomicUsize,
        attempts: StdMutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(verdicts: &[(&str, Result<f64, SpotCallError>)]) -> Arc<Self> {
            Arc::new(Self {
                verdicts: verdicts
                    .iter()
                    .map(|(id, v)| (id.to_string(), v.clone()))
                    .collect(),
                calls: AtomicUsize::new(0),
                attempts: StdMutex::new(Vec::new()),
            })
        }

        fn attempted(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpotClient for ScriptedClient {
        async fn call(
            &self,
            spot: &SpotConfig,
            _request: &AnalysisRequest,
            _timeout: Duration,
        ) -> Result<CallOutcome, SpotCallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.attempts.lock().unwrap().push(spot.id.clone());
            match self.verdicts.get(&spot.id) {
                Some(Ok(latency_ms)) => Ok(CallOutcome {
                    result: AnalysisResult {
                        best_move: "e2e4".into(),
                        depth: 20,
                        lines: vec![],
                        spot_id: None,
                    },
                    latency_ms: *latency_ms,
                }),
                Some(Err(error)) => Err(error.clone()),
                None => Err(SpotCallError::ConnectionFailed("unscripted spot".into())),
            }
        }
    }

    /// Probe that always answers the same verdict.
    struct FixedProbe(bool);

    #[async_trait]
    impl HealthProbe for FixedProbe {
        async fn check(&self, _spot: &SpotConfig) -> bool {
            self.0
        }
    }

    fn refused() -> SpotCallError {
        SpotCallError::ConnectionFailed("connection refused".into())
    }

    /// Builds an orchestrator over scripted fakes with a dormant monitor
    /// (interval far beyond test duration), then warms each spot to Healthy
    /// through the probe path.
    async fn orchestrator_with(
        spots: Vec<SpotConfig>,
        client: Arc<ScriptedClient>,
        max_retries: usize,
    ) -> Orchestrator {
        let config = OrchestratorConfig {
            max_retries,
            health_check_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let ids: Vec<String> = spots.iter().map(|s| s.id.clone()).collect();
        let orchestrator =
            Orchestrator::with_client(spots, config, client, Arc::new(FixedProbe(true)))
                .await
                .unwrap();
        for id in &ids {
            orchestrator.force_health_check(id).await.unwrap();
        }
        orchestrator
    }

    #[tokio::test]
    async fn failover_reaches_the_second_spot() {
        let client = ScriptedClient::new(&[("a", Err(refused())), ("b", Ok(20.0))]);
        let spots = vec![
            SpotConfig::new("a", "a:9101").with_priority(100),
            SpotConfig::new("b", "b:9101").with_priority(90),
        ];
        let orchestrator = orchestrator_with(spots, Arc::clone(&client), 2).await;

        let result = orchestrator
            .analyze(&AnalysisRequest::new(FEN))
            .await
            .unwrap();
        assert_eq!(result.spot_id.as_deref(), Some("b"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.attempted(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn success_stops_the_failover_loop() {
        let client = ScriptedClient::new(&[("a", Ok(15.0)), ("b", Ok(10.0))]);
        let spots = vec![
            SpotConfig::new("a", "a:9101").with_priority(100),
            SpotConfig::new("b", "b:9101").with_priority(90),
        ];
        let orchestrator = orchestrator_with(spots, Arc::clone(&client), 2).await;

        let result = orchestrator
            .analyze(&AnalysisRequest::new(FEN))
            .await
            .unwrap();
        assert_eq!(result.spot_id.as_deref(), Some("a"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_one_failure_per_attempt() {
        let client = ScriptedClient::new(&[
            ("a", Err(refused())),
            ("b", Err(SpotCallError::Timeout(30_000))),
            ("c", Err(SpotCallError::BadResponse("HTTP 500".into()))),
        ]);
        let spots = vec![
            SpotConfig::new("a", "a:9101").with_priority(100),
            SpotConfig::new("b", "b:9101").with_priority(90),
            SpotConfig::new("c", "c:9101").with_priority(80),
        ];
        let orchestrator = orchestrator_with(spots, Arc::clone(&client), 2).await;

        let err = orchestrator
            .analyze(&AnalysisRequest::new(FEN))
            .await
            .unwrap_err();
        let CaissaError::AllSpotsDown(failures) = err else {
            panic!("expected AllSpotsDown, got {err}");
        };
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].spot_id, "a");
        assert_eq!(failures[1].spot_id, "b");
        assert_eq!(failures[2].spot_id, "c");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_budget_caps_attempts_below_candidate_count() {
        let client = ScriptedClient::new(&[
            ("a", Err(refused())),
            ("b", Err(refused())),
            ("c", Err(refused())),
            ("d", Ok(5.0)),
        ]);
        let spots = vec![
            SpotConfig::new("a", "a:9101").with_priority(100),
            SpotConfig::new("b", "b:9101").with_priority(90),
            SpotConfig::new("c", "c:9101").with_priority(80),
            SpotConfig::new("d", "d:9101").with_priority(70),
        ];
        // max_retries = 2 means at most 3 attempts; "d" would have succeeded
        // but is out of budget.
        let orchestrator = orchestrator_with(spots, Arc::clone(&client), 2).await;

        let err = orchestrator
            .analyze(&AnalysisRequest::new(FEN))
            .await
            .unwrap_err();
        let CaissaError::AllSpotsDown(failures) = err else {
            panic!("expected AllSpotsDown, got {err}");
        };
        assert_eq!(failures.len(), 3);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.attempted(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn single_spot_is_attempted_once() {
        let client = ScriptedClient::new(&[("only", Err(refused()))]);
        let spots = vec![SpotConfig::new("only", "only:9101")];
        let orchestrator = orchestrator_with(spots, Arc::clone(&client), 2).await;

        let err = orchestrator
            .analyze(&AnalysisRequest::new(FEN))
            .await
            .unwrap_err();
        assert!(matches!(err, CaissaError::AllSpotsDown(ref f) if f.len() == 1));
        // Never the same spot twice within one request.
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_spot_is_never_attempted() {
        let client = ScriptedClient::new(&[("vip", Ok(1.0)), ("backup", Ok(50.0))]);
        let spots = vec![
            SpotConfig::new("vip", "vip:9101").with_priority(200),
            SpotConfig::new("backup", "backup:9101").with_priority(10),
        ];
        let orchestrator = orchestrator_with(spots, Arc::clone(&client), 2).await;
        assert!(orchestrator.disable_spot("vip").await);

        let result = orchestrator
            .analyze(&AnalysisRequest::new(FEN))
            .await
            .unwrap();
        assert_eq!(result.spot_id.as_deref(), Some("backup"));
        assert_eq!(client.attempted(), vec!["backup"]);
    }

    #[tokio::test]
    async fn no_usable_spots_short_circuits_without_calls() {
        let client = ScriptedClient::new(&[("a", Ok(1.0))]);
        let spots = vec![SpotConfig::new("a", "a:9101")];
        let orchestrator = orchestrator_with(spots, Arc::clone(&client), 2).await;
        orchestrator.disable_spot("a").await;

        let err = orchestrator
            .analyze(&AnalysisRequest::new(FEN))
            .await
            .unwrap_err();
        assert!(matches!(err, CaissaError::NoUsableSpots));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_status_spots_are_not_routed() {
        // No warm-up here: freshly registered spots are Unknown and must not
        // be selected even though they would succeed.
        let client = ScriptedClient::new(&[("a", Ok(1.0))]);
        let config = OrchestratorConfig {
            health_check_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let orchestrator = Orchestrator::with_client(
            vec![SpotConfig::new("a", "a:9101")],
            config,
            Arc::clone(&client) as Arc<dyn SpotClient>,
            Arc::new(FixedProbe(true)),
        )
        .await
        .unwrap();

        let err = orchestrator
            .analyze(&AnalysisRequest::new(FEN))
            .await
            .unwrap_err();
        assert!(matches!(err, CaissaError::NoUsableSpots));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_request_is_never_routed() {
        let client = ScriptedClient::new(&[("a", Ok(1.0))]);
        let spots = vec![SpotConfig::new("a", "a:9101")];
        let orchestrator = orchestrator_with(spots, Arc::clone(&client), 2).await;

        let err = orchestrator
            .analyze(&AnalysisRequest::new("not a fen"))
            .await
            .unwrap_err();
        assert!(matches!(err, CaissaError::InvalidRequest(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_attempts_update_spot_metrics() {
        let client = ScriptedClient::new(&[("a", Err(refused())), ("b", Ok(20.0))]);
        let spots = vec![
            SpotConfig::new("a", "a:9101").with_priority(100),
            SpotConfig::new("b", "b:9101").with_priority(90),
        ];
        let orchestrator = orchestrator_with(spots, Arc::clone(&client), 2).await;

        orchestrator
            .analyze(&AnalysisRequest::new(FEN))
            .await
            .unwrap();

        let records = orchestrator.list_spots().await;
        let a = records.iter().find(|r| r.config.id == "a").unwrap();
        let b = records.iter().find(|r| r.config.id == "b").unwrap();
        assert_eq!(a.metrics.failure_count, 1);
        assert_eq!(a.metrics.consecutive_failures, 1);
        assert_eq!(b.metrics.total_requests, 1);
        assert!((b.metrics.avg_latency_ms - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn duplicate_spot_ids_fail_construction() {
        let client = ScriptedClient::new(&[]);
        let spots = vec![
            SpotConfig::new("dup", "a:9101"),
            SpotConfig::new("dup", "b:9101"),
        ];
        let err = Orchestrator::with_client(
            spots,
            OrchestratorConfig::default(),
            client as Arc<dyn SpotClient>,
            Arc::new(FixedProbe(true)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CaissaError::DuplicateSpot(_)));
    }

    #[tokio::test]
    async fn force_health_check_unknown_spot_errors() {
        let client = ScriptedClient::new(&[]);
        let orchestrator = orchestrator_with(vec![], client, 2).await;
        let err = orchestrator.force_health_check("ghost").await.unwrap_err();
        assert!(matches!(err, CaissaError::UnknownSpot(_)));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let client = ScriptedClient::new(&[]);
        let orchestrator = orchestrator_with(vec![], client, 2).await;
        orchestrator.shutdown().await;
        orchestrator.shutdown().await;
    }
}
