use std::time::Duration;

use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::spot::SpotConfig;

/// Default probe deadline. Deliberately much shorter than the analysis
/// timeout; a probe is a cheap liveness signal, not a real call.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Performs one lightweight liveness check against one spot.
///
/// `true` only on a positive signal from the spot's health endpoint; any
/// error, timeout or non-affirmative response is `false`. Probes are
/// side-effect free; the health monitor translates the boolean into a
/// registry update.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, spot: &SpotConfig) -> bool;
}

/// HTTP implementation of [`HealthProbe`]: GET `http://{endpoint}/__health`,
/// affirmative on HTTP 200.
#[derive(Debug)]
pub struct HttpHealthProbe {
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, spot: &SpotConfig) -> bool {
        let url = format!("http://{}/__health", spot.endpoint);
        let Ok(http_request) = Request::builder()
            .method("GET")
            .uri(&url)
            .body(Full::new(Bytes::new()))
        else {
            return false;
        };

        let client = Client::builder(TokioExecutor::new()).build_http();
        match tokio::time::timeout(self.timeout, client.request(http_request)).await {
            Ok(Ok(response)) => response.status().is_success(),
            // Timeout or transport error, either way not alive.
            _ => false,
        }
    }
}
