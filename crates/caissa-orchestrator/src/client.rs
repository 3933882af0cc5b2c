use std::time::{Duration, Instant};

use async_trait::async_trait;
use caissa_common::protocol::{AnalysisRequest, AnalysisResult, SpotCallError};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

/// A successful analysis call: the parsed result plus the measured latency.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub result: AnalysisResult,
    pub latency_ms: f64,
}

/// Performs one analysis call against one spot.
///
/// A client enforces the per-attempt timeout and classifies any non-success
/// outcome as [`SpotCallError::Timeout`], [`SpotCallError::ConnectionFailed`]
/// or [`SpotCallError::BadResponse`]. It never retries and never touches the
/// registry; failover and metrics reporting belong to the orchestrator.
#[async_trait]
pub trait SpotClient: Send + Sync {
    async fn call(
        &self,
        spot: &crate::spot::SpotConfig,
        request: &AnalysisRequest,
        timeout: Duration,
    ) -> Result<CallOutcome, SpotCallError>;
}

/// HTTP implementation of [`SpotClient`].
///
/// POSTs the request as JSON to `http://{endpoint}/analyze`. Each call builds
/// a fresh hyper client, so concurrent requests to the same spot proceed
/// independently.
#[derive(Debug, Default)]
pub struct HttpSpotClient;

impl HttpSpotClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SpotClient for HttpSpotClient {
    async fn call(
        &self,
        spot: &crate::spot::SpotConfig,
        request: &AnalysisRequest,
        timeout: Duration,
    ) -> Result<CallOutcome, SpotCallError> {
        let url = format!("http://{}/analyze", spot.endpoint);
        let body = serde_json::to_vec(request)
            .map_err(|e| SpotCallError::BadResponse(format!("failed to encode request: {e}")))?;

        let http_request = Request::builder()
            .method("POST")
            .uri(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| SpotCallError::ConnectionFailed(format!("failed to build request: {e}")))?;

        let client = Client::builder(TokioExecutor::new()).build_http();
        let started = Instant::now();

        // One deadline covers connect, send and body read.
        let (status, bytes) = tokio::time::timeout(timeout, async {
            let response = client
                .request(http_request)
                .await
                .map_err(|e| SpotCallError::ConnectionFailed(e.to_string()))?;
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| {
                    SpotCallError::ConnectionFailed(format!("failed to read response: {e}"))
                })?
                .to_bytes();
            Ok::<_, SpotCallError>((status, bytes))
        })
        .await
        .map_err(|_| SpotCallError::Timeout(timeout.as_millis() as u64))??;

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !status.is_success() {
            return Err(SpotCallError::BadResponse(format!(
                "spot returned HTTP {status}"
            )));
        }
        if bytes.is_empty() {
            return Err(SpotCallError::BadResponse("empty response body".into()));
        }

        let result: AnalysisResult = serde_json::from_slice(&bytes).map_err(|e| {
            SpotCallError::BadResponse(format!("malformed analysis payload: {e}"))
        })?;

        Ok(CallOutcome { result, latency_ms })
    }
}
