//! HTTP surface for the relay.
//!
//! Exposes the orchestrator's analyze entry point and the administrative
//! spot operations over plain JSON/REST using axum.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use caissa_common::protocol::{AnalysisRequest, CaissaError};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::orchestrator::Orchestrator;

/// HTTP server wrapping an [`Orchestrator`].
///
/// Routes:
/// - `POST /analyze`: route one analysis request
/// - `GET /spots`: metrics snapshot of every spot
/// - `POST /spots/{id}/enable`, `POST /spots/{id}/disable`: admin toggles
/// - `POST /spots/{id}/probe`: force an immediate health check
/// - `GET /__health`: liveness of the relay itself
pub struct HttpServer {
    orchestrator: Arc<Orchestrator>,
}

impl HttpServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Builds the axum router. Split out of [`HttpServer::run`] so tests can
    /// serve it on an ephemeral port.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/analyze", post(handle_analyze))
            .route("/spots", get(handle_list_spots))
            .route("/spots/{id}/enable", post(handle_enable))
            .route("/spots/{id}/disable", post(handle_disable))
            .route("/spots/{id}/probe", post(handle_probe))
            .route("/__health", get(health_check))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.orchestrator))
    }

    /// Binds `addr` and serves until the process is stopped.
    pub async fn run(self, addr: SocketAddr) -> Result<(), CaissaError> {
        let app = self.router();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CaissaError::Transport(format!("failed to bind {addr}: {e}")))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| CaissaError::Transport(format!("failed to get local addr: {e}")))?;
        info!("relay HTTP server listening on {}", local_addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| CaissaError::Transport(format!("server error: {e}")))?;

        Ok(())
    }
}

/// Maps relay errors onto HTTP statuses: bad input is the caller's fault,
/// exhausted or empty candidate sets are service-unavailable, unknown ids
/// are not-found.
fn error_response(error: CaissaError) -> Response {
    let status = match &error {
        CaissaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CaissaError::NoUsableSpots | CaissaError::AllSpotsDown(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CaissaError::UnknownSpot(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

async fn handle_analyze(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<AnalysisRequest>,
) -> Response {
    match orchestrator.analyze(&request).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn handle_list_spots(State(orchestrator): State<Arc<Orchestrator>>) -> Response {
    (StatusCode::OK, Json(orchestrator.list_spots().await)).into_response()
}

async fn handle_enable(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> Response {
    if orchestrator.enable_spot(&id).await {
        (StatusCode::OK, Json(json!({ "id": id, "enabled": true }))).into_response()
    } else {
        error_response(CaissaError::UnknownSpot(id))
    }
}

async fn handle_disable(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> Response {
    if orchestrator.disable_spot(&id).await {
        (StatusCode::OK, Json(json!({ "id": id, "enabled": false }))).into_response()
    } else {
        error_response(CaissaError::UnknownSpot(id))
    }
}

async fn handle_probe(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> Response {
    match orchestrator.force_health_check(&id).await {
        Ok(healthy) => {
            (StatusCode::OK, Json(json!({ "id": id, "healthy": healthy }))).into_response()
        }
        Err(error) => error_response(error),
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn server_creation() {
        let orchestrator = Arc::new(Orchestrator::new(vec![]).await.unwrap());
        let server = HttpServer::new(Arc::clone(&orchestrator));
        // Router construction must not panic on an empty registry.
        let _ = server.router();
        orchestrator.shutdown().await;
    }

    #[test]
    fn error_statuses() {
        let cases = [
            (
                error_response(CaissaError::InvalidRequest("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                error_response(CaissaError::NoUsableSpots),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                error_response(CaissaError::AllSpotsDown(vec![])),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                error_response(CaissaError::UnknownSpot("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                error_response(CaissaError::Transport("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (response, expected) in cases {
            assert_eq!(response.status(), expected);
        }
    }
}
