use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaissaError>;

/// Classification of a single failed call against one spot.
///
/// The relay never inspects a failure further than these three buckets:
/// every transport-level problem is either a deadline miss, a failure to
/// reach the spot at all, or a response the relay could not accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpotCallError {
    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("bad response: {0}")]
    BadResponse(String),
}

/// One entry in the failure trail of an exhausted analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotFailure {
    pub spot_id: String,
    pub error: SpotCallError,
}

impl fmt::Display for SpotFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.spot_id, self.error)
    }
}

fn format_failures(failures: &[SpotFailure]) -> String {
    failures
        .iter()
        .map(SpotFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by the Caissa relay.
///
/// Per-spot failures are absorbed into registry state and the failover loop;
/// only request validation and the two "no candidate succeeded" outcomes
/// ([`CaissaError::NoUsableSpots`], [`CaissaError::AllSpotsDown`]) escape to
/// the caller.
#[derive(Error, Debug)]
pub enum CaissaError {
    /// Malformed request, detected before any spot is selected. Never routed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No enabled spot is in a selectable state. No network call was made.
    #[error("no usable spots available")]
    NoUsableSpots,

    /// Every attempted candidate failed. Carries the ordered failure trail.
    #[error("all spots failed after {} attempt(s): {}", .0.len(), format_failures(.0))]
    AllSpotsDown(Vec<SpotFailure>),

    #[error("spot already registered: {0}")]
    DuplicateSpot(String),

    #[error("unknown spot: {0}")]
    UnknownSpot(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
