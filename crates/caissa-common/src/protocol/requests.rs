use serde::{Deserialize, Serialize};

use crate::protocol::error::CaissaError;

/// Maximum accepted search depth.
pub const MAX_DEPTH: u32 = 64;
/// Maximum number of principal variations a request may ask for.
pub const MAX_MULTI_PV: u32 = 16;
/// Maximum accepted move time, ten minutes.
pub const MAX_MOVETIME_MS: u64 = 600_000;

/// A position-analysis request, as accepted by the relay and forwarded to a
/// spot's `/analyze` endpoint.
///
/// The position is given in Forsyth-Edwards Notation. Search parameters are
/// all optional; a spot applies its own defaults for whatever is omitted.
///
/// # Example
///
/// ```
/// use caissa_common::protocol::AnalysisRequest;
///
/// let request = AnalysisRequest {
///     fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".into(),
///     depth: Some(20),
///     multi_pv: None,
///     movetime_ms: None,
/// };
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Position to analyze, in FEN.
    pub fen: String,
    /// Search depth limit in plies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    /// Number of principal variations to report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_pv: Option<u32>,
    /// Wall-clock search budget in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movetime_ms: Option<u64>,
}

impl AnalysisRequest {
    /// Creates a request with no explicit search limits.
    pub fn new(fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into(),
            depth: None,
            multi_pv: None,
            movetime_ms: None,
        }
    }

    /// Validates the request structurally.
    ///
    /// This is a gatekeeping check, not a legality check: the relay verifies
    /// the FEN has the right shape and the search parameters are within
    /// bounds, and leaves full position legality to the engine behind the
    /// spot.
    ///
    /// # Errors
    /// Returns [`CaissaError::InvalidRequest`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<(), CaissaError> {
        let fields: Vec<&str> = self.fen.split_whitespace().collect();
        if fields.is_empty() {
            return Err(CaissaError::InvalidRequest("empty FEN".into()));
        }
        if fields.len() < 4 || fields.len() > 6 {
            return Err(CaissaError::InvalidRequest(format!(
                "FEN must have 4 to 6 fields, got {}",
                fields.len()
            )));
        }
        let ranks = fields[0].split('/').count();
        if ranks != 8 {
            return Err(CaissaError::InvalidRequest(format!(
                "FEN board must have 8 ranks, got {ranks}"
            )));
        }
        if fields[1] != "w" && fields[1] != "b" {
            return Err(CaissaError::InvalidRequest(format!(
                "FEN side to move must be 'w' or 'b', got '{}'",
                fields[1]
            )));
        }
        if let Some(depth) = self.depth {
            if depth == 0 || depth > MAX_DEPTH {
                return Err(CaissaError::InvalidRequest(format!(
                    "depth must be in 1..={MAX_DEPTH}, got {depth}"
                )));
            }
        }
        if let Some(multi_pv) = self.multi_pv {
            if multi_pv == 0 || multi_pv > MAX_MULTI_PV {
                return Err(CaissaError::InvalidRequest(format!(
                    "multi_pv must be in 1..={MAX_MULTI_PV}, got {multi_pv}"
                )));
            }
        }
        if let Some(movetime_ms) = self.movetime_ms {
            if movetime_ms == 0 || movetime_ms > MAX_MOVETIME_MS {
                return Err(CaissaError::InvalidRequest(format!(
                    "movetime_ms must be in 1..={MAX_MOVETIME_MS}, got {movetime_ms}"
                )));
            }
        }
        Ok(())
    }
}
