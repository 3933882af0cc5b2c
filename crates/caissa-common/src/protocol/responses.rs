use serde::{Deserialize, Serialize};

/// One principal variation reported by an engine.
///
/// Exactly one of `score_cp` and `mate_in` is normally present; a forced
/// mate is reported as moves-to-mate rather than a centipawn value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalLine {
    /// Moves of the variation in coordinate notation, best first.
    pub pv: Vec<String>,
    /// Evaluation in centipawns from the side to move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_cp: Option<i32>,
    /// Moves until mate, negative if the side to move is being mated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mate_in: Option<i32>,
}

/// The aggregated evaluation a spot returns for one analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Best move in coordinate notation (e.g. "e2e4").
    pub best_move: String,
    /// Depth actually reached by the search.
    pub depth: u32,
    /// Principal variations, one per requested PV.
    #[serde(default)]
    pub lines: Vec<EvalLine>,
    /// Identifier of the spot that produced this result. Spots leave this
    /// empty; the relay stamps it before returning to the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_id: Option<String>,
}
