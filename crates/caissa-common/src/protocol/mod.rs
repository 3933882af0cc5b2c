pub mod error;
pub mod requests;
pub mod responses;


pub use error::{CaissaError, Result, SpotCallError, SpotFailure};
pub use requests::AnalysisRequest;
pub use responses::{AnalysisResult, EvalLine};
