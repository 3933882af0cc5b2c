//! # Caissa Orchestrator
//!
//! Routing layer that sends chess-position analysis requests to one of
//! several interchangeable compute backends ("spots"), picks the best spot
//! from live health and performance metrics, detects failure quickly and
//! fails over transparently within a bounded retry budget.
//!
//! The moving parts:
//!
//! - [`spot`]: per-spot configuration and live metrics
//! - [`registry::SpotRegistry`]: the single synchronized owner of spot state
//! - [`selector`]: pure best-first candidate ordering
//! - [`client::SpotClient`]: one analysis call, one deadline, classified errors
//! - [`probe::HealthProbe`]: one cheap liveness check
//! - [`monitor::HealthMonitor`]: background probe loop, concurrent with traffic
//! - [`orchestrator::Orchestrator`]: the facade callers talk to
//! - [`http_server::HttpServer`]: REST surface for hosts and admins

pub mod client;
pub mod http_server;
pub mod monitor;
pub mod orchestrator;
pub mod probe;
pub mod registry;
pub mod selector;
pub mod spot;

pub use client::{CallOutcome, HttpSpotClient, SpotClient};
pub use http_server::HttpServer;
pub use monitor::HealthMonitor;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use probe::{HealthProbe, HttpHealthProbe};
pub use registry::SpotRegistry;
pub use spot::{SpotConfig, SpotMetrics, SpotRecord, SpotStatus};
