//! # Caissa Common
//!
//! Shared protocol types for the Caissa analysis relay.
//!
//! This crate defines the wire format exchanged between the relay and its
//! analysis spots, plus the error taxonomy shared by every component:
//!
//! - [`protocol::AnalysisRequest`] / [`protocol::AnalysisResult`]: a single
//!   position-analysis exchange
//! - [`protocol::CaissaError`]: errors surfaced to callers of the relay
//! - [`protocol::SpotCallError`]: per-attempt failure classification

pub mod protocol;
