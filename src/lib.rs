//! Profile steering: FRBC device planning by state-space search, negotiated
//! across congestion points against a global energy target.

pub mod config;
pub mod error;
pub mod frbc;
pub mod planning;
pub mod profile;
pub mod scenario;
pub mod telemetry;
