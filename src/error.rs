use chrono::{DateTime, Utc};
use thiserror::Error;

/// Planning errors surfaced by profile arithmetic, the device search and the negotiation protocol
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanningError {
    #[error("Incompatible profiles: expected {expected}, got {actual}")]
    IncompatibleProfile { expected: String, actual: String },

    #[error("Instant {instant} is outside profile range [{start}, {end}]")]
    OutOfRange {
        instant: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid profile metadata: {0}")]
    InvalidMetadata(String),

    #[error("Element count mismatch: expected {expected}, got {actual}")]
    ElementCountMismatch { expected: usize, actual: usize },

    #[error("Device '{0}' has no accepted plan")]
    NoAcceptedPlan(String),

    #[error("Planner '{planner}' received a proposal originating from '{origin}'")]
    ForeignProposal { planner: String, origin: String },

    #[error("Device '{0}' received a proposal that does not match its latest plan")]
    StaleProposal(String),

    #[error("Device '{device}' received a proposal with negative congestion improvement ({improvement})")]
    RegressiveProposal { device: String, improvement: f64 },

    #[error("No feasible plan for device '{device}': {reason}")]
    NoFeasiblePlan { device: String, reason: String },

    #[error("Unknown actuator: {0}")]
    UnknownActuator(String),
}

pub type Result<T, E = PlanningError> = std::result::Result<T, E>;
