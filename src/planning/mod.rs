//! Multi-round profile steering negotiation.
//!
//! Devices propose plans, congestion points pick the best proposal of their
//! devices, and the root picks the best proposal over all congestion points,
//! one accepted proposal per round.

pub mod congestion_point;
pub mod device_planner;
pub mod proposal;
pub mod root;

pub use congestion_point::CongestionPointPlanner;
#[cfg(test)]
pub use device_planner::MockDevicePlanner;
pub use device_planner::{DevicePlan, DevicePlanner, PlannerId};
pub use proposal::Proposal;
pub use root::{PlanningOutcome, PriorityClassRounds, RootPlanner, RootPlannerState};

/// Round cap per priority class (root) and per initial planning (congestion point)
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;
