//! Fill-level/rate-based control (FRBC) device planning.
//!
//! A device describes its actuators, operation modes and storage over time;
//! [`OperationModeProfileTree`] searches the reachable fill levels per
//! timestep and [`FrbcDevicePlanner`] exposes the result to the negotiation.

pub mod capabilities;
pub mod model;
pub mod plan;
pub mod planner;
pub mod selection;
pub mod state;
pub mod timestep;
pub mod tree;

pub use capabilities::{ActuatorConfiguration, ActuatorConfigurations, CapabilityTables};
pub use model::{
    ActuatorDescription, ActuatorStatus, CommodityQuantity, ComputationalParameters,
    FillLevelTargetElement, FillLevelTargetProfile, FrbcDeviceState, LeakageBehaviour,
    LeakageBehaviourElement, NumberRange, OperationMode, OperationModeElement, PowerRange,
    StorageDescription, StorageStatus, SystemDescription, Timer, Transition, UsageForecast,
    UsageForecastElement,
};
pub use plan::{FrbcPlan, InstructionElement, InstructionProfile};
pub use planner::FrbcDevicePlanner;
pub use selection::{SelectionReason, SelectionResult};
pub use state::{FrbcState, StateArena, StateId};
pub use timestep::{FillLevelBounds, FrbcTimestep};
pub use tree::OperationModeProfileTree;
