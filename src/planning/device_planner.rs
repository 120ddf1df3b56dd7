use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::proposal::Proposal;
use crate::error::Result;
use crate::frbc::{InstructionProfile, SelectionReason};
use crate::profile::{BoundProfile, EnergyProfile, FillLevelProfile, TargetProfile};

/// Identity of a proposal source within one planning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlannerId(Uuid);

impl PlannerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlannerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlannerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accepted trajectory of one device, as handed to the surrounding system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevicePlan {
    pub device_id: String,
    pub device_name: String,
    pub connection_id: String,
    pub energy: EnergyProfile,
    pub fill_level: Option<FillLevelProfile>,
    pub instructions: InstructionProfile,
    pub selection_reasons: Vec<Option<SelectionReason>>,
}

/// Negotiation contract of a single steerable device.
///
/// A planner keeps a *latest* plan (its last computed candidate) and an
/// *accepted* plan (the one the aggregate currently counts). Proposals
/// always compare the two.
#[cfg_attr(test, mockall::automock)]
pub trait DevicePlanner: Send {
    fn id(&self) -> PlannerId;

    fn name(&self) -> String;

    fn priority_class(&self) -> i32;

    /// Plan without targets and accept the result
    fn create_initial_planning(&mut self, plan_due_by: DateTime<Utc>) -> Result<EnergyProfile>;

    /// Candidate plan against differences relative to the current aggregate
    fn create_improved_planning(
        &mut self,
        diff_to_target: &TargetProfile,
        diff_to_max: &BoundProfile,
        diff_to_min: &BoundProfile,
        plan_due_by: DateTime<Utc>,
    ) -> Result<Proposal>;

    fn accept_proposal(&mut self, proposal: &Proposal) -> Result<()>;

    /// Energy of the accepted plan
    fn current_profile(&self) -> Result<EnergyProfile>;

    fn device_plan(&self) -> Option<DevicePlan>;
}
