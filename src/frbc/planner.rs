use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::capabilities::latest_before;
use super::model::FrbcDeviceState;
use super::plan::FrbcPlan;
use super::tree::OperationModeProfileTree;
use crate::error::{PlanningError, Result};
use crate::planning::{DevicePlan, DevicePlanner, PlannerId, Proposal};
use crate::profile::{BoundProfile, EnergyProfile, ProfileMetadata, TargetProfile};

/// Device planner for fill-level/rate-based controlled storage
#[derive(Debug)]
pub struct FrbcDevicePlanner {
    id: PlannerId,
    device: Arc<FrbcDeviceState>,
    metadata: ProfileMetadata,
    tree: Option<OperationModeProfileTree>,
    latest_plan: Option<FrbcPlan>,
    accepted_plan: Option<FrbcPlan>,
}

impl FrbcDevicePlanner {
    pub fn new(device: FrbcDeviceState, metadata: ProfileMetadata, plan_due_by: DateTime<Utc>) -> Self {
        let device = Arc::new(device);
        let tree = is_storage_available(&device, &metadata)
            .then(|| OperationModeProfileTree::new(Arc::clone(&device), metadata, plan_due_by));
        if tree.is_none() {
            debug!(device = %device.device_id, "storage unavailable, planning idle");
        }
        Self {
            id: PlannerId::new(),
            device,
            metadata,
            tree,
            latest_plan: None,
            accepted_plan: None,
        }
    }

    pub fn device(&self) -> &FrbcDeviceState {
        &self.device
    }

    pub fn is_storage_available(&self) -> bool {
        self.tree.is_some()
    }

    pub fn latest_plan(&self) -> Option<&FrbcPlan> {
        self.latest_plan.as_ref()
    }

    pub fn accepted_plan(&self) -> Option<&FrbcPlan> {
        self.accepted_plan.as_ref()
    }

    /// Run the search, rebuilding the timesteps if the due-by instant moved
    fn plan(
        &mut self,
        target: &TargetProfile,
        min: &BoundProfile,
        max: &BoundProfile,
        plan_due_by: DateTime<Utc>,
    ) -> Result<FrbcPlan> {
        let Some(tree) = self.tree.as_mut() else {
            return Ok(FrbcPlan::idle(self.metadata));
        };
        if tree.plan_due_by() != plan_due_by {
            *tree = OperationModeProfileTree::new(Arc::clone(&self.device), self.metadata, plan_due_by);
        }
        tree.find_best_plan(target, min, max)
    }

    fn no_accepted_plan(&self) -> PlanningError {
        PlanningError::NoAcceptedPlan(self.device.device_id.clone())
    }
}

impl DevicePlanner for FrbcDevicePlanner {
    fn id(&self) -> PlannerId {
        self.id
    }

    fn name(&self) -> String {
        self.device.device_name.clone()
    }

    fn priority_class(&self) -> i32 {
        self.device.priority_class
    }

    fn create_initial_planning(&mut self, plan_due_by: DateTime<Utc>) -> Result<EnergyProfile> {
        let unbounded = BoundProfile::unbounded(self.metadata);
        let plan = self.plan(
            &TargetProfile::null_profile(self.metadata),
            &unbounded,
            &unbounded,
            plan_due_by,
        )?;
        let energy = plan.energy.clone();
        self.latest_plan = Some(plan.clone());
        self.accepted_plan = Some(plan);
        Ok(energy)
    }

    fn create_improved_planning(
        &mut self,
        diff_to_target: &TargetProfile,
        diff_to_max: &BoundProfile,
        diff_to_min: &BoundProfile,
        plan_due_by: DateTime<Utc>,
    ) -> Result<Proposal> {
        let accepted = self
            .accepted_plan
            .as_ref()
            .map(|plan| plan.energy.clone())
            .ok_or_else(|| self.no_accepted_plan())?;

        let target = diff_to_target.add(&accepted)?;
        let max = diff_to_max.add_energy(&accepted)?;
        let min = diff_to_min.add_energy(&accepted)?;
        let plan = self.plan(&target, &min, &max, plan_due_by)?;

        let proposal = Proposal::new(
            diff_to_target.clone(),
            diff_to_max.clone(),
            diff_to_min.clone(),
            plan.energy.clone(),
            accepted,
            self.id,
            self.device.device_name.clone(),
        )?;
        self.latest_plan = Some(plan);
        Ok(proposal)
    }

    fn accept_proposal(&mut self, proposal: &Proposal) -> Result<()> {
        if proposal.origin() != self.id {
            return Err(PlanningError::ForeignProposal {
                planner: self.device.device_id.clone(),
                origin: proposal.origin_name().to_string(),
            });
        }
        let latest = self.latest_plan.as_ref().ok_or_else(|| self.no_accepted_plan())?;
        if proposal.proposed_plan() != &latest.energy {
            return Err(PlanningError::StaleProposal(self.device.device_id.clone()));
        }
        let improvement = proposal.congestion_improvement();
        if improvement < 0.0 {
            warn!(device = %self.device.device_id, improvement, "rejecting regressive proposal");
            return Err(PlanningError::RegressiveProposal {
                device: self.device.device_id.clone(),
                improvement,
            });
        }
        self.accepted_plan = self.latest_plan.clone();
        Ok(())
    }

    fn current_profile(&self) -> Result<EnergyProfile> {
        self.accepted_plan
            .as_ref()
            .map(|plan| plan.energy.clone())
            .ok_or_else(|| self.no_accepted_plan())
    }

    fn device_plan(&self) -> Option<DevicePlan> {
        let plan = self.accepted_plan.as_ref()?;
        Some(DevicePlan {
            device_id: self.device.device_id.clone(),
            device_name: self.device.device_name.clone(),
            connection_id: self.device.connection_id.clone(),
            energy: plan.energy.clone(),
            fill_level: plan.fill_level.clone(),
            instructions: plan.instructions(),
            selection_reasons: plan.selection_reasons.clone(),
        })
    }
}

/// Online, with a storage status and a system description active in or
/// starting inside the horizon
pub fn is_storage_available(device: &FrbcDeviceState, metadata: &ProfileMetadata) -> bool {
    if !device.is_online || device.storage_status.is_none() {
        return false;
    }
    let window_start = latest_before(&device.system_descriptions, metadata.start(), |sd| sd.valid_from)
        .map_or(metadata.start(), |i| device.system_descriptions[i].valid_from);
    device
        .system_descriptions
        .iter()
        .any(|sd| sd.valid_from >= window_start && sd.valid_from < metadata.end())
}
