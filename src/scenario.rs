//! Planning scenarios read by the binary, and the report it prints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PlannerConfig;
use crate::error::Result;
use crate::frbc::{selection::reason_trail, FrbcDevicePlanner, FrbcDeviceState};
use crate::planning::{CongestionPointPlanner, DevicePlan, PlanningOutcome, RootPlanner};
use crate::profile::{EnergyRange, Profile, ProfileMetadata, TargetElement, TargetProfile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub metadata: ProfileMetadata,
    /// Defaults to the horizon start
    #[serde(default)]
    pub plan_due_by: Option<DateTime<Utc>>,
    pub target: Vec<TargetElement>,
    pub congestion_points: Vec<CongestionPointScenario>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CongestionPointScenario {
    pub id: String,
    /// Unconstrained when empty
    #[serde(default)]
    pub range: Vec<EnergyRange>,
    pub devices: Vec<FrbcDeviceState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanningReport {
    pub outcome: PlanningOutcome,
    pub congestion_points: Vec<CongestionPointReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CongestionPointReport {
    pub id: String,
    pub initial_rounds: usize,
    pub devices: Vec<DeviceReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    /// Selection reason code per timestep
    pub selection_trail: String,
    #[serde(flatten)]
    pub plan: DevicePlan,
}

impl Scenario {
    /// Build the planner tree and negotiate
    pub fn run(self, config: &PlannerConfig) -> Result<PlanningReport> {
        let metadata = self.metadata;
        let plan_due_by = self.plan_due_by.unwrap_or(metadata.start());
        let target: TargetProfile = Profile::new(metadata, self.target)?;

        let mut root = RootPlanner::new(target, config);
        for cp in self.congestion_points {
            let range = if cp.range.is_empty() {
                Profile::filled_default(metadata)
            } else {
                Profile::new(metadata, cp.range)?
            };
            let mut planner = CongestionPointPlanner::new(cp.id, range).with_max_iterations(config.max_iterations);
            for device in cp.devices {
                planner.add_device(Box::new(FrbcDevicePlanner::new(device, metadata, plan_due_by)));
            }
            root.add_congestion_point(planner);
        }

        info!(%metadata, congestion_points = root.congestion_points().len(), "planning scenario");
        let outcome = root.plan(plan_due_by, config.optimize_for_target, config.max_priority_class)?;

        let congestion_points = root
            .congestion_points()
            .iter()
            .map(|cp| CongestionPointReport {
                id: cp.id().to_string(),
                initial_rounds: cp.initial_rounds(),
                devices: cp
                    .device_plans()
                    .into_iter()
                    .map(|plan| DeviceReport {
                        selection_trail: reason_trail(&plan.selection_reasons),
                        plan,
                    })
                    .collect(),
            })
            .collect();
        Ok(PlanningReport {
            outcome,
            congestion_points,
        })
    }
}
