use serde::{Deserialize, Serialize};

use super::capabilities::ActuatorConfigurations;
use super::selection::SelectionReason;
use crate::profile::{EnergyProfile, FillLevelProfile, Profile, ProfileElement, ProfileMetadata};

/// What a device should do during one timestep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionElement {
    pub idle: bool,
    pub actuator_configurations: ActuatorConfigurations,
}

impl ProfileElement for InstructionElement {
    fn default_value() -> Self {
        Self {
            idle: true,
            actuator_configurations: ActuatorConfigurations::new(),
        }
    }
}

pub type InstructionProfile = Profile<InstructionElement>;

/// Result of one search over the horizon
#[derive(Debug, Clone, PartialEq)]
pub struct FrbcPlan {
    pub idle: bool,
    pub energy: EnergyProfile,
    pub fill_level: Option<FillLevelProfile>,
    /// Planned configuration per timestep; empty where nothing was planned
    pub actuator_configurations: Vec<ActuatorConfigurations>,
    pub selection_reasons: Vec<Option<SelectionReason>>,
}

impl FrbcPlan {
    /// Zero-energy plan of a device that cannot be steered
    pub fn idle(metadata: ProfileMetadata) -> Self {
        let n = metadata.n_steps();
        Self {
            idle: true,
            energy: EnergyProfile::zeros(metadata),
            fill_level: None,
            actuator_configurations: vec![ActuatorConfigurations::new(); n],
            selection_reasons: vec![None; n],
        }
    }

    pub fn instructions(&self) -> InstructionProfile {
        let metadata = *self.energy.metadata();
        let elements = self
            .actuator_configurations
            .iter()
            .map(|configs| InstructionElement {
                idle: configs.is_empty(),
                actuator_configurations: configs.clone(),
            })
            .collect::<Vec<_>>();
        Profile::new(metadata, elements).unwrap_or_else(|_| InstructionProfile::filled_default(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frbc::capabilities::ActuatorConfiguration;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn meta() -> ProfileMetadata {
        ProfileMetadata::new(Utc.timestamp_opt(0, 0).unwrap(), TimeDelta::seconds(300), 3).unwrap()
    }

    #[test]
    fn test_idle_plan_has_idle_instructions() {
        let plan = FrbcPlan::idle(meta());
        assert!(plan.idle);
        assert_eq!(plan.energy.total_energy(), 0);
        assert!(plan.instructions().elements().iter().all(|e| e.idle));
    }

    #[test]
    fn test_instructions_follow_configurations() {
        let mut plan = FrbcPlan::idle(meta());
        plan.idle = false;
        plan.actuator_configurations[1]
            .insert("heater".to_string(), ActuatorConfiguration::new("on", 0.0));
        let instructions = plan.instructions();
        assert!(instructions.elements()[0].idle);
        assert!(!instructions.elements()[1].idle);
        assert_eq!(
            instructions.elements()[1].actuator_configurations["heater"].operation_mode_id,
            "on"
        );
    }
}
