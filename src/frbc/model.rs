//! Device capability descriptions consumed by the FRBC planner.
//!
//! These mirror the already-deserialized fill-level/rate-based control
//! messages a resource manager sends: system descriptions with actuators,
//! operation modes, transitions and timers, plus leakage behaviour, usage
//! forecasts and fill-level target profiles.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumberRange {
    pub start_of_range: f64,
    pub end_of_range: f64,
}

impl NumberRange {
    pub fn new(start_of_range: f64, end_of_range: f64) -> Self {
        Self { start_of_range, end_of_range }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.start_of_range <= value && value <= self.end_of_range
    }

    pub fn width(&self) -> f64 {
        self.end_of_range - self.start_of_range
    }

    /// `start + (end - start) * factor`
    pub fn interpolate(&self, factor: f64) -> f64 {
        self.width() * factor + self.start_of_range
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommodityQuantity {
    ElectricPowerL1,
    ElectricPowerL2,
    ElectricPowerL3,
    #[serde(rename = "ELECTRIC_POWER_3_PHASE_SYMMETRIC")]
    ElectricPower3PhaseSymmetric,
    NaturalGasFlowRate,
    HydrogenFlowRate,
    HeatTemperature,
    HeatFlowRate,
    HeatThermalPower,
    OilFlowRate,
}

impl CommodityQuantity {
    pub fn is_electric(&self) -> bool {
        matches!(
            self,
            CommodityQuantity::ElectricPowerL1
                | CommodityQuantity::ElectricPowerL2
                | CommodityQuantity::ElectricPowerL3
                | CommodityQuantity::ElectricPower3PhaseSymmetric
        )
    }
}

/// Power range in watts for one commodity quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerRange {
    pub start_of_range: f64,
    pub end_of_range: f64,
    pub commodity_quantity: CommodityQuantity,
}

impl PowerRange {
    pub fn as_number_range(&self) -> NumberRange {
        NumberRange::new(self.start_of_range, self.end_of_range)
    }
}

/// Behaviour of an operation mode on one fill-level sub-range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationModeElement {
    pub fill_level_range: NumberRange,
    /// Fill level change per second
    pub fill_rate: NumberRange,
    pub power_ranges: Vec<PowerRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMode {
    pub id: String,
    #[serde(default)]
    pub diagnostic_label: Option<String>,
    pub elements: Vec<OperationModeElement>,
    #[serde(default)]
    pub abnormal_condition_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub start_timers: Vec<String>,
    #[serde(default)]
    pub blocking_timers: Vec<String>,
    #[serde(default)]
    pub abnormal_condition_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub id: String,
    #[serde(default)]
    pub diagnostic_label: Option<String>,
    pub duration_ms: i64,
}

impl Timer {
    pub fn duration(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorDescription {
    pub id: String,
    #[serde(default)]
    pub diagnostic_label: Option<String>,
    pub operation_modes: Vec<OperationMode>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub timers: Vec<Timer>,
}

impl ActuatorDescription {
    pub fn operation_mode(&self, id: &str) -> Option<&OperationMode> {
        self.operation_modes.iter().find(|om| om.id == id)
    }

    pub fn transition(&self, from: &str, to: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.from == from && t.to == to)
    }

    pub fn timer(&self, id: &str) -> Option<&Timer> {
        self.timers.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageDescription {
    #[serde(default)]
    pub diagnostic_label: Option<String>,
    #[serde(default)]
    pub fill_level_label: Option<String>,
    pub fill_level_range: NumberRange,
}

/// Capabilities valid from `valid_from` until superseded by a later description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDescription {
    pub valid_from: DateTime<Utc>,
    pub actuators: Vec<ActuatorDescription>,
    pub storage: StorageDescription,
}

impl SystemDescription {
    pub fn actuator(&self, id: &str) -> Option<&ActuatorDescription> {
        self.actuators.iter().find(|a| a.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakageBehaviourElement {
    pub fill_level_range: NumberRange,
    /// Fill level lost per second
    pub leakage_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakageBehaviour {
    pub valid_from: DateTime<Utc>,
    pub elements: Vec<LeakageBehaviourElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageForecastElement {
    pub duration_s: i64,
    /// Fill level change per second caused by usage
    pub usage_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageForecast {
    pub start_time: DateTime<Utc>,
    pub elements: Vec<UsageForecastElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillLevelTargetElement {
    pub duration_s: i64,
    #[serde(default)]
    pub lower_limit: Option<f64>,
    #[serde(default)]
    pub upper_limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillLevelTargetProfile {
    pub start_time: DateTime<Utc>,
    pub elements: Vec<FillLevelTargetElement>,
}

/// Currently active operation mode of an actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorStatus {
    pub actuator_id: String,
    pub active_operation_mode_id: String,
    #[serde(default)]
    pub operation_mode_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageStatus {
    pub present_fill_level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationalParameters {
    pub nr_of_buckets: usize,
    pub stratification_layers: usize,
}

impl Default for ComputationalParameters {
    fn default() -> Self {
        Self {
            nr_of_buckets: 100,
            stratification_layers: 10,
        }
    }
}

/// Everything the planner knows about one FRBC device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcDeviceState {
    pub device_id: String,
    pub device_name: String,
    pub connection_id: String,
    #[serde(default = "default_priority_class")]
    pub priority_class: i32,
    pub timestamp: DateTime<Utc>,
    /// Energy already committed in the running timestep, in joules
    #[serde(default)]
    pub energy_in_current_timestep: f64,
    pub is_online: bool,
    pub system_descriptions: Vec<SystemDescription>,
    #[serde(default)]
    pub leakage_behaviours: Vec<LeakageBehaviour>,
    #[serde(default)]
    pub usage_forecasts: Vec<UsageForecast>,
    #[serde(default)]
    pub fill_level_target_profiles: Vec<FillLevelTargetProfile>,
    #[serde(default)]
    pub actuator_statuses: Vec<ActuatorStatus>,
    #[serde(default)]
    pub storage_status: Option<StorageStatus>,
    #[serde(default)]
    pub computational_parameters: ComputationalParameters,
}

fn default_priority_class() -> i32 {
    1
}
