use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use super::model::{
    LeakageBehaviour, NumberRange, OperationMode, OperationModeElement, SystemDescription,
};

/// Ranges narrower than this are treated as fixed values
pub const RANGE_EPSILON: f64 = 1e-4;

/// Operation mode and factor chosen for one actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorConfiguration {
    pub operation_mode_id: String,
    pub factor: f64,
}

impl ActuatorConfiguration {
    pub fn new(operation_mode_id: impl Into<String>, factor: f64) -> Self {
        Self {
            operation_mode_id: operation_mode_id.into(),
            factor,
        }
    }
}

/// Configuration per actuator id, ordered by id
pub type ActuatorConfigurations = BTreeMap<String, ActuatorConfiguration>;

/// Memoization tables for one planning run.
///
/// Keyed by system description index, so they must not outlive the run: the
/// capability timeline may differ on the next call.
#[derive(Debug)]
pub struct CapabilityTables {
    stratification_layers: usize,
    combinations: HashMap<usize, Rc<[ActuatorConfigurations]>>,
}

impl CapabilityTables {
    pub fn new(stratification_layers: usize) -> Self {
        Self {
            stratification_layers: stratification_layers.max(1),
            combinations: HashMap::new(),
        }
    }

    /// Every combination of one configuration per actuator for a system description
    pub fn actuator_configurations(
        &mut self,
        sd_index: usize,
        system_description: &SystemDescription,
    ) -> Rc<[ActuatorConfigurations]> {
        let layers = self.stratification_layers;
        self.combinations
            .entry(sd_index)
            .or_insert_with(|| enumerate_combinations(system_description, layers).into())
            .clone()
    }
}

/// Configurations an actuator can take within one timestep
fn configurations_for_mode(mode: &OperationMode, layers: usize) -> Vec<ActuatorConfiguration> {
    if operation_mode_uses_factor(mode) {
        (0..=layers)
            .map(|i| ActuatorConfiguration::new(mode.id.clone(), i as f64 / layers as f64))
            .collect()
    } else {
        vec![ActuatorConfiguration::new(mode.id.clone(), 0.0)]
    }
}

fn enumerate_combinations(
    system_description: &SystemDescription,
    layers: usize,
) -> Vec<ActuatorConfigurations> {
    if system_description.actuators.is_empty() {
        return vec![ActuatorConfigurations::new()];
    }
    let per_actuator: Vec<Vec<(String, ActuatorConfiguration)>> = system_description
        .actuators
        .iter()
        .map(|actuator| {
            actuator
                .operation_modes
                .iter()
                .filter(|om| !om.abnormal_condition_only)
                .flat_map(|om| configurations_for_mode(om, layers))
                .map(|config| (actuator.id.clone(), config))
                .collect()
        })
        .collect();
    // An actuator without normal operation modes leaves nothing to choose
    if per_actuator.iter().any(Vec::is_empty) {
        return Vec::new();
    }
    per_actuator
        .into_iter()
        .multi_cartesian_product()
        .map(|combination| combination.into_iter().collect())
        .collect()
}

/// True when some element exposes a continuous fill-rate or power range
pub fn operation_mode_uses_factor(mode: &OperationMode) -> bool {
    mode.elements.iter().any(|element| {
        element.fill_rate.width().abs() > RANGE_EPSILON
            || element
                .power_ranges
                .iter()
                .any(|pr| pr.as_number_range().width().abs() > RANGE_EPSILON)
    })
}

/// Element valid at `fill_level`, falling back to the first or last element
pub fn find_operation_mode_element(
    mode: &OperationMode,
    fill_level: f64,
) -> Option<&OperationModeElement> {
    mode.elements
        .iter()
        .find(|e| e.fill_level_range.contains(fill_level))
        .or_else(|| {
            let first = mode.elements.first()?;
            if fill_level < first.fill_level_range.start_of_range {
                Some(first)
            } else {
                mode.elements.last()
            }
        })
}

/// Electric power in watts of a mode at a fill level and factor
pub fn operation_mode_power(mode: &OperationMode, fill_level: f64, factor: f64) -> f64 {
    find_operation_mode_element(mode, fill_level)
        .map(|element| {
            element
                .power_ranges
                .iter()
                .filter(|pr| pr.commodity_quantity.is_electric())
                .map(|pr| pr.as_number_range().interpolate(factor))
                .sum()
        })
        .unwrap_or(0.0)
}

/// Fill level change per second of a mode at a fill level and factor
pub fn operation_mode_fill_rate(mode: &OperationMode, fill_level: f64, factor: f64) -> f64 {
    find_operation_mode_element(mode, fill_level)
        .map(|element| element.fill_rate.interpolate(factor))
        .unwrap_or(0.0)
}

/// Leakage per second at a fill level; zero without leakage behaviour
pub fn leakage_rate(leakage: Option<&LeakageBehaviour>, fill_level: f64) -> f64 {
    let Some(leakage) = leakage else {
        return 0.0;
    };
    leakage
        .elements
        .iter()
        .find(|e| e.fill_level_range.contains(fill_level))
        .or_else(|| {
            let first = leakage.elements.first()?;
            if fill_level < first.fill_level_range.start_of_range {
                Some(first)
            } else {
                leakage.elements.last()
            }
        })
        .map(|e| e.leakage_rate)
        .unwrap_or(0.0)
}

/// Bucket index of a fill level inside the storage range, in `[0, nr_of_buckets]`
pub fn calculate_bucket(range: &NumberRange, nr_of_buckets: usize, fill_level: f64) -> usize {
    let width = range.width();
    if width <= 0.0 {
        return 0;
    }
    let relative = (fill_level - range.start_of_range) / width;
    let bucket = (relative * nr_of_buckets as f64).floor();
    bucket.clamp(0.0, nr_of_buckets as f64) as usize
}

/// Index of the item with the latest timestamp that is `<= before`
pub fn latest_before<T, F>(items: &[T], before: DateTime<Utc>, timestamp: F) -> Option<usize>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| timestamp(item) <= before)
        .max_by_key(|(index, item)| (timestamp(item), std::cmp::Reverse(*index)))
        .map(|(index, _)| index)
}
