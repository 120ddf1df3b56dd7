//! Search nodes of the FRBC planner and the arena that owns them.
//!
//! States reference their predecessor by [`StateId`]; many successors may
//! share one predecessor. The arena is cleared at the start of every search,
//! which drops a whole run's states at once.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};

use super::capabilities::{
    calculate_bucket, leakage_rate, operation_mode_fill_rate, operation_mode_power,
    ActuatorConfigurations,
};
use super::model::{LeakageBehaviour, NumberRange, SystemDescription};
use super::selection::{SelectionReason, SelectionResult};
use super::timestep::FrbcTimestep;
use crate::profile::{TargetElement, JOULES_PER_KWH};

/// Tolerance on squared constraint violation and squared target distance
pub const CONSTRAINT_EPSILON: f64 = 1e-4;
/// Tolerance on accumulated cost
pub const TARIFF_EPSILON: f64 = 0.5;

/// Timer expiry per (actuator id, timer id). Absent timers are expired.
pub type TimerTable = BTreeMap<(String, String), DateTime<Utc>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct FrbcState {
    pub timestep: usize,
    pub system_description: usize,
    pub fill_level: f64,
    pub bucket: usize,
    /// Energy used during the timestep, in joules
    pub timestep_energy: f64,
    pub sum_squared_distance: f64,
    pub sum_squared_constraint_violation: f64,
    pub sum_energy_cost: f64,
    pub sum_squared_energy: f64,
    pub actuator_configurations: ActuatorConfigurations,
    pub timer_expiry: TimerTable,
    pub previous: Option<StateId>,
    pub selection_reason: Option<SelectionReason>,
}

/// Everything a successor needs to know about the timestep it lands in
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub index: usize,
    pub timestep: &'a FrbcTimestep,
    pub sd_index: usize,
    pub system_description: &'a SystemDescription,
    pub leakage: Option<&'a LeakageBehaviour>,
    pub nr_of_buckets: usize,
}

impl FrbcState {
    /// Root of a search: observed fill level and actuator configuration, no scores
    pub fn initial(
        timestep: usize,
        sd_index: usize,
        storage_range: &NumberRange,
        nr_of_buckets: usize,
        fill_level: f64,
        actuator_configurations: ActuatorConfigurations,
    ) -> Self {
        Self {
            timestep,
            system_description: sd_index,
            fill_level,
            bucket: calculate_bucket(storage_range, nr_of_buckets, fill_level),
            timestep_energy: 0.0,
            sum_squared_distance: 0.0,
            sum_squared_constraint_violation: 0.0,
            sum_energy_cost: 0.0,
            sum_squared_energy: 0.0,
            actuator_configurations,
            timer_expiry: TimerTable::new(),
            previous: None,
            selection_reason: None,
        }
    }

    /// State reached by applying `configurations` during `step`.
    ///
    /// Returns `None` when a mode change has no transition or a blocking
    /// timer of that transition is still running.
    pub fn successor(
        previous: &FrbcState,
        previous_id: StateId,
        step: StepContext<'_>,
        configurations: &ActuatorConfigurations,
    ) -> Option<FrbcState> {
        let same_description = previous.system_description == step.sd_index;
        let timestep = step.timestep;
        let sd = step.system_description;

        // Mode changes per actuator, as (actuator id, transition start timers)
        let mut started = Vec::new();
        if same_description {
            for (actuator_id, config) in configurations {
                let Some(prev_config) = previous.actuator_configurations.get(actuator_id) else {
                    continue;
                };
                if prev_config.operation_mode_id == config.operation_mode_id {
                    continue;
                }
                let actuator = sd.actuator(actuator_id)?;
                let transition =
                    actuator.transition(&prev_config.operation_mode_id, &config.operation_mode_id)?;
                let blocked = transition.blocking_timers.iter().any(|timer_id| {
                    previous
                        .timer_expiry
                        .get(&(actuator_id.clone(), timer_id.clone()))
                        .is_some_and(|expiry| timestep.start < *expiry)
                });
                if blocked {
                    return None;
                }
                started.push((actuator, &transition.start_timers));
            }
        }

        let seconds = timestep.duration_seconds();
        let mut timestep_energy = 0.0;
        let mut fill_level = previous.fill_level;
        for (actuator_id, config) in configurations {
            let mode = sd.actuator(actuator_id)?.operation_mode(&config.operation_mode_id)?;
            timestep_energy +=
                operation_mode_power(mode, previous.fill_level, config.factor) * seconds;
            fill_level += operation_mode_fill_rate(mode, previous.fill_level, config.factor) * seconds;
        }
        fill_level -= leakage_rate(step.leakage, fill_level) * seconds;
        fill_level += timestep.forecasted_usage;

        let timer_expiry = if same_description {
            let mut timers = previous.timer_expiry.clone();
            for (actuator, start_timers) in started {
                for timer_id in start_timers {
                    if let Some(timer) = actuator.timer(timer_id) {
                        timers.insert(
                            (actuator.id.clone(), timer_id.clone()),
                            timestep.start + timer.duration(),
                        );
                    }
                }
            }
            timers
        } else {
            TimerTable::new()
        };

        let mut state = FrbcState {
            timestep: step.index,
            system_description: step.sd_index,
            fill_level,
            bucket: calculate_bucket(&sd.storage.fill_level_range, step.nr_of_buckets, fill_level),
            timestep_energy,
            sum_squared_distance: previous.sum_squared_distance,
            sum_squared_constraint_violation: previous.sum_squared_constraint_violation,
            sum_energy_cost: previous.sum_energy_cost,
            sum_squared_energy: previous.sum_squared_energy + timestep_energy.powi(2),
            actuator_configurations: configurations.clone(),
            timer_expiry,
            previous: Some(previous_id),
            selection_reason: None,
        };
        state.accumulate_target_scores(timestep);
        Some(state)
    }

    fn accumulate_target_scores(&mut self, timestep: &FrbcTimestep) {
        match timestep.target {
            TargetElement::Energy(joules) => {
                self.sum_squared_distance += (joules as f64 - self.timestep_energy).powi(2);
            }
            TargetElement::Tariff(tariff) => {
                self.sum_energy_cost += self.timestep_energy / JOULES_PER_KWH * tariff;
            }
            TargetElement::Null => {}
        }
        if let Some(max) = timestep.max_constraint {
            let max = max as f64;
            if self.timestep_energy > max {
                self.sum_squared_constraint_violation += (self.timestep_energy - max).powi(2);
            }
        }
        if let Some(min) = timestep.min_constraint {
            let min = min as f64;
            if self.timestep_energy < min {
                self.sum_squared_constraint_violation += (min - self.timestep_energy).powi(2);
            }
        }
    }

    /// Total preference order: constraint violation, target distance, cost, squared energy
    pub fn is_preferable_than(&self, other: &FrbcState) -> SelectionResult {
        if (self.sum_squared_constraint_violation - other.sum_squared_constraint_violation).abs()
            >= CONSTRAINT_EPSILON
        {
            SelectionResult::new(
                self.sum_squared_constraint_violation < other.sum_squared_constraint_violation,
                SelectionReason::CongestionConstraint,
            )
        } else if (self.sum_squared_distance - other.sum_squared_distance).abs() >= CONSTRAINT_EPSILON {
            SelectionResult::new(
                self.sum_squared_distance < other.sum_squared_distance,
                SelectionReason::EnergyTarget,
            )
        } else if (self.sum_energy_cost - other.sum_energy_cost).abs() >= TARIFF_EPSILON {
            SelectionResult::new(
                self.sum_energy_cost < other.sum_energy_cost,
                SelectionReason::TariffTarget,
            )
        } else {
            SelectionResult::new(
                self.sum_squared_energy < other.sum_squared_energy,
                SelectionReason::MinEnergy,
            )
        }
    }

    pub fn is_within_fill_level_range(&self, range: &NumberRange) -> bool {
        range.contains(self.fill_level)
    }

    /// Distance past the nearest edge of the storage range
    pub fn fill_level_distance(&self, range: &NumberRange) -> f64 {
        if self.fill_level < range.start_of_range {
            range.start_of_range - self.fill_level
        } else {
            self.fill_level - range.end_of_range
        }
    }
}

/// Append-only storage for one search run
#[derive(Debug, Default)]
pub struct StateArena {
    states: Vec<FrbcState>,
}

impl StateArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn push(&mut self, state: FrbcState) -> StateId {
        self.states.push(state);
        StateId(self.states.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Walk back from `id` through predecessors, `id` first
    pub fn ancestry(&self, id: StateId) -> impl Iterator<Item = (StateId, &FrbcState)> + '_ {
        std::iter::successors(Some(id), move |current| self[*current].previous)
            .map(move |id| (id, &self[id]))
    }
}

impl Index<StateId> for StateArena {
    type Output = FrbcState;

    fn index(&self, id: StateId) -> &FrbcState {
        &self.states[id.0]
    }
}

impl IndexMut<StateId> for StateArena {
    fn index_mut(&mut self, id: StateId) -> &mut FrbcState {
        &mut self.states[id.0]
    }
}
