//! Bucketed forward search over the reachable states of one FRBC device.
//!
//! Timesteps are built once per horizon and reused across negotiation
//! rounds; every `find_best_plan` call clears the buckets, installs the new
//! targets and sweeps the horizon from the first slot with a system
//! description to the last.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::debug;

use super::capabilities::{
    latest_before, ActuatorConfiguration, ActuatorConfigurations, CapabilityTables,
};
use super::model::{FillLevelTargetProfile, FrbcDeviceState, UsageForecast};
use super::plan::FrbcPlan;
use super::state::{FrbcState, StateArena, StateId, StepContext};
use super::timestep::{FillLevelBounds, FrbcTimestep};
use crate::error::{PlanningError, Result};
use crate::profile::{BoundProfile, EnergyProfile, Profile, ProfileMetadata, TargetProfile};

#[derive(Debug)]
pub struct OperationModeProfileTree {
    device: Arc<FrbcDeviceState>,
    metadata: ProfileMetadata,
    plan_due_by: DateTime<Utc>,
    timesteps: Vec<FrbcTimestep>,
    arena: StateArena,
}

impl OperationModeProfileTree {
    pub fn new(
        device: Arc<FrbcDeviceState>,
        metadata: ProfileMetadata,
        plan_due_by: DateTime<Utc>,
    ) -> Self {
        let timesteps = generate_timesteps(&device, &metadata, plan_due_by);
        Self {
            device,
            metadata,
            plan_due_by,
            timesteps,
            arena: StateArena::new(),
        }
    }

    pub fn plan_due_by(&self) -> DateTime<Utc> {
        self.plan_due_by
    }

    pub fn timesteps(&self) -> &[FrbcTimestep] {
        &self.timesteps
    }

    /// States created by the last search
    pub fn states_created(&self) -> usize {
        self.arena.len()
    }

    /// Best reachable trajectory against a target and congestion bounds (absolute, in joules)
    pub fn find_best_plan(
        &mut self,
        target: &TargetProfile,
        min_constraint: &BoundProfile,
        max_constraint: &BoundProfile,
    ) -> Result<FrbcPlan> {
        let horizon = EnergyProfile::zeros(self.metadata);
        horizon.ensure_compatible(target)?;
        horizon.ensure_compatible(min_constraint)?;
        horizon.ensure_compatible(max_constraint)?;

        self.arena.clear();
        for (i, ts) in self.timesteps.iter_mut().enumerate() {
            ts.clear();
            ts.set_targets(
                target.elements()[i],
                min_constraint.elements()[i],
                max_constraint.elements()[i],
            );
        }

        let first = self
            .timesteps
            .iter()
            .position(|ts| ts.system_description.is_some())
            .ok_or_else(|| infeasible(&self.device, "no system description covers the horizon"))?;

        let device = Arc::clone(&self.device);
        let mut search = Search {
            device: &device,
            nr_of_buckets: device.computational_parameters.nr_of_buckets,
            tables: CapabilityTables::new(device.computational_parameters.stratification_layers),
            arena: &mut self.arena,
            timesteps: &mut self.timesteps,
        };

        let zero = search.zero_state(first)?;
        search.expand(zero, first);
        for i in first..search.timesteps.len().saturating_sub(1) {
            let states = search.timesteps[i].final_states_within_fill_level_target(search.arena);
            if states.is_empty() {
                return Err(infeasible(&device, &format!("no reachable state at timestep {i}")));
            }
            for state in states {
                search.expand(state, i + 1);
            }
        }

        let last = self.timesteps.len() - 1;
        let end_states = self.timesteps[last].final_states_within_fill_level_target(&self.arena);
        let end_state = self
            .find_best_end_state(&end_states)
            .ok_or_else(|| infeasible(&device, "no final state candidates"))?;

        debug!(
            device = %self.device.device_id,
            states = self.arena.len(),
            first_timestep = first,
            "frbc search finished"
        );
        self.convert_to_plan(end_state)
    }

    fn find_best_end_state(&self, states: &[StateId]) -> Option<StateId> {
        let (&first, rest) = states.split_first()?;
        Some(rest.iter().fold(first, |best, &candidate| {
            if self.arena[candidate].is_preferable_than(&self.arena[best]).result {
                candidate
            } else {
                best
            }
        }))
    }

    fn convert_to_plan(&self, end_state: StateId) -> Result<FrbcPlan> {
        let n = self.metadata.n_steps();
        let mut energy = vec![0_i64; n];
        let mut fill_level = vec![None; n];
        let mut configurations = vec![ActuatorConfigurations::new(); n];
        let mut reasons = vec![None; n];

        // The root state carries the observed status and is not part of the plan
        for (_, state) in self.arena.ancestry(end_state).filter(|(_, s)| s.previous.is_some()) {
            let i = state.timestep;
            energy[i] = state.timestep_energy as i64;
            fill_level[i] = Some(state.fill_level);
            configurations[i] = state.actuator_configurations.clone();
            reasons[i] = state.selection_reason;
        }
        if let Some(first) = energy.first_mut() {
            *first += self.device.energy_in_current_timestep.round() as i64;
        }

        Ok(FrbcPlan {
            idle: false,
            energy: Profile::new(self.metadata, energy)?,
            fill_level: Some(Profile::new(self.metadata, fill_level)?),
            actuator_configurations: configurations,
            selection_reasons: reasons,
        })
    }
}

fn infeasible(device: &FrbcDeviceState, reason: &str) -> PlanningError {
    PlanningError::NoFeasiblePlan {
        device: device.device_id.clone(),
        reason: reason.to_string(),
    }
}

/// Borrowed view of one search run
struct Search<'a> {
    device: &'a FrbcDeviceState,
    nr_of_buckets: usize,
    tables: CapabilityTables,
    arena: &'a mut StateArena,
    timesteps: &'a mut [FrbcTimestep],
}

impl Search<'_> {
    fn zero_state(&mut self, first: usize) -> Result<StateId> {
        let device = self.device;
        let sd_index = self.timesteps[first]
            .system_description
            .ok_or_else(|| infeasible(device, "first timestep has no system description"))?;
        let sd = &device.system_descriptions[sd_index];
        let fill_level = device
            .storage_status
            .map(|s| s.present_fill_level)
            .ok_or_else(|| infeasible(device, "no storage status"))?;

        let mut configurations = ActuatorConfigurations::new();
        for status in &device.actuator_statuses {
            if sd.actuator(&status.actuator_id).is_none() {
                return Err(PlanningError::UnknownActuator(status.actuator_id.clone()));
            }
            configurations.insert(
                status.actuator_id.clone(),
                ActuatorConfiguration::new(
                    status.active_operation_mode_id.clone(),
                    status.operation_mode_factor,
                ),
            );
        }

        Ok(self.arena.push(FrbcState::initial(
            first,
            sd_index,
            &sd.storage.fill_level_range,
            self.nr_of_buckets,
            fill_level,
            configurations,
        )))
    }

    /// Offer every successor of `previous` to timestep `target`
    fn expand(&mut self, previous: StateId, target: usize) {
        let device = self.device;
        let Some(sd_index) = self.timesteps[target].system_description else {
            return;
        };
        let sd = &device.system_descriptions[sd_index];
        let combinations = self.tables.actuator_configurations(sd_index, sd);
        let leakage = self.timesteps[target]
            .leakage_behaviour
            .map(|i| &device.leakage_behaviours[i]);

        for configurations in combinations.iter() {
            let step = StepContext {
                index: target,
                timestep: &self.timesteps[target],
                sd_index,
                system_description: sd,
                leakage,
                nr_of_buckets: self.nr_of_buckets,
            };
            let Some(state) =
                FrbcState::successor(&self.arena[previous], previous, step, configurations)
            else {
                continue;
            };
            let id = self.arena.push(state);
            self.timesteps[target].add_state(self.arena, id, &sd.storage.fill_level_range);
        }
    }
}

fn generate_timesteps(
    device: &FrbcDeviceState,
    metadata: &ProfileMetadata,
    plan_due_by: DateTime<Utc>,
) -> Vec<FrbcTimestep> {
    let nr_of_buckets = device.computational_parameters.nr_of_buckets;
    (0..metadata.n_steps())
        .map(|i| {
            let nominal_start = metadata.start_of_step(i);
            let end = nominal_start + metadata.step();
            let start = if i == 0 {
                plan_due_by.clamp(nominal_start, end)
            } else {
                nominal_start
            };

            let system_description =
                latest_before(&device.system_descriptions, start, |sd| sd.valid_from);
            let leakage_behaviour =
                latest_before(&device.leakage_behaviours, start, |lb| lb.valid_from);
            let fill_level_target =
                latest_before(&device.fill_level_target_profiles, start, |p| p.start_time)
                    .and_then(|p| {
                        fill_level_target_for(&device.fill_level_target_profiles[p], start, end)
                    });
            let forecasted_usage = latest_before(&device.usage_forecasts, start, |u| u.start_time)
                .map_or(0.0, |u| usage_for(&device.usage_forecasts[u], start, end));

            FrbcTimestep::new(
                start,
                end,
                system_description,
                leakage_behaviour,
                fill_level_target,
                forecasted_usage,
                nr_of_buckets,
            )
        })
        .collect()
}

/// Consecutive `[start, end)` windows of elements with the given durations
fn element_windows<'a>(
    start_time: DateTime<Utc>,
    durations: impl Iterator<Item = i64> + 'a,
) -> impl Iterator<Item = (DateTime<Utc>, DateTime<Utc>)> + 'a {
    durations.scan(start_time, |cursor, duration_s| {
        let window = (*cursor, *cursor + TimeDelta::seconds(duration_s));
        *cursor = window.1;
        Some(window)
    })
}

fn overlap_seconds(
    (a_start, a_end): (DateTime<Utc>, DateTime<Utc>),
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> f64 {
    let from = a_start.max(start);
    let to = a_end.min(end);
    if to > from {
        (to - from).num_milliseconds() as f64 / 1000.0
    } else {
        0.0
    }
}

/// Intersection of every target element overlapping `[start, end)`
fn fill_level_target_for(
    profile: &FillLevelTargetProfile,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<FillLevelBounds> {
    let mut lower: Option<f64> = None;
    let mut upper: Option<f64> = None;
    let windows = element_windows(profile.start_time, profile.elements.iter().map(|e| e.duration_s));
    for (element, window) in profile.elements.iter().zip(windows) {
        if overlap_seconds(window, start, end) <= 0.0 {
            continue;
        }
        if let Some(l) = element.lower_limit {
            lower = Some(lower.map_or(l, |current| current.max(l)));
        }
        if let Some(u) = element.upper_limit {
            upper = Some(upper.map_or(u, |current| current.min(u)));
        }
    }
    if lower.is_none() && upper.is_none() {
        None
    } else {
        Some(FillLevelBounds { lower, upper })
    }
}

/// Fill level change by usage within `[start, end)`
fn usage_for(forecast: &UsageForecast, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let windows = element_windows(forecast.start_time, forecast.elements.iter().map(|e| e.duration_s));
    forecast
        .elements
        .iter()
        .zip(windows)
        .map(|(element, window)| element.usage_rate * overlap_seconds(window, start, end))
        .sum()
}
