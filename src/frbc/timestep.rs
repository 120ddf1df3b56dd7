use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;

use super::model::NumberRange;
use super::selection::SelectionReason;
use super::state::{StateArena, StateId};
use crate::profile::TargetElement;

/// Fill-level window a timestep should end in; either bound may be open
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillLevelBounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl FillLevelBounds {
    pub fn contains(&self, fill_level: f64) -> bool {
        self.lower.map_or(true, |l| fill_level >= l) && self.upper.map_or(true, |u| fill_level <= u)
    }

    pub fn distance(&self, fill_level: f64) -> f64 {
        match (self.lower, self.upper) {
            (Some(l), _) if fill_level < l => l - fill_level,
            (_, Some(u)) if fill_level > u => fill_level - u,
            _ => 0.0,
        }
    }
}

/// One slot of the planning horizon with its search results
#[derive(Debug, Clone)]
pub struct FrbcTimestep {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Index into the device's system descriptions
    pub system_description: Option<usize>,
    /// Index into the device's leakage behaviours
    pub leakage_behaviour: Option<usize>,
    pub fill_level_target: Option<FillLevelBounds>,
    /// Fill level change caused by usage during the slot
    pub forecasted_usage: f64,
    pub target: TargetElement,
    pub min_constraint: Option<i64>,
    pub max_constraint: Option<i64>,
    buckets: Vec<Option<StateId>>,
    emergency_state: Option<StateId>,
}

impl FrbcTimestep {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        system_description: Option<usize>,
        leakage_behaviour: Option<usize>,
        fill_level_target: Option<FillLevelBounds>,
        forecasted_usage: f64,
        nr_of_buckets: usize,
    ) -> Self {
        Self {
            start,
            end,
            system_description,
            leakage_behaviour,
            fill_level_target,
            forecasted_usage,
            target: TargetElement::Null,
            min_constraint: None,
            max_constraint: None,
            buckets: vec![None; nr_of_buckets + 1],
            emergency_state: None,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }

    pub fn set_targets(
        &mut self,
        target: TargetElement,
        min_constraint: Option<i64>,
        max_constraint: Option<i64>,
    ) {
        self.target = target;
        self.min_constraint = min_constraint;
        self.max_constraint = max_constraint;
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|slot| *slot = None);
        self.emergency_state = None;
    }

    /// Offer a state to this timestep.
    ///
    /// Inside the storage range it competes for its bucket; outside it
    /// competes for the emergency slot on distance to the range.
    pub fn add_state(&mut self, arena: &mut StateArena, id: StateId, storage_range: &NumberRange) {
        let state = &arena[id];
        if state.is_within_fill_level_range(storage_range) {
            let bucket = state.bucket.min(self.buckets.len() - 1);
            match self.buckets[bucket] {
                None => {
                    self.buckets[bucket] = Some(id);
                    arena[id].selection_reason = Some(SelectionReason::NoAlternative);
                }
                Some(stored) => {
                    let selection = arena[id].is_preferable_than(&arena[stored]);
                    let kept = if selection.result { id } else { stored };
                    self.buckets[bucket] = Some(kept);
                    arena[kept].selection_reason = Some(selection.reason);
                }
            }
        } else {
            let replace = match self.emergency_state {
                None => true,
                Some(stored) => {
                    state.fill_level_distance(storage_range)
                        < arena[stored].fill_level_distance(storage_range)
                }
            };
            if replace {
                self.emergency_state = Some(id);
                arena[id].selection_reason = Some(SelectionReason::EmergencyState);
            }
        }
    }

    /// Occupied buckets in bucket order, or the emergency state if none
    pub fn final_states(&self) -> Vec<StateId> {
        let states: Vec<StateId> = self.buckets.iter().flatten().copied().collect();
        if states.is_empty() {
            self.emergency_state.into_iter().collect()
        } else {
            states
        }
    }

    /// Final states inside the fill-level target, or the single closest one
    pub fn final_states_within_fill_level_target(&self, arena: &StateArena) -> Vec<StateId> {
        let states = self.final_states();
        let Some(target) = self.fill_level_target else {
            return states;
        };
        let within: Vec<StateId> = states
            .iter()
            .copied()
            .filter(|id| target.contains(arena[*id].fill_level))
            .collect();
        if !within.is_empty() {
            return within;
        }
        states
            .into_iter()
            .min_by_key(|id| OrderedFloat(target.distance(arena[*id].fill_level)))
            .into_iter()
            .collect()
    }
}
