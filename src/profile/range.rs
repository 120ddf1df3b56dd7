use serde::{Deserialize, Serialize};

use super::{BoundProfile, EnergyProfile, Profile, ProfileElement};
use crate::error::Result;

/// Allowed energy window for one timestep at a congestion point, in joules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyRange {
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

impl ProfileElement for EnergyRange {
    fn default_value() -> Self {
        Self::default()
    }
}

impl EnergyRange {
    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, joules: i64) -> bool {
        self.min.map_or(true, |min| joules >= min) && self.max.map_or(true, |max| joules <= max)
    }
}

/// Congestion range over the planning horizon
pub type EnergyRangeProfile = Profile<EnergyRange>;

impl EnergyRangeProfile {
    pub fn is_within_range(&self, energy: &EnergyProfile) -> Result<bool> {
        self.ensure_compatible(energy)?;
        Ok(self
            .elements()
            .iter()
            .zip(energy.elements())
            .all(|(range, &e)| range.contains(e)))
    }

    /// `max - current` per timestep; negative where `current` exceeds the maximum
    pub fn difference_with_max_value(&self, current: &EnergyProfile) -> Result<BoundProfile> {
        self.zip_with(current, |range, &e| range.max.map(|max| max - e))
    }

    /// `min - current` per timestep; positive where `current` falls short of the minimum
    pub fn difference_with_min_value(&self, current: &EnergyProfile) -> Result<BoundProfile> {
        self.zip_with(current, |range, &e| range.min.map(|min| min - e))
    }
}
