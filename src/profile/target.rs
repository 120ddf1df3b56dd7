use serde::{Deserialize, Serialize};

use super::{EnergyProfile, Profile, ProfileElement, ProfileMetadata};
use crate::error::Result;

/// Joules per kilowatt-hour, used to apply per-kWh tariffs to joule values
pub const JOULES_PER_KWH: f64 = 3_600_000.0;

/// Target for one timestep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TargetElement {
    /// Desired energy in joules
    Energy(i64),
    /// Price per kWh; steers on cost rather than on an energy value
    Tariff(f64),
    /// No target for this timestep
    Null,
}

impl ProfileElement for TargetElement {
    fn default_value() -> Self {
        TargetElement::Null
    }
}

impl TargetElement {
    pub fn energy(&self) -> Option<i64> {
        match self {
            TargetElement::Energy(joules) => Some(*joules),
            _ => None,
        }
    }

    pub fn tariff(&self) -> Option<f64> {
        match self {
            TargetElement::Tariff(tariff) => Some(*tariff),
            _ => None,
        }
    }
}

pub type TargetProfile = Profile<TargetElement>;

impl TargetProfile {
    pub fn null_profile(metadata: ProfileMetadata) -> Self {
        Self::filled_default(metadata)
    }

    pub fn from_energy(energy: &EnergyProfile) -> Self {
        energy.map(|&joules| TargetElement::Energy(joules))
    }

    /// Add energy to the energy elements; tariff and null elements pass through
    pub fn add(&self, energy: &EnergyProfile) -> Result<Self> {
        self.zip_with(energy, |target, &e| match *target {
            TargetElement::Energy(joules) => TargetElement::Energy(joules + e),
            other => other,
        })
    }

    pub fn subtract(&self, energy: &EnergyProfile) -> Result<Self> {
        self.zip_with(energy, |target, &e| match *target {
            TargetElement::Energy(joules) => TargetElement::Energy(joules - e),
            other => other,
        })
    }

    /// Sum of squared energy elements
    pub fn sum_squared_distance(&self) -> f64 {
        self.elements()
            .iter()
            .filter_map(TargetElement::energy)
            .map(|joules| (joules as f64).powi(2))
            .sum()
    }

    pub fn total_energy(&self) -> i64 {
        self.elements().iter().filter_map(TargetElement::energy).sum()
    }

    /// Plain energy projection; null and tariff elements become 0
    pub fn to_energy_profile(&self) -> EnergyProfile {
        self.map(|e| e.energy().unwrap_or(0))
    }

    /// Cost of an energy profile under the tariff elements of this target
    pub fn cost_of(&self, energy: &EnergyProfile) -> Result<f64> {
        self.ensure_compatible(energy)?;
        Ok(self
            .elements()
            .iter()
            .zip(energy.elements())
            .filter_map(|(target, &e)| target.tariff().map(|t| e as f64 / JOULES_PER_KWH * t))
            .sum())
    }
}
