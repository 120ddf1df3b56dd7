use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use super::ProfileMetadata;
use crate::error::{PlanningError, Result};

/// Element type of a profile, with the value used when a profile is padded
pub trait ProfileElement: Clone + Debug + PartialEq {
    fn default_value() -> Self;
}

impl ProfileElement for i64 {
    fn default_value() -> Self {
        0
    }
}

impl ProfileElement for Option<i64> {
    fn default_value() -> Self {
        None
    }
}

impl ProfileElement for Option<f64> {
    fn default_value() -> Self {
        None
    }
}

/// Equally spaced time series over a [`ProfileMetadata`] horizon.
///
/// Profiles are values: every transformation returns a new profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile<T> {
    metadata: ProfileMetadata,
    elements: Vec<T>,
}

/// Energy per timestep in joules
pub type EnergyProfile = Profile<i64>;

/// Fill level at the end of each timestep; `None` for unreached steps
pub type FillLevelProfile = Profile<Option<f64>>;

/// Per-timestep energy bound in joules; `None` means unconstrained
pub type BoundProfile = Profile<Option<i64>>;

impl<T: ProfileElement> Profile<T> {
    pub fn new(metadata: ProfileMetadata, elements: Vec<T>) -> Result<Self> {
        if elements.len() != metadata.n_steps() {
            return Err(PlanningError::ElementCountMismatch {
                expected: metadata.n_steps(),
                actual: elements.len(),
            });
        }
        Ok(Self { metadata, elements })
    }

    /// Profile with every element set to the type's default value
    pub fn filled_default(metadata: ProfileMetadata) -> Self {
        Self {
            metadata,
            elements: vec![T::default_value(); metadata.n_steps()],
        }
    }

    pub fn metadata(&self) -> &ProfileMetadata {
        &self.metadata
    }

    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<T> {
        self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Same step size and same number of elements; start offsets may differ
    pub fn is_compatible<U>(&self, other: &Profile<U>) -> bool {
        self.metadata.step() == other.metadata.step() && self.elements.len() == other.elements.len()
    }

    pub fn ensure_compatible<U>(&self, other: &Profile<U>) -> Result<()> {
        if self.is_compatible(other) {
            Ok(())
        } else {
            Err(PlanningError::IncompatibleProfile {
                expected: self.metadata.to_string(),
                actual: other.metadata.to_string(),
            })
        }
    }

    pub fn index_at(&self, instant: DateTime<Utc>) -> i64 {
        self.metadata.index_at(instant)
    }

    pub fn element_at(&self, instant: DateTime<Utc>) -> Option<&T> {
        let index = self.index_at(instant);
        if index < 0 {
            return None;
        }
        self.elements.get(index as usize)
    }

    /// Window starting at the first step-aligned instant `>= from`
    pub fn sub_profile(&self, from: DateTime<Utc>) -> Result<Self> {
        let (metadata, skipped) = self.metadata.subprofile(from)?;
        Ok(Self {
            metadata,
            elements: self.elements[skipped..].to_vec(),
        })
    }

    /// Truncate, or pad with the element type's default value
    pub fn resize(&self, n_steps: usize) -> Self {
        let mut elements = self.elements.clone();
        elements.resize(n_steps, T::default_value());
        Self {
            metadata: self.metadata.with_n_steps(n_steps),
            elements,
        }
    }

    /// Map every element, keeping the horizon
    pub fn map<U, F>(&self, f: F) -> Profile<U>
    where
        F: FnMut(&T) -> U,
    {
        Profile {
            metadata: self.metadata,
            elements: self.elements.iter().map(f).collect(),
        }
    }

    /// Combine elementwise with a compatible profile, keeping this profile's horizon
    pub fn zip_with<U, V, F>(&self, other: &Profile<U>, mut f: F) -> Result<Profile<V>>
    where
        U: ProfileElement,
        F: FnMut(&T, &U) -> V,
    {
        self.ensure_compatible(other)?;
        Ok(Profile {
            metadata: self.metadata,
            elements: self
                .elements
                .iter()
                .zip(other.elements.iter())
                .map(|(a, b)| f(a, b))
                .collect(),
        })
    }
}

impl EnergyProfile {
    pub fn zeros(metadata: ProfileMetadata) -> Self {
        Self::filled_default(metadata)
    }

    pub fn add(&self, other: &EnergyProfile) -> Result<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn subtract(&self, other: &EnergyProfile) -> Result<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn minimum(&self, other: &EnergyProfile) -> Result<Self> {
        self.zip_with(other, |a, b| *a.min(b))
    }

    pub fn maximum(&self, other: &EnergyProfile) -> Result<Self> {
        self.zip_with(other, |a, b| *a.max(b))
    }

    pub fn absolute_values(&self) -> Self {
        self.map(|e| e.abs())
    }

    /// Sum of squared elements, i.e. the squared distance to the zero profile
    pub fn sum_squared_distance(&self) -> f64 {
        self.elements.iter().map(|&e| (e as f64).powi(2)).sum()
    }

    pub fn total_energy(&self) -> i64 {
        self.elements.iter().sum()
    }

    pub fn total_production(&self) -> i64 {
        self.elements.iter().map(|&e| e.min(0)).sum()
    }

    pub fn total_consumption(&self) -> i64 {
        self.elements.iter().map(|&e| e.max(0)).sum()
    }

    pub fn is_below_or_equal(&self, other: &EnergyProfile) -> Result<bool> {
        self.ensure_compatible(other)?;
        Ok(self.elements.iter().zip(other.elements()).all(|(a, b)| a <= b))
    }

    pub fn is_above_or_equal(&self, other: &EnergyProfile) -> Result<bool> {
        self.ensure_compatible(other)?;
        Ok(self.elements.iter().zip(other.elements()).all(|(a, b)| a >= b))
    }

    /// Average power in watts over the step containing `instant`
    pub fn average_power_at(&self, instant: DateTime<Utc>) -> Option<f64> {
        let step_seconds = self.metadata.step_seconds();
        self.element_at(instant).map(|&e| e as f64 / step_seconds)
    }
}

impl BoundProfile {
    pub fn unbounded(metadata: ProfileMetadata) -> Self {
        Self::filled_default(metadata)
    }

    /// Shift every bound by an energy profile; absent bounds stay absent
    pub fn add_energy(&self, energy: &EnergyProfile) -> Result<Self> {
        self.zip_with(energy, |bound, e| bound.map(|b| b + e))
    }
}
