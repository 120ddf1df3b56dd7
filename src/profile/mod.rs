//! Equally spaced time series over a fixed planning horizon.
//!
//! All arithmetic is elementwise and requires compatible profiles (same step
//! size and length). Profiles are never mutated in place.

pub mod metadata;
pub mod range;
pub mod series;
pub mod target;

pub use metadata::{next_aligned, ProfileMetadata};
pub use range::{EnergyRange, EnergyRangeProfile};
pub use series::{BoundProfile, EnergyProfile, FillLevelProfile, Profile, ProfileElement};
pub use target::{TargetElement, TargetProfile, JOULES_PER_KWH};
