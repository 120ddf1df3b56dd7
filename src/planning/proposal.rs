use once_cell::unsync::OnceCell;

use super::device_planner::PlannerId;
use crate::error::Result;
use crate::profile::{BoundProfile, EnergyProfile, TargetProfile};

/// Candidate replacement of a device's accepted plan, scored lazily.
///
/// All profiles are differences or plans over the same horizon; the
/// constructor rejects anything else so scoring never fails.
#[derive(Debug, Clone)]
pub struct Proposal {
    global_diff_target: TargetProfile,
    diff_to_max: BoundProfile,
    diff_to_min: BoundProfile,
    proposed_plan: EnergyProfile,
    old_plan: EnergyProfile,
    origin: PlannerId,
    origin_name: String,
    global_improvement: OnceCell<f64>,
    congestion_improvement: OnceCell<f64>,
    cost_improvement: OnceCell<f64>,
}

impl Proposal {
    pub fn new(
        global_diff_target: TargetProfile,
        diff_to_max: BoundProfile,
        diff_to_min: BoundProfile,
        proposed_plan: EnergyProfile,
        old_plan: EnergyProfile,
        origin: PlannerId,
        origin_name: impl Into<String>,
    ) -> Result<Self> {
        old_plan.ensure_compatible(&proposed_plan)?;
        old_plan.ensure_compatible(&global_diff_target)?;
        old_plan.ensure_compatible(&diff_to_max)?;
        old_plan.ensure_compatible(&diff_to_min)?;
        Ok(Self {
            global_diff_target,
            diff_to_max,
            diff_to_min,
            proposed_plan,
            old_plan,
            origin,
            origin_name: origin_name.into(),
            global_improvement: OnceCell::new(),
            congestion_improvement: OnceCell::new(),
            cost_improvement: OnceCell::new(),
        })
    }

    pub fn origin(&self) -> PlannerId {
        self.origin
    }

    pub fn origin_name(&self) -> &str {
        &self.origin_name
    }

    pub fn proposed_plan(&self) -> &EnergyProfile {
        &self.proposed_plan
    }

    pub fn old_plan(&self) -> &EnergyProfile {
        &self.old_plan
    }

    pub fn global_diff_target(&self) -> &TargetProfile {
        &self.global_diff_target
    }

    /// Change per timestep when the proposal replaces the old plan
    fn deltas(&self) -> impl Iterator<Item = i64> + '_ {
        self.old_plan
            .elements()
            .iter()
            .zip(self.proposed_plan.elements())
            .map(|(old, new)| old - new)
    }

    /// Reduction of the squared distance to the energy target; positive is better
    pub fn global_improvement(&self) -> f64 {
        *self.global_improvement.get_or_init(|| {
            self.global_diff_target
                .elements()
                .iter()
                .zip(self.deltas())
                .filter_map(|(target, delta)| target.energy().map(|t| (t, delta)))
                .map(|(t, delta)| (t as f64).powi(2) - ((t + delta) as f64).powi(2))
                .sum()
        })
    }

    /// Reduction of the squared congestion violation; exactly 0 when neither side changes
    pub fn congestion_improvement(&self) -> f64 {
        *self.congestion_improvement.get_or_init(|| {
            let (max_old, max_new) = exceedance(&self.diff_to_max, self.deltas(), |d| d.min(0));
            let (min_old, min_new) = exceedance(&self.diff_to_min, self.deltas(), |d| d.max(0));
            if max_old == max_new && min_old == min_new {
                0.0
            } else {
                max_old + min_old - max_new - min_new
            }
        })
    }

    /// Cost of the old plan minus cost of the proposed plan under the target's tariffs
    pub fn cost_improvement(&self) -> f64 {
        *self.cost_improvement.get_or_init(|| {
            let old = self.global_diff_target.cost_of(&self.old_plan).unwrap_or(0.0);
            let new = self.global_diff_target.cost_of(&self.proposed_plan).unwrap_or(0.0);
            old - new
        })
    }

    /// Preferred if it does not worsen congestion and improves the target fit
    /// more than `other`, with cost deciding equal fits
    pub fn is_preferred_to(&self, other: &Proposal) -> bool {
        if self.congestion_improvement() < 0.0 {
            return false;
        }
        let (own, theirs) = (self.global_improvement(), other.global_improvement());
        own > theirs || (own == theirs && self.cost_improvement() > other.cost_improvement())
    }
}

/// Squared violation before and after applying `deltas` to a bound difference
fn exceedance(
    diff: &BoundProfile,
    deltas: impl Iterator<Item = i64>,
    clamp: impl Fn(i64) -> i64,
) -> (f64, f64) {
    diff.elements()
        .iter()
        .zip(deltas)
        .filter_map(|(d, delta)| d.map(|d| (d, delta)))
        .fold((0.0, 0.0), |(before, after), (d, delta)| {
            (
                before + (clamp(d) as f64).powi(2),
                after + (clamp(d + delta) as f64).powi(2),
            )
        })
}
