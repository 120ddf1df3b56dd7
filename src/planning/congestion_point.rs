use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::device_planner::{DevicePlan, DevicePlanner, PlannerId};
use super::proposal::Proposal;
use super::DEFAULT_MAX_ITERATIONS;
use crate::error::{PlanningError, Result};
use crate::profile::{EnergyProfile, EnergyRangeProfile, ProfileMetadata, TargetProfile};

/// Devices sharing one physical connection limit
pub struct CongestionPointPlanner {
    id: String,
    congestion_target: EnergyRangeProfile,
    devices: Vec<Box<dyn DevicePlanner>>,
    max_iterations: usize,
    initial_rounds: usize,
}

impl CongestionPointPlanner {
    pub fn new(id: impl Into<String>, congestion_target: EnergyRangeProfile) -> Self {
        Self {
            id: id.into(),
            congestion_target,
            devices: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            initial_rounds: 0,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn add_device(&mut self, device: Box<dyn DevicePlanner>) {
        self.devices.push(device);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metadata(&self) -> &ProfileMetadata {
        self.congestion_target.metadata()
    }

    pub fn congestion_target(&self) -> &EnergyRangeProfile {
        &self.congestion_target
    }

    pub fn devices(&self) -> &[Box<dyn DevicePlanner>] {
        &self.devices
    }

    /// Rounds spent fixing congestion during the last initial planning
    pub fn initial_rounds(&self) -> usize {
        self.initial_rounds
    }

    pub fn has_device(&self, id: PlannerId) -> bool {
        self.devices.iter().any(|d| d.id() == id)
    }

    pub fn min_priority_class(&self) -> i32 {
        self.devices.iter().map(|d| d.priority_class()).min().unwrap_or(1)
    }

    pub fn max_priority_class(&self) -> i32 {
        self.devices.iter().map(|d| d.priority_class()).max().unwrap_or(1)
    }

    /// Sum of the devices' accepted plans; devices without one count as zero
    pub fn current_planning(&self) -> Result<EnergyProfile> {
        let mut total = EnergyProfile::zeros(*self.metadata());
        for device in &self.devices {
            match device.current_profile() {
                Ok(profile) => total = total.add(&profile)?,
                Err(e) => debug!(congestion_point = %self.id, device = %device.name(), error = %e, "no accepted plan"),
            }
        }
        Ok(total)
    }

    /// Initial plans of all devices, then rounds that only reduce congestion
    pub fn create_initial_planning(&mut self, plan_due_by: DateTime<Utc>) -> Result<EnergyProfile> {
        let metadata = *self.metadata();
        let mut current = EnergyProfile::zeros(metadata);
        for device in &mut self.devices {
            match device.create_initial_planning(plan_due_by) {
                Ok(profile) => current = current.add(&profile)?,
                Err(e) => {
                    warn!(congestion_point = %self.id, device = %device.name(), error = %e, "initial planning failed")
                }
            }
        }
        self.initial_rounds = 0;
        if self.congestion_target.is_within_range(&current)? {
            return Ok(current);
        }

        // Devices keep to their accepted plan while the violation is fixed
        let no_target = TargetProfile::from_energy(&EnergyProfile::zeros(metadata));
        let mut iterations = 0;
        'classes: for priority_class in self.min_priority_class()..=self.max_priority_class() {
            debug!(congestion_point = %self.id, priority_class, "fixing congestion");
            loop {
                if iterations >= self.max_iterations {
                    warn!(congestion_point = %self.id, iterations, "initial planning hit iteration limit");
                    break 'classes;
                }
                let diff_to_max = self.congestion_target.difference_with_max_value(&current)?;
                let diff_to_min = self.congestion_target.difference_with_min_value(&current)?;

                let mut best: Option<Proposal> = None;
                for device in self.devices.iter_mut().filter(|d| d.priority_class() <= priority_class) {
                    match device.create_improved_planning(&no_target, &diff_to_max, &diff_to_min, plan_due_by) {
                        Ok(proposal) => {
                            debug!(
                                device = %device.name(),
                                improvement = proposal.congestion_improvement(),
                                "congestion proposal"
                            );
                            let better = best.as_ref().map_or(true, |b| {
                                proposal.congestion_improvement() > b.congestion_improvement()
                            });
                            if better {
                                best = Some(proposal);
                            }
                        }
                        Err(e) => warn!(device = %device.name(), error = %e, "no proposal"),
                    }
                }

                let Some(best) = best.filter(|p| p.congestion_improvement() > 0.0) else {
                    break;
                };
                if let Err(e) = self.accept_proposal(&best) {
                    warn!(congestion_point = %self.id, error = %e, "accepting proposal failed");
                    break;
                }
                current = current.subtract(best.old_plan())?.add(best.proposed_plan())?;
                iterations += 1;
                debug!(
                    congestion_point = %self.id,
                    device = %best.origin_name(),
                    improvement = best.congestion_improvement(),
                    iterations,
                    "accepted congestion proposal"
                );
            }
        }
        self.initial_rounds = iterations;
        info!(congestion_point = %self.id, rounds = iterations, "initial planning done");
        Ok(current)
    }

    /// Best proposal of the devices at or below `priority_class`, if any
    pub fn create_improved_planning(
        &mut self,
        diff_to_target: &TargetProfile,
        priority_class: i32,
        plan_due_by: DateTime<Utc>,
    ) -> Result<Option<Proposal>> {
        let current = self.current_planning()?;
        let diff_to_max = self.congestion_target.difference_with_max_value(&current)?;
        let diff_to_min = self.congestion_target.difference_with_min_value(&current)?;

        let mut best: Option<Proposal> = None;
        for device in self.devices.iter_mut().filter(|d| d.priority_class() <= priority_class) {
            let proposal = match device.create_improved_planning(
                diff_to_target,
                &diff_to_max,
                &diff_to_min,
                plan_due_by,
            ) {
                Ok(proposal) => proposal,
                Err(e) => {
                    warn!(congestion_point = %self.id, device = %device.name(), error = %e, "no proposal");
                    continue;
                }
            };
            if proposal.congestion_improvement() < 0.0 {
                debug!(
                    device = %device.name(),
                    improvement = proposal.congestion_improvement(),
                    "skipping proposal that worsens congestion"
                );
                continue;
            }
            if best.as_ref().map_or(true, |b| proposal.is_preferred_to(b)) {
                best = Some(proposal);
            }
        }

        match &best {
            Some(p) => debug!(
                congestion_point = %self.id,
                device = %p.origin_name(),
                improvement = p.global_improvement(),
                "selected proposal"
            ),
            None => debug!(congestion_point = %self.id, priority_class, "no proposal available"),
        }
        Ok(best)
    }

    /// Forward a proposal to the device that made it
    pub fn accept_proposal(&mut self, proposal: &Proposal) -> Result<()> {
        match self.devices.iter_mut().find(|d| d.id() == proposal.origin()) {
            Some(device) => device.accept_proposal(proposal),
            None => Err(PlanningError::ForeignProposal {
                planner: self.id.clone(),
                origin: proposal.origin_name().to_string(),
            }),
        }
    }

    pub fn device_plans(&self) -> Vec<DevicePlan> {
        self.devices.iter().filter_map(|d| d.device_plan()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::MockDevicePlanner;
    use crate::profile::{BoundProfile, EnergyRange, Profile};
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    fn meta() -> ProfileMetadata {
        ProfileMetadata::new(t0(), TimeDelta::seconds(900), 2).unwrap()
    }

    fn range(max: i64) -> EnergyRangeProfile {
        Profile::new(meta(), vec![EnergyRange::new(None, Some(max)); 2]).unwrap()
    }

    fn energy(values: [i64; 2]) -> EnergyProfile {
        EnergyProfile::new(meta(), values.to_vec()).unwrap()
    }

    /// Device with a fixed current profile that proposes `proposed` every round
    fn fixed_device(current: [i64; 2], proposed: [i64; 2], accepts: usize) -> MockDevicePlanner {
        let id = PlannerId::new();
        let mut mock = MockDevicePlanner::new();
        mock.expect_id().return_const(id);
        mock.expect_name().return_const("mock".to_string());
        mock.expect_priority_class().return_const(1);
        mock.expect_current_profile().returning(move || Ok(energy(current)));
        mock.expect_create_initial_planning().returning(move |_| Ok(energy(current)));
        mock.expect_create_improved_planning()
            .returning(move |target, max, min, _| {
                Proposal::new(
                    target.clone(),
                    max.clone(),
                    min.clone(),
                    energy(proposed),
                    energy(current),
                    id,
                    "mock",
                )
            });
        mock.expect_accept_proposal().times(accepts).returning(|_| Ok(()));
        mock
    }

    #[test]
    fn test_initial_planning_within_range_is_returned_unchanged() {
        let mut cp = CongestionPointPlanner::new("cp", range(100));
        cp.add_device(Box::new(fixed_device([10, 10], [0, 0], 0)));
        cp.add_device(Box::new(fixed_device([20, 20], [0, 0], 0)));
        let plan = cp.create_initial_planning(t0()).unwrap();
        assert_eq!(plan.elements(), &[30, 30]);
        assert_eq!(cp.initial_rounds(), 0);
    }

    #[test]
    fn test_failing_device_is_skipped() {
        let mut failing = MockDevicePlanner::new();
        failing.expect_id().return_const(PlannerId::new());
        failing.expect_name().return_const("broken".to_string());
        failing.expect_priority_class().return_const(1);
        failing.expect_create_initial_planning().returning(|_| {
            Err(PlanningError::NoFeasiblePlan {
                device: "broken".to_string(),
                reason: "test".to_string(),
            })
        });
        failing
            .expect_current_profile()
            .returning(|| Err(PlanningError::NoAcceptedPlan("broken".to_string())));
        failing.expect_create_improved_planning().returning(|_, _, _, _| {
            Err(PlanningError::NoAcceptedPlan("broken".to_string()))
        });

        let mut cp = CongestionPointPlanner::new("cp", range(100));
        cp.add_device(Box::new(failing));
        cp.add_device(Box::new(fixed_device([10, 10], [15, 15], 0)));
        assert_eq!(cp.create_initial_planning(t0()).unwrap().elements(), &[10, 10]);

        let target = TargetProfile::from_energy(&energy([50, 50]));
        let best = cp.create_improved_planning(&target, 1, t0()).unwrap().unwrap();
        assert_eq!(best.proposed_plan().elements(), &[15, 15]);
    }

    #[test]
    fn test_improved_planning_skips_congesting_proposals() {
        let mut cp = CongestionPointPlanner::new("cp", range(20));
        cp.add_device(Box::new(fixed_device([10, 10], [40, 40], 0)));
        let target = TargetProfile::from_energy(&energy([100, 100]));
        assert!(cp.create_improved_planning(&target, 1, t0()).unwrap().is_none());
    }

    #[test]
    fn test_priority_class_filters_devices() {
        let mut late = MockDevicePlanner::new();
        late.expect_id().return_const(PlannerId::new());
        late.expect_name().return_const("late".to_string());
        late.expect_priority_class().return_const(3);
        late.expect_current_profile().returning(|| Ok(energy([0, 0])));
        late.expect_create_improved_planning().never();

        let mut cp = CongestionPointPlanner::new("cp", range(100));
        cp.add_device(Box::new(late));
        let target = TargetProfile::from_energy(&energy([5, 5]));
        assert!(cp.create_improved_planning(&target, 2, t0()).unwrap().is_none());
        assert_eq!(cp.min_priority_class(), 3);
        assert_eq!(cp.max_priority_class(), 3);
    }

    #[test]
    fn test_accept_routes_to_origin() {
        let mut cp = CongestionPointPlanner::new("cp", range(100));
        cp.add_device(Box::new(fixed_device([0, 0], [5, 5], 1)));
        let target = TargetProfile::from_energy(&energy([5, 5]));
        let best = cp.create_improved_planning(&target, 1, t0()).unwrap().unwrap();
        assert!(cp.has_device(best.origin()));
        cp.accept_proposal(&best).unwrap();

        let stranger = Proposal::new(
            target,
            BoundProfile::unbounded(meta()),
            BoundProfile::unbounded(meta()),
            energy([1, 1]),
            energy([0, 0]),
            PlannerId::new(),
            "stranger",
        )
        .unwrap();
        assert!(matches!(
            cp.accept_proposal(&stranger),
            Err(PlanningError::ForeignProposal { .. })
        ));
    }
}
