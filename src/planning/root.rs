use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::congestion_point::CongestionPointPlanner;
use super::device_planner::DevicePlan;
use super::proposal::Proposal;
use crate::config::PlannerConfig;
use crate::error::Result;
use crate::profile::{EnergyProfile, TargetProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RootPlannerState {
    Initializing,
    Bidding { priority_class: i32 },
    Converged,
    IterationLimitReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityClassRounds {
    pub priority_class: i32,
    pub rounds: usize,
    pub iteration_limit_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanningOutcome {
    pub state: RootPlannerState,
    pub aggregate: EnergyProfile,
    pub rounds: Vec<PriorityClassRounds>,
}

impl PlanningOutcome {
    pub fn total_rounds(&self) -> usize {
        self.rounds.iter().map(|r| r.rounds).sum()
    }
}

/// Top-level negotiation of all congestion points against a global target
pub struct RootPlanner {
    target: TargetProfile,
    energy_iteration_criterion: f64,
    cost_iteration_criterion: f64,
    max_iterations: usize,
    congestion_points: Vec<CongestionPointPlanner>,
    aggregate: EnergyProfile,
    state: RootPlannerState,
}

impl RootPlanner {
    pub fn new(target: TargetProfile, config: &PlannerConfig) -> Self {
        let aggregate = EnergyProfile::zeros(*target.metadata());
        Self {
            target,
            energy_iteration_criterion: config.energy_iteration_criterion,
            cost_iteration_criterion: config.cost_iteration_criterion,
            max_iterations: config.max_iterations.max(1),
            congestion_points: Vec::new(),
            aggregate,
            state: RootPlannerState::Initializing,
        }
    }

    pub fn add_congestion_point(&mut self, congestion_point: CongestionPointPlanner) {
        self.congestion_points.push(congestion_point);
    }

    pub fn congestion_points(&self) -> &[CongestionPointPlanner] {
        &self.congestion_points
    }

    pub fn aggregate(&self) -> &EnergyProfile {
        &self.aggregate
    }

    pub fn state(&self) -> RootPlannerState {
        self.state
    }

    pub fn device_plans(&self) -> Vec<DevicePlan> {
        self.congestion_points.iter().flat_map(|cp| cp.device_plans()).collect()
    }

    /// Run the negotiation. Hitting the round cap is reported in the outcome, not as an error.
    pub fn plan(
        &mut self,
        plan_due_by: DateTime<Utc>,
        optimize_for_target: bool,
        max_priority_class: i32,
    ) -> Result<PlanningOutcome> {
        self.state = RootPlannerState::Initializing;
        self.aggregate = EnergyProfile::zeros(*self.target.metadata());
        for cp in &mut self.congestion_points {
            match cp.create_initial_planning(plan_due_by) {
                Ok(initial) => self.aggregate = self.aggregate.add(&initial)?,
                Err(e) => warn!(congestion_point = %cp.id(), error = %e, "initial planning failed"),
            }
        }

        let mut rounds = Vec::new();
        if !optimize_for_target || self.congestion_points.is_empty() {
            self.state = RootPlannerState::Converged;
            return Ok(self.outcome(rounds));
        }

        let min_class = self.congestion_points.iter().map(|cp| cp.min_priority_class()).min().unwrap_or(1);
        let max_class = self
            .congestion_points
            .iter()
            .map(|cp| cp.max_priority_class())
            .max()
            .unwrap_or(1)
            .min(max_priority_class);

        for priority_class in min_class..=max_class {
            self.state = RootPlannerState::Bidding { priority_class };
            let result = self.bid(priority_class, plan_due_by)?;
            info!(
                priority_class,
                rounds = result.rounds,
                limit = result.iteration_limit_reached,
                "priority class done"
            );
            rounds.push(result);
        }

        self.state = if rounds.iter().any(|r| r.iteration_limit_reached) {
            RootPlannerState::IterationLimitReached
        } else {
            RootPlannerState::Converged
        };
        Ok(self.outcome(rounds))
    }

    /// Rounds of one priority class until no proposal, convergence or the cap
    fn bid(&mut self, priority_class: i32, plan_due_by: DateTime<Utc>) -> Result<PriorityClassRounds> {
        let mut rounds = 0;
        let mut iteration_limit_reached = false;
        loop {
            let difference = self.target.subtract(&self.aggregate)?;
            let mut best: Option<(usize, Proposal)> = None;
            for (index, cp) in self.congestion_points.iter_mut().enumerate() {
                match cp.create_improved_planning(&difference, priority_class, plan_due_by) {
                    Ok(Some(proposal)) => {
                        if best.as_ref().map_or(true, |(_, b)| proposal.is_preferred_to(b)) {
                            best = Some((index, proposal));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(congestion_point = %cp.id(), error = %e, "no proposal"),
                }
            }

            let Some((index, best)) = best else {
                debug!(priority_class, rounds, "no proposal left");
                break;
            };
            if let Err(e) = self.congestion_points[index].accept_proposal(&best) {
                warn!(device = %best.origin_name(), error = %e, "accepting proposal failed");
                break;
            }
            self.aggregate = self.aggregate.subtract(best.old_plan())?.add(best.proposed_plan())?;
            rounds += 1;
            debug!(
                device = %best.origin_name(),
                global = best.global_improvement(),
                cost = best.cost_improvement(),
                congestion = best.congestion_improvement(),
                rounds,
                "accepted proposal"
            );

            if best.global_improvement() <= self.energy_iteration_criterion
                && best.cost_improvement() <= self.cost_iteration_criterion
            {
                break;
            }
            if rounds >= self.max_iterations {
                warn!(priority_class, rounds, "optimization stopped at iteration limit");
                iteration_limit_reached = true;
                break;
            }
        }
        Ok(PriorityClassRounds {
            priority_class,
            rounds,
            iteration_limit_reached,
        })
    }

    fn outcome(&self, rounds: Vec<PriorityClassRounds>) -> PlanningOutcome {
        PlanningOutcome {
            state: self.state,
            aggregate: self.aggregate.clone(),
            rounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::{MockDevicePlanner, PlannerId};
    use crate::profile::{EnergyRange, EnergyRangeProfile, Profile, ProfileMetadata};
    use chrono::{TimeDelta, TimeZone};
    use std::sync::{Arc, Mutex};

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    fn meta() -> ProfileMetadata {
        ProfileMetadata::new(t0(), TimeDelta::seconds(900), 2).unwrap()
    }

    fn unconstrained() -> EnergyRangeProfile {
        Profile::new(meta(), vec![EnergyRange::default(); 2]).unwrap()
    }

    fn config(max_iterations: usize) -> PlannerConfig {
        PlannerConfig {
            max_iterations,
            energy_iteration_criterion: 0.0,
            cost_iteration_criterion: 0.0,
            ..PlannerConfig::default()
        }
    }

    /// Device whose accepted plan grows by `step` per accepted proposal while short of the target
    fn growing_device(step: i64, priority_class: i32) -> MockDevicePlanner {
        let id = PlannerId::new();
        let accepted = Arc::new(Mutex::new(0_i64));
        let mut mock = MockDevicePlanner::new();
        mock.expect_id().return_const(id);
        mock.expect_name().return_const(format!("grow-{step}"));
        mock.expect_priority_class().return_const(priority_class);
        mock.expect_device_plan().returning(|| None);
        mock.expect_create_initial_planning()
            .returning(|_| Ok(EnergyProfile::zeros(meta())));
        let current = Arc::clone(&accepted);
        mock.expect_current_profile().returning(move || {
            let v = *current.lock().unwrap();
            EnergyProfile::new(meta(), vec![v, v])
        });
        let proposing = Arc::clone(&accepted);
        mock.expect_create_improved_planning()
            .returning(move |target, max, min, _| {
                let v = *proposing.lock().unwrap();
                // Stop growing once the remaining distance is smaller than a step
                let wanted = target.elements()[0].energy().unwrap_or(0);
                let step = if wanted >= step { step } else { 0 };
                Proposal::new(
                    target.clone(),
                    max.clone(),
                    min.clone(),
                    EnergyProfile::new(meta(), vec![v + step, v + step])?,
                    EnergyProfile::new(meta(), vec![v, v])?,
                    id,
                    "grow",
                )
            });
        mock.expect_accept_proposal().returning(move |_| {
            *accepted.lock().unwrap() += step;
            Ok(())
        });
        mock
    }

    fn root_with(target: Vec<i64>, devices: Vec<MockDevicePlanner>, max_iterations: usize) -> RootPlanner {
        let target = TargetProfile::from_energy(&EnergyProfile::new(meta(), target).unwrap());
        let mut root = RootPlanner::new(target, &config(max_iterations));
        let mut cp = CongestionPointPlanner::new("cp", unconstrained());
        for device in devices {
            cp.add_device(Box::new(device));
        }
        root.add_congestion_point(cp);
        root
    }

    #[test]
    fn test_converges_on_target() {
        let mut root = root_with(vec![30, 30], vec![growing_device(10, 1)], 1000);
        let outcome = root.plan(t0(), true, i32::MAX).unwrap();
        // Three rounds reach the target, the fourth proposes no change and ends the class
        assert_eq!(outcome.aggregate.elements(), &[30, 30]);
        assert_eq!(outcome.rounds[0].rounds, 4);
        assert!(!outcome.rounds[0].iteration_limit_reached);
        assert_eq!(outcome.state, RootPlannerState::Converged);
        assert_eq!(root.state(), RootPlannerState::Converged);
    }

    #[test]
    fn test_iteration_cap_terminates_each_class() {
        let mut root = root_with(
            vec![1_000_000, 1_000_000],
            vec![growing_device(1, 1), growing_device(1, 2)],
            5,
        );
        let outcome = root.plan(t0(), true, i32::MAX).unwrap();
        assert_eq!(outcome.rounds.len(), 2);
        assert!(outcome.rounds.iter().all(|r| r.rounds == 5 && r.iteration_limit_reached));
        assert_eq!(outcome.state, RootPlannerState::IterationLimitReached);
        assert_eq!(outcome.total_rounds(), 10);
        assert_eq!(outcome.aggregate.elements(), &[10, 10]);
    }

    #[test]
    fn test_external_priority_cap() {
        let mut root = root_with(
            vec![100, 100],
            vec![growing_device(10, 1), growing_device(10, 4)],
            1000,
        );
        let outcome = root.plan(t0(), true, 2).unwrap();
        let classes: Vec<i32> = outcome.rounds.iter().map(|r| r.priority_class).collect();
        assert_eq!(classes, vec![1, 2]);
    }

    #[test]
    fn test_no_optimization_returns_initial_aggregate() {
        let mut root = root_with(vec![100, 100], vec![growing_device(10, 1)], 1000);
        let outcome = root.plan(t0(), false, i32::MAX).unwrap();
        assert_eq!(outcome.aggregate.elements(), &[0, 0]);
        assert!(outcome.rounds.is_empty());
        assert_eq!(outcome.state, RootPlannerState::Converged);
    }

    #[test]
    fn test_without_congestion_points() {
        let target = TargetProfile::from_energy(&EnergyProfile::zeros(meta()));
        let mut root = RootPlanner::new(target, &config(10));
        let outcome = root.plan(t0(), true, i32::MAX).unwrap();
        assert_eq!(outcome.state, RootPlannerState::Converged);
        assert!(root.device_plans().is_empty());
    }
}
