use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use profile_steering::config::PlannerConfig;
use profile_steering::frbc::{FrbcDevicePlanner, FrbcDeviceState, OperationModeProfileTree};
use profile_steering::planning::{CongestionPointPlanner, DevicePlanner, RootPlanner, RootPlannerState};
use profile_steering::profile::{
    BoundProfile, EnergyProfile, EnergyRange, Profile, ProfileMetadata, TargetProfile,
};
use serde_json::json;

/// One heater step at full power, in joules
const STEP_ENERGY: i64 = 300_000;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn meta(n: usize) -> ProfileMetadata {
    ProfileMetadata::new(t0(), TimeDelta::seconds(300), n).unwrap()
}

/// Boiler with a 1 kW on/off heater; `cooldown_ms` blocks switching back on after switching off
fn boiler(id: &str, cooldown_ms: Option<i64>) -> FrbcDeviceState {
    let (timers, start_timers, blocking_timers) = match cooldown_ms {
        Some(ms) => (json!([{"id": "cooldown", "duration_ms": ms}]), json!(["cooldown"]), json!(["cooldown"])),
        None => (json!([]), json!([]), json!([])),
    };
    let mode = |id: &str, power: f64, rate: f64| {
        json!({"id": id, "elements": [{
            "fill_level_range": {"start_of_range": 0.0, "end_of_range": 100.0},
            "fill_rate": {"start_of_range": rate, "end_of_range": rate},
            "power_ranges": [{"start_of_range": power, "end_of_range": power, "commodity_quantity": "ELECTRIC_POWER_L1"}]
        }]})
    };
    serde_json::from_value(json!({
        "device_id": id,
        "device_name": format!("boiler {id}"),
        "connection_id": format!("conn-{id}"),
        "timestamp": t0(),
        "is_online": true,
        "system_descriptions": [{
            "valid_from": t0(),
            "actuators": [{
                "id": "heater",
                "operation_modes": [mode("off", 0.0, 0.0), mode("on", 1000.0, 0.01)],
                "transitions": [
                    {"id": "start", "from": "off", "to": "on", "blocking_timers": blocking_timers},
                    {"id": "stop", "from": "on", "to": "off", "start_timers": start_timers}
                ],
                "timers": timers
            }],
            "storage": {"fill_level_range": {"start_of_range": 0.0, "end_of_range": 100.0}}
        }],
        "actuator_statuses": [{"actuator_id": "heater", "active_operation_mode_id": "off"}],
        "storage_status": {"present_fill_level": 0.0}
    }))
    .unwrap()
}

fn best_plan(device: FrbcDeviceState, target: Vec<i64>) -> EnergyProfile {
    let n = target.len();
    let mut tree = OperationModeProfileTree::new(Arc::new(device), meta(n), t0());
    let target = TargetProfile::from_energy(&EnergyProfile::new(meta(n), target).unwrap());
    let unbounded = BoundProfile::unbounded(meta(n));
    tree.find_best_plan(&target, &unbounded, &unbounded).unwrap().energy
}

#[test]
fn initial_planning_without_target_keeps_heater_off() {
    let mut planner = FrbcDevicePlanner::new(boiler("a", None), meta(4), t0());
    let initial = planner.create_initial_planning(t0()).unwrap();
    assert_eq!(initial.elements(), &[0, 0, 0, 0]);

    let plan = planner.device_plan().unwrap();
    assert!(plan
        .instructions
        .elements()
        .iter()
        .all(|i| i.actuator_configurations["heater"].operation_mode_id == "off"));
}

#[test]
fn energy_target_is_met_exactly() {
    let target = vec![STEP_ENERGY; 4];
    let energy = best_plan(boiler("a", None), target.clone());
    assert_eq!(energy.elements(), target.as_slice());

    let diff = TargetProfile::from_energy(&EnergyProfile::new(meta(4), target).unwrap())
        .subtract(&energy)
        .unwrap();
    assert_eq!(diff.sum_squared_distance(), 0.0);
}

#[test]
fn blocking_timer_forbids_quick_restart() {
    let target = vec![STEP_ENERGY, 0, STEP_ENERGY, STEP_ENERGY];

    let free = best_plan(boiler("a", None), target.clone());
    assert_eq!(free.elements(), target.as_slice());

    // Switching off at 300 s keeps the heater off until 1200 s, past the horizon. Staying
    // on throughout misses the target by as much as starting late, at twice the energy.
    let blocked = best_plan(boiler("a", Some(900_000)), target.clone());
    assert_ne!(blocked.elements(), target.as_slice());
    assert_eq!(blocked.elements(), &[0, 0, STEP_ENERGY, STEP_ENERGY]);
}

#[test]
fn congestion_point_keeps_aggregate_within_range() {
    let n = 2;
    let range = Profile::new(meta(n), vec![EnergyRange::new(None, Some(STEP_ENERGY)); n]).unwrap();
    let mut cp = CongestionPointPlanner::new("feeder", range.clone());
    for id in ["a", "b"] {
        cp.add_device(Box::new(FrbcDevicePlanner::new(boiler(id, None), meta(n), t0())));
    }

    let target = TargetProfile::from_energy(&EnergyProfile::new(meta(n), vec![2 * STEP_ENERGY; n]).unwrap());
    let mut root = RootPlanner::new(target, &PlannerConfig::default());
    root.add_congestion_point(cp);
    let outcome = root.plan(t0(), true, i32::MAX).unwrap();

    assert!(range.is_within_range(&outcome.aggregate).unwrap());
    assert_eq!(outcome.aggregate.elements(), &[STEP_ENERGY, STEP_ENERGY]);
    assert_eq!(outcome.state, RootPlannerState::Converged);

    let total: i64 = root.device_plans().iter().map(|p| p.energy.total_energy()).sum();
    assert_eq!(total, outcome.aggregate.total_energy());
}

#[test]
fn root_stops_at_iteration_cap() {
    let n = 2;
    let mut cp = CongestionPointPlanner::new("feeder", Profile::filled_default(meta(n)));
    for id in ["a", "b"] {
        cp.add_device(Box::new(FrbcDevicePlanner::new(boiler(id, None), meta(n), t0())));
    }
    let target = TargetProfile::from_energy(&EnergyProfile::new(meta(n), vec![2 * STEP_ENERGY; n]).unwrap());
    let config = PlannerConfig {
        max_iterations: 1,
        ..PlannerConfig::default()
    };
    let mut root = RootPlanner::new(target, &config);
    root.add_congestion_point(cp);
    let outcome = root.plan(t0(), true, i32::MAX).unwrap();

    assert_eq!(outcome.rounds.len(), 1);
    assert_eq!(outcome.rounds[0].rounds, 1);
    assert!(outcome.rounds[0].iteration_limit_reached);
    assert_eq!(outcome.state, RootPlannerState::IterationLimitReached);
    assert_eq!(outcome.aggregate.elements(), &[STEP_ENERGY, STEP_ENERGY]);
}

/// Requires the heater to have run one step by the end of the second slot
fn with_early_fill_target(mut device: FrbcDeviceState) -> FrbcDeviceState {
    device.fill_level_target_profiles = serde_json::from_value(json!([{
        "start_time": t0() + TimeDelta::seconds(300),
        "elements": [{"duration_s": 300, "lower_limit": 2.9}]
    }]))
    .unwrap();
    device
}

#[test]
fn congestion_point_initial_planning_resolves_overload() {
    let n = 2;
    let range = Profile::new(meta(n), vec![EnergyRange::new(None, Some(STEP_ENERGY)); n]).unwrap();
    let mut cp = CongestionPointPlanner::new("feeder", range.clone());
    for id in ["a", "b"] {
        let device = with_early_fill_target(boiler(id, None));
        cp.add_device(Box::new(FrbcDevicePlanner::new(device, meta(n), t0())));
    }

    // Both boilers heat in the same slot on their own; one has to move
    let aggregate = cp.create_initial_planning(t0()).unwrap();
    assert!(range.is_within_range(&aggregate).unwrap());
    assert!(cp.initial_rounds() >= 1);
    assert_eq!(aggregate.elements(), &[STEP_ENERGY, STEP_ENERGY]);
    assert_eq!(cp.current_planning().unwrap(), aggregate);
}
