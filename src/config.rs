use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

use crate::planning::DEFAULT_MAX_ITERATIONS;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub planner: PlannerConfig,
    pub telemetry: TelemetryConfig,
}

/// Negotiation settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PlannerConfig {
    #[validate(range(min = 1))]
    pub max_iterations: usize,
    /// A root round improving the target fit by at most this much ends its priority class
    #[validate(range(min = 0.0))]
    pub energy_iteration_criterion: f64,
    #[validate(range(min = 0.0))]
    pub cost_iteration_criterion: f64,
    pub optimize_for_target: bool,
    pub max_priority_class: i32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            energy_iteration_criterion: 1.0,
            cost_iteration_criterion: 0.0,
            optimize_for_target: true,
            max_priority_class: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default filter when `RUST_LOG` is not set
    pub filter: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    /// Defaults, then the TOML file if present, then `PROFILE_STEERING__*` variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PROFILE_STEERING__").split("__"));
        let config: Config = figment.extract().context("invalid configuration")?;
        config.validate().context("configuration out of range")?;
        Ok(config)
    }
}
