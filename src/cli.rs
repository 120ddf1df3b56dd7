use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    /// Scenario JSON with the horizon, the target and the congestion points.
    pub scenario: PathBuf,

    #[clap(long, default_value = "config/default.toml", env = "PROFILE_STEERING_CONFIG")]
    pub config: PathBuf,

    /// Pretty-print the report.
    #[clap(long)]
    pub pretty: bool,
}
