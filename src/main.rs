mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use profile_steering::{config::Config, scenario::Scenario, telemetry};
use tracing::{info, warn};

use crate::cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = Config::load_from(&args.config)?;
    telemetry::init_tracing(&cfg.telemetry);

    let raw = tokio::fs::read_to_string(&args.scenario)
        .await
        .with_context(|| format!("reading {}", args.scenario.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw).context("invalid scenario")?;

    info!(scenario = %args.scenario.display(), "starting planner");
    let planner = cfg.planner.clone();
    let run = tokio::task::spawn_blocking(move || scenario.run(&planner));

    let report = tokio::select! {
        joined = run => joined.context("planner task failed")??,
        _ = telemetry::shutdown_signal() => {
            warn!("interrupted before planning finished");
            return Ok(());
        }
    };

    let out = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{out}");
    info!(
        state = ?report.outcome.state,
        rounds = report.outcome.total_rounds(),
        "planning finished"
    );
    Ok(())
}
