#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless runner that advances a Kiln level and prints a JSON report.

mod report;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kiln_core::Command;
use kiln_simulation::{FieldMode, LevelData, Simulation, SimulationConfig};

use crate::report::{EventTally, RunReport};

/// Runs a level for a fixed number of ticks without rendering.
#[derive(Debug, Parser)]
#[command(name = "kiln", version)]
struct Args {
    /// Level description in TOML.
    #[arg(long)]
    level: PathBuf,

    /// Simulation configuration in TOML; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Overrides the configured tick length in milliseconds.
    #[arg(long)]
    dt_ms: Option<u64>,

    /// Overrides the configured random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Runs the substance field on the simulation thread.
    #[arg(long)]
    inline: bool,

    /// Pretty-prints the JSON report.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(dt_ms) = args.dt_ms {
        config.tick_ms = dt_ms;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.inline {
        config.field = FieldMode::Inline;
    }

    let level = LevelData::load(&args.level)
        .with_context(|| format!("loading level from {}", args.level.display()))?;
    let mut simulation =
        Simulation::new(&config, &level).context("building the simulation from the level")?;

    let dt = Duration::from_millis(config.tick_ms);
    let mut tally = EventTally::default();
    let mut events = Vec::new();
    for _ in 0..args.ticks {
        simulation.apply(Command::Tick { dt }, &mut events);
        tally.record(&events);
        events.clear();
    }
    tracing::info!(ticks = args.ticks, "run complete");

    let report = RunReport::new(&simulation, &tally);
    let json = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("serialising the run report")?;
    println!("{json}");
    Ok(())
}
