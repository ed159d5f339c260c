//! Phenocell CLI - run a tumor-immune simulation from a JSON config.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use phenocell_core_rs::{Simulation, SimulationConfig, StateSnapshot};
use tracing::info;

#[derive(Parser)]
#[command(name = "phenocell")]
#[command(author, version, about = "Agent-based tumor-immune simulation", long_about = None)]
struct Cli {
    /// JSON config file (defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the worker thread count (1 for reproducible runs)
    #[arg(long)]
    threads: Option<usize>,

    /// Override the stop time (minutes)
    #[arg(long)]
    t_max: Option<f64>,

    /// Resume from a checkpoint written by --checkpoint
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Write a checkpoint when the run ends
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Write report rows as JSON
    #[arg(short, long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let mut sim = match &cli.resume {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let snapshot = StateSnapshot::from_json(&text)?;
            Simulation::restore(config, &snapshot)?
        }
        None => Simulation::new(config)?,
    };

    info!(run_id = %sim.run_id(), cells = sim.cells().len(), "starting run");
    sim.run()?;

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(sim.report())?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), rows = sim.report().len(), "report written");
    }
    if let Some(path) = &cli.checkpoint {
        let json = sim.save_state()?.to_json()?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "checkpoint written");
    }

    if let Some(last) = sim.report().last() {
        println!(
            "t={:.1} min: {} cells ({} live tumor, {} dead tumor, {} immune, {} docked)",
            last.time,
            last.cells,
            last.live_tumor,
            last.dead_tumor,
            last.immune,
            last.attached_immune
        );
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(cli: &Cli) -> Result<SimulationConfig> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.rng_seed = seed;
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(t_max) = cli.t_max {
        config.t_max = t_max;
    }
    config.validate()?;
    Ok(config)
}
