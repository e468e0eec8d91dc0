//! Run command - Run a go-right planning experiment

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    cli::output,
    config::Planner,
    pipeline::{CsvObserver, Experiment, ExperimentConfig, LogObserver, ProgressObserver},
};

#[derive(Parser, Debug)]
#[command(about = "Run a planning experiment on the go-right corridor")]
pub struct RunArgs {
    /// Experiment configuration file (JSON); flags below override it
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Planner code (Q, P, E, SR, SV, RR, RV, SRR, SRV, TR, TDR, TOR, TDOR,
    /// S, MCTV, MCTR, MCTDR, MCTOR, MCTDOR; prefix I to plan with the oracle)
    #[arg(long, short = 'p')]
    pub planner: Option<Planner>,

    /// Number of learning frames
    #[arg(long, short = 'n')]
    pub frames: Option<usize>,

    /// Random seed
    #[arg(long, short = 'd')]
    pub seed: Option<u64>,

    /// Rollout horizon, including the one-step target
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Write one CSV row per episode to this file
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Write the run summary as JSON to this file
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,
}

/// Base configuration from `--config` with the command-line overrides applied.
pub fn build_config(args: &RunArgs) -> Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ExperimentConfig::default(),
    };

    if let Some(planner) = &args.planner {
        config.planner = planner.clone();
    }
    if let Some(frames) = args.frames {
        config.num_frames = frames;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(horizon) = args.horizon {
        config.smve.horizon = horizon;
    }
    Ok(config)
}

pub fn execute(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let mut experiment = Experiment::new(config).context("invalid experiment configuration")?;
    output::print_config(experiment.config());

    if args.progress {
        experiment = experiment.with_observer(Box::new(ProgressObserver::new()));
    }
    experiment = experiment.with_observer(Box::new(LogObserver));
    if let Some(path) = &args.output {
        let csv = CsvObserver::new(path)
            .with_context(|| format!("failed to create results file {}", path.display()))?;
        experiment = experiment.with_observer(Box::new(csv));
    }

    let summary = experiment.run().context("experiment failed")?;
    output::print_summary(&summary);

    if let Some(path) = &args.summary {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        println!("\nSummary written to {}", path.display());
    }
    Ok(())
}
