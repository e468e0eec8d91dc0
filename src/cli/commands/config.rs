//! Config command - Write a resolved experiment configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::{config::Planner, pipeline::ExperimentConfig};

#[derive(Parser, Debug)]
#[command(about = "Write an experiment configuration file")]
pub struct ConfigArgs {
    /// Where to write the configuration (JSON)
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Planner whose forced options are applied
    #[arg(long, short = 'p')]
    pub planner: Option<Planner>,

    /// Start from this configuration instead of the defaults
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

pub fn execute(args: ConfigArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    if let Some(planner) = args.planner {
        config.planner = planner;
    }

    let config = config.resolved();
    config.validate().context("invalid experiment configuration")?;
    config
        .save(&args.output)
        .with_context(|| format!("failed to write config to {}", args.output.display()))?;
    println!("Configuration written to {}", args.output.display());
    Ok(())
}
