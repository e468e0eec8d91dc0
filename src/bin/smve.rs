//! SMVE CLI - Selective model-based value expansion experiments
//!
//! This CLI provides:
//! - `run`: learn on the go-right corridor with a chosen planner
//! - `config`: write a resolved experiment configuration
//!
//! Set `RUST_LOG` (e.g. `RUST_LOG=smve=debug`) for diagnostic output.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(Parser)]
#[command(name = "smve")]
#[command(version, about = "Selective model-based value expansion experiments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a planning experiment
    Run(smve::cli::commands::run::RunArgs),

    /// Write a resolved experiment configuration
    Config(smve::cli::commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => smve::cli::commands::run::execute(args),
        Commands::Config(args) => smve::cli::commands::config::execute(args),
    }
}
