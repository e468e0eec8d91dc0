//! Experiment pipeline
//!
//! This module provides:
//! - The go-right experiment driver (learning and evaluation episodes)
//! - Aggregation of model and target errors per episode
//! - Observers that report progress, log lines and CSV rows

pub mod experiment;
pub mod metrics;
pub mod observers;

pub use experiment::{EpisodeReport, Experiment, ExperimentConfig, ExperimentSummary, GoRightConfig};
pub use metrics::{DepthSeries, ErrorAccumulator, ErrorReport};
pub use observers::{CsvObserver, LogObserver, ProgressObserver};

pub use crate::ports::Observer;
