//! Selective model-based value expansion (SMVE)
//!
//! This crate provides:
//! - Tile-coded Q-functions with interval value queries
//! - Incremental regression-tree dynamics models with sound interval bounds
//! - A Q-learner that blends multi-step model rollouts, weighting each depth
//!   by how uncertain the model is about it
//! - The go-right benchmark, an experiment driver and a CLI

pub mod cli;
pub mod config;
pub mod environments;
pub mod error;
pub mod model_tree;
pub mod models;
pub mod pipeline;
pub mod ports;
pub mod q_function;
pub mod q_learning;
pub mod rng;
pub mod trajectory;
pub mod types;

pub use config::{Planner, SmveConfig, UpdateRule};
pub use error::{Error, Result};
pub use q_learning::{Measurements, QLearner};
pub use rng::SmveRng;
pub use trajectory::Trajectory;
pub use types::{Action, Bound, State, StateBound};
