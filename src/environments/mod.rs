//! Benchmark environments
//!
//! An environment is a [`PredictionModel`](crate::ports::PredictionModel)
//! that the experiment driver steps with concrete states. Each one also
//! ships the value-function layout suited to its state space and, where
//! useful, an oracle model that planners may roll out instead of a learned
//! one.

pub mod go_right;

pub use go_right::{GoRight, GoRightUncertain};
