//! Ports (trait boundaries) between the learning core and its collaborators.
//!
//! The core owns these traits; value functions, models and reporting sinks
//! implement them.

pub mod observer;
pub mod prediction;
pub mod q_function;

pub use observer::Observer;
pub use prediction::{BbiPredictionModel, LearnedModel, PredictionModel};
pub use q_function::QFunction;
