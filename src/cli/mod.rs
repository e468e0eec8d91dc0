//! CLI infrastructure for the SMVE experiment runner
//!
//! This module provides the command-line interface for running planning
//! experiments and generating their configuration files.

pub mod commands;
pub mod output;
