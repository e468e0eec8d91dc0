//! Subcommands of the `smve` binary

pub mod config;
pub mod run;
