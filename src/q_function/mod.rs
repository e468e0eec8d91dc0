//! Value function approximators
//!
//! - [`TileCodingQFunction`]: sparse multi-grid linear approximator with
//!   trie-indexed interval queries
//! - [`SumQ`]: sum of several value functions

pub mod sum;
pub mod tile_coding;

pub use sum::SumQ;
pub use tile_coding::TileCodingQFunction;
