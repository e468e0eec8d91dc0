//! Q-learning with selective model-based value expansion
//!
//! The learner bootstraps `Q(s, a)` from targets at several lookahead depths.
//! Depth 0 is the ordinary one-step target; deeper targets come from rolling a
//! dynamics model forward along the greedy policy. How much each depth counts
//! depends on the update rule:
//!
//! | Update | Per-depth weight |
//! |--------|------------------|
//! | [`QLearner::q_update`] | depth 0 only |
//! | [`QLearner::mve_update`] | equal |
//! | [`QLearner::one_step_uncertainty_update`] | accumulated one-step variance or bound width |
//! | [`QLearner::target_range_update`] | interval bound on the depth's return |
//! | [`QLearner::monte_carlo_update`] | spread of a particle population |
//!
//! ## Usage Example
//!
//! ```no_run
//! use smve::{
//!     config::SmveConfig,
//!     q_function::TileCodingQFunction,
//!     q_learning::QLearner,
//!     rng::SmveRng,
//!     trajectory::Trajectory,
//!     types::Bound,
//! };
//!
//! let mut rng = SmveRng::seed_from_u64(0);
//! let q = TileCodingQFunction::new(vec![Bound::new(0.0, 10.0)], vec![10], 1, 2, &mut rng)?;
//! let mut learner = QLearner::new(Box::new(q), &SmveConfig::default(), &mut rng)?;
//!
//! let mut traj = Trajectory::new(vec![0.0], false);
//! traj.add_step(1, -1.0, vec![1.0], false);
//! learner.q_update(&traj, 0);
//! # Ok::<(), smve::Error>(())
//! ```

pub mod learner;
pub mod measurements;
mod rollout;
pub mod weighting;

pub use learner::QLearner;
pub use measurements::Measurements;
pub use weighting::interval_greedy;
