//! Action-value function port
//!
//! The learner only ever talks to a value function through this trait, so
//! tile coders, ensembles of tile coders and test doubles are interchangeable.

use crate::types::{Action, Bound};

/// Action-value function supporting point queries, sound interval queries and
/// in-place additive updates.
///
/// States passed to an implementation must have at least as many dimensions
/// as the function was built for; extra trailing dimensions are ignored.
///
/// # Examples
///
/// ```no_run
/// use smve::{ports::QFunction, types::Bound};
///
/// fn greedy_value(q: &dyn QFunction, state: &[f64]) -> f64 {
///     q.all_action_qs(state)
///         .into_iter()
///         .fold(f64::NEG_INFINITY, f64::max)
/// }
///
/// fn value_range(q: &dyn QFunction, region: &[Bound], action: usize) -> f64 {
///     q.q_bound(region, action).width()
/// }
/// ```
pub trait QFunction {
    fn num_actions(&self) -> usize;

    /// Estimated value of taking `action` in `state`.
    fn q(&self, state: &[f64], action: Action) -> f64;

    /// Estimated values of every action in `state`, indexed by action.
    fn all_action_qs(&self, state: &[f64]) -> Vec<f64> {
        (0..self.num_actions()).map(|a| self.q(state, a)).collect()
    }

    /// Bound containing `q(s, action)` for every state `s` inside
    /// `state_bound`.
    fn q_bound(&self, state_bound: &[Bound], action: Action) -> Bound;

    /// Per-action bounds over `state_bound`, indexed by action.
    fn all_action_q_bounds(&self, state_bound: &[Bound]) -> Vec<Bound> {
        (0..self.num_actions())
            .map(|a| self.q_bound(state_bound, a))
            .collect()
    }

    /// Add `change` to the estimate for `(state, action)`.
    fn update_q(&mut self, state: &[f64], action: Action, change: f64);

    /// Divisor applied to the learner's step size.
    fn step_size_normalizer(&self) -> f64;
}
