//! Append-only per-episode experience log
//!
//! A trajectory stores observations `obs[0..=n]`, actions `action[0..=n]`
//! (where `action[0]` is a placeholder for "the action that led to the initial
//! state"), rewards `reward[0..n]` and terminal flags `terminal[0..=n]`.
//! Timestep `t` has premise `obs[t]`, action `action[t + 1]`, reward
//! `reward[t]` and result `obs[t + 1]`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::{Action, State};

static NEXT_TRAJECTORY_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a trajectory
///
/// Learned models that keep per-trajectory data use this to release it when
/// the trajectory is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrajectoryId(u64);

impl TrajectoryId {
    fn next() -> Self {
        Self(NEXT_TRAJECTORY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct Trajectory {
    id: TrajectoryId,
    observations: Vec<State>,
    actions: Vec<Action>,
    rewards: Vec<f64>,
    terminals: Vec<bool>,
}

impl Trajectory {
    pub fn new(initial_state: State, initially_terminal: bool) -> Self {
        Self {
            id: TrajectoryId::next(),
            observations: vec![initial_state],
            // placeholder keeps actions aligned with observations
            actions: vec![0],
            rewards: Vec::new(),
            terminals: vec![initially_terminal],
        }
    }

    pub fn id(&self) -> TrajectoryId {
        self.id
    }

    /// Append the outcome of taking `action` in the current state.
    pub fn add_step(&mut self, action: Action, reward: f64, state: State, terminal: bool) {
        self.actions.push(action);
        self.rewards.push(reward);
        self.observations.push(state);
        self.terminals.push(terminal);
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn premise_state(&self, t: usize) -> &State {
        &self.observations[t]
    }

    pub fn result_state(&self, t: usize) -> &State {
        &self.observations[t + 1]
    }

    pub fn action(&self, t: usize) -> Action {
        self.actions[t + 1]
    }

    pub fn reward(&self, t: usize) -> f64 {
        self.rewards[t]
    }

    pub fn result_terminal(&self, t: usize) -> bool {
        self.terminals[t + 1]
    }

    /// Most recent observation.
    pub fn current_state(&self) -> &State {
        // observations always holds the initial state
        &self.observations[self.observations.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step() -> Trajectory {
        let mut traj = Trajectory::new(vec![0.0], false);
        traj.add_step(1, -1.0, vec![1.0], false);
        traj.add_step(0, 2.0, vec![0.0], true);
        traj
    }

    #[test]
    fn indexing_follows_premise_result_convention() {
        let traj = two_step();
        assert_eq!(traj.len(), 2);
        assert_eq!(traj.premise_state(1), &vec![1.0]);
        assert_eq!(traj.result_state(1), &vec![0.0]);
        assert_eq!(traj.action(0), 1);
        assert_eq!(traj.reward(1), 2.0);
        assert!(traj.result_terminal(1));
        assert_eq!(traj.current_state(), &vec![0.0]);
    }

    #[test]
    fn new_trajectory_is_empty() {
        let traj = Trajectory::new(vec![3.0, 4.0], false);
        assert!(traj.is_empty());
        assert_eq!(traj.current_state(), &vec![3.0, 4.0]);
    }

    #[test]
    fn ids_are_unique() {
        let a = Trajectory::new(vec![0.0], false);
        let b = Trajectory::new(vec![0.0], false);
        assert_ne!(a.id(), b.id());
    }
}
