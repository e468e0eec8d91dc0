//! Shared fixtures for the integration tests.
//!
//! Not every test binary uses every fixture.
#![allow(dead_code)]

use smve::{
    Action, Bound, QLearner, SmveConfig, SmveRng, State, Trajectory,
    pipeline::{ExperimentConfig, GoRightConfig},
    ports::{BbiPredictionModel, PredictionModel, QFunction},
    q_function::TileCodingQFunction,
};

pub const LEFT: Action = 0;
pub const RIGHT: Action = 1;

/// A corridor of `cells` cells. The agent sits at cell centers `i + 0.5`;
/// moving right out of the last cell pays 1 and ends the episode.
#[derive(Debug, Clone, Copy)]
pub struct Corridor {
    pub cells: usize,
}

impl Corridor {
    pub fn start(&self) -> State {
        vec![0.5]
    }

    fn exits(&self, premise: &[f64], action: Action) -> bool {
        action == RIGHT && premise[0] > self.cells as f64 - 1.0
    }

    /// One exact transition: next state, reward and termination.
    pub fn step(&self, state: &[f64], action: Action) -> (State, f64, bool) {
        (
            self.state_prediction(state, action),
            self.reward_prediction(state, action),
            self.term_prediction(state, action) > 0.5,
        )
    }

    /// Value function with one cell per corridor cell.
    pub fn q_function(&self, rng: &mut SmveRng) -> Box<dyn QFunction> {
        Box::new(
            TileCodingQFunction::new(
                vec![Bound::new(0.0, self.cells as f64)],
                vec![self.cells],
                1,
                2,
                rng,
            )
            .unwrap(),
        )
    }
}

impl PredictionModel for Corridor {
    fn state_prediction(&self, premise: &[f64], action: Action) -> State {
        let x = premise[0];
        if self.exits(premise, action) {
            vec![x]
        } else if action == RIGHT {
            vec![x + 1.0]
        } else {
            vec![(x - 1.0).max(0.5)]
        }
    }

    fn reward_prediction(&self, premise: &[f64], action: Action) -> f64 {
        if self.exits(premise, action) { 1.0 } else { 0.0 }
    }

    fn term_prediction(&self, premise: &[f64], action: Action) -> f64 {
        if self.exits(premise, action) { 1.0 } else { 0.0 }
    }

    fn as_bbi(&self) -> Option<&dyn BbiPredictionModel> {
        Some(self)
    }
}

impl Corridor {
    fn may_exit(&self, premise: &[Bound], actions: &[Action]) -> bool {
        actions.contains(&RIGHT) && premise[0].upper > self.cells as f64 - 1.0
    }
}

impl BbiPredictionModel for Corridor {
    fn state_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Vec<Bound> {
        let x = premise[0];
        let next = actions
            .iter()
            .map(|&a| {
                if a == RIGHT {
                    Bound::new(x.lower, x.upper + 1.0)
                } else {
                    Bound::new((x.lower - 1.0).max(0.5), (x.upper - 1.0).max(0.5))
                }
            })
            .reduce(|acc, b| acc.union(&b))
            .unwrap_or(x);
        vec![next]
    }

    fn reward_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Bound {
        if self.may_exit(premise, actions) {
            Bound::new(0.0, 1.0)
        } else {
            Bound::point(0.0)
        }
    }

    fn term_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Bound {
        self.reward_bounds_over(premise, actions)
    }
}

/// A learner over `corridor`, seeded the way the experiment driver seeds it.
pub fn corridor_learner(corridor: &Corridor, config: &SmveConfig, seed: u64) -> QLearner {
    let mut rng = SmveRng::seed_from_u64(seed);
    let q = corridor.q_function(&mut rng);
    QLearner::new(q, config, &mut rng).unwrap()
}

/// Walk `corridor` from its start with `policy` for at most `max_steps` steps.
pub fn corridor_episode(
    corridor: &Corridor,
    max_steps: usize,
    mut policy: impl FnMut(&[f64]) -> Action,
) -> Trajectory {
    let mut trajectory = Trajectory::new(corridor.start(), false);
    for _ in 0..max_steps {
        let state = trajectory.current_state().clone();
        let action = policy(&state);
        let (next, reward, terminal) = corridor.step(&state, action);
        trajectory.add_step(action, reward, next, terminal);
        if terminal {
            break;
        }
    }
    trajectory
}

/// A small go-right run that finishes in a few episodes.
pub fn short_experiment(planner: &str) -> ExperimentConfig {
    ExperimentConfig {
        planner: planner.parse().unwrap(),
        num_frames: 60,
        max_episode_steps: 20,
        update_every: 10,
        go_right: GoRightConfig {
            length: 4,
            num_indicators: 1,
            prize_mult: 1.0,
        },
        smve: SmveConfig::default().with_horizon(3),
        ..ExperimentConfig::default()
    }
}
