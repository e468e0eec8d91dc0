//! Model capabilities consumed by the planner
//!
//! Models implement the capabilities they can honestly provide:
//!
//! - [`PredictionModel`]: point, bound, distribution and sample queries for a
//!   concrete state and action. Only the point queries are required; the
//!   defaults treat the model as deterministic.
//! - [`BbiPredictionModel`]: sound bound queries over a state interval and a
//!   *set* of candidate actions, needed by interval-aware rollouts.
//! - [`LearnedModel`]: a model that ingests experience and refits on demand.
//!
//! Callers that hold a plain `&dyn PredictionModel` discover the interval
//! capability through [`PredictionModel::as_bbi`].

use crate::{
    rng::SmveRng,
    trajectory::{Trajectory, TrajectoryId},
    types::{Action, Bound, Normal, State, StateBound, point_bound},
};

pub trait PredictionModel {
    /// Expected next state.
    fn state_prediction(&self, premise: &[f64], action: Action) -> State;

    /// Expected reward.
    fn reward_prediction(&self, premise: &[f64], action: Action) -> f64;

    /// Expected termination indicator in `[0, 1]`.
    fn term_prediction(&self, premise: &[f64], action: Action) -> f64;

    /// Point prediction with a per-dimension envelope around it.
    fn state_bounds(&self, premise: &[f64], action: Action) -> (State, StateBound) {
        let prediction = self.state_prediction(premise, action);
        let bounds = point_bound(&prediction);
        (prediction, bounds)
    }

    fn state_distribution(&self, premise: &[f64], action: Action) -> Vec<Normal> {
        self.state_prediction(premise, action)
            .into_iter()
            .map(Normal::deterministic)
            .collect()
    }

    fn state_sample(&self, premise: &[f64], action: Action, _rng: &mut SmveRng) -> State {
        self.state_prediction(premise, action)
    }

    fn reward_bounds(&self, premise: &[f64], action: Action) -> (f64, Bound) {
        let prediction = self.reward_prediction(premise, action);
        (prediction, Bound::point(prediction))
    }

    fn reward_distribution(&self, premise: &[f64], action: Action) -> Normal {
        Normal::deterministic(self.reward_prediction(premise, action))
    }

    fn reward_sample(&self, premise: &[f64], action: Action, _rng: &mut SmveRng) -> f64 {
        self.reward_prediction(premise, action)
    }

    fn term_bounds(&self, premise: &[f64], action: Action) -> (f64, Bound) {
        let prediction = self.term_prediction(premise, action);
        (prediction, Bound::point(prediction))
    }

    fn term_distribution(&self, premise: &[f64], action: Action) -> Normal {
        Normal::deterministic(self.term_prediction(premise, action))
    }

    fn term_sample(&self, premise: &[f64], action: Action, _rng: &mut SmveRng) -> bool {
        self.term_prediction(premise, action) > 0.5
    }

    /// The interval capability, when this model has it.
    fn as_bbi(&self) -> Option<&dyn BbiPredictionModel> {
        None
    }
}

/// Sound interval queries over a state bound and an action set.
///
/// Every returned bound must contain the corresponding prediction for every
/// concrete state inside `premise` and every action in `actions`.
pub trait BbiPredictionModel: PredictionModel {
    fn state_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> StateBound;

    fn reward_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Bound;

    fn term_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Bound;
}

/// A model trained online from trajectory steps.
pub trait LearnedModel: PredictionModel {
    /// Ingest step `t` of `trajectory`.
    fn add_example(&mut self, trajectory: &Trajectory, t: usize);

    /// Release anything kept for a discarded trajectory.
    fn remove_trajectory(&mut self, id: TrajectoryId);

    /// Refit from the examples seen so far.
    fn update_predictions(&mut self);
}
