//! Learned dynamics model built from one regression tree per output
//!
//! Each modelled state dimension, the reward and the termination flag get
//! their own [`FastIncModelTree`]. All trees read the first `state_dim`
//! entries of the premise, so observations may carry extra trailing
//! dimensions the model ignores.

use tracing::debug;

use crate::{
    config::SmveConfig,
    error::{Error, Result},
    model_tree::{ExampleTarget, FastIncModelTree},
    ports::{BbiPredictionModel, LearnedModel, PredictionModel},
    rng::SmveRng,
    trajectory::{Trajectory, TrajectoryId},
    types::{Action, Bound, Normal, State, StateBound},
};

#[derive(Debug, Clone)]
pub struct DecisionTreeModel {
    state_trees: Vec<FastIncModelTree>,
    reward_tree: FastIncModelTree,
    term_tree: FastIncModelTree,
    /// State trees learn `result - premise` instead of `result`
    predict_change: bool,
}

impl DecisionTreeModel {
    pub fn new(state_dim: usize, num_actions: usize, config: &SmveConfig) -> Result<Self> {
        if state_dim == 0 {
            return Err(Error::InvalidConfiguration {
                message: "decision tree model needs at least one state dimension".to_string(),
            });
        }
        let tree = || FastIncModelTree::new(state_dim, num_actions, config);
        Ok(Self {
            state_trees: (0..state_dim).map(|_| tree()).collect::<Result<_>>()?,
            reward_tree: tree()?,
            term_tree: tree()?,
            predict_change: config.predict_change,
        })
    }

    pub fn state_dim(&self) -> usize {
        self.state_trees.len()
    }

    /// Leaf count of every tree: state dimensions, then reward, then termination.
    pub fn leaf_counts(&self) -> Vec<usize> {
        self.trees().map(FastIncModelTree::num_leaves).collect()
    }

    fn trees(&self) -> impl Iterator<Item = &FastIncModelTree> + '_ {
        self.state_trees
            .iter()
            .chain([&self.reward_tree, &self.term_tree])
    }

    fn state_target(&self, dim: usize) -> ExampleTarget {
        if self.predict_change {
            ExampleTarget::StateChange(dim)
        } else {
            ExampleTarget::StateDim(dim)
        }
    }

    /// Offset added to a state tree's output to recover the next state.
    fn base(&self, premise: &[f64], dim: usize) -> f64 {
        if self.predict_change { premise[dim] } else { 0.0 }
    }
}

impl PredictionModel for DecisionTreeModel {
    fn state_prediction(&self, premise: &[f64], action: Action) -> State {
        self.state_trees
            .iter()
            .enumerate()
            .map(|(i, tree)| tree.prediction(premise, action) + self.base(premise, i))
            .collect()
    }

    fn reward_prediction(&self, premise: &[f64], action: Action) -> f64 {
        self.reward_tree.prediction(premise, action)
    }

    fn term_prediction(&self, premise: &[f64], action: Action) -> f64 {
        self.term_tree.prediction(premise, action)
    }

    fn state_bounds(&self, premise: &[f64], action: Action) -> (State, StateBound) {
        self.state_trees
            .iter()
            .enumerate()
            .map(|(i, tree)| {
                let (pred, bound) = tree.bounds(premise, action);
                let base = self.base(premise, i);
                (pred + base, bound.shift(base))
            })
            .unzip()
    }

    fn state_distribution(&self, premise: &[f64], action: Action) -> Vec<Normal> {
        self.state_trees
            .iter()
            .enumerate()
            .map(|(i, tree)| {
                let dist = tree.distribution(premise, action);
                Normal::new(dist.mean + self.base(premise, i), dist.var)
            })
            .collect()
    }

    fn state_sample(&self, premise: &[f64], action: Action, rng: &mut SmveRng) -> State {
        self.state_trees
            .iter()
            .enumerate()
            .map(|(i, tree)| tree.sample(premise, action, rng) + self.base(premise, i))
            .collect()
    }

    fn reward_bounds(&self, premise: &[f64], action: Action) -> (f64, Bound) {
        self.reward_tree.bounds(premise, action)
    }

    fn reward_distribution(&self, premise: &[f64], action: Action) -> Normal {
        self.reward_tree.distribution(premise, action)
    }

    fn reward_sample(&self, premise: &[f64], action: Action, rng: &mut SmveRng) -> f64 {
        self.reward_tree.sample(premise, action, rng)
    }

    fn term_bounds(&self, premise: &[f64], action: Action) -> (f64, Bound) {
        self.term_tree.bounds(premise, action)
    }

    fn term_distribution(&self, premise: &[f64], action: Action) -> Normal {
        self.term_tree.distribution(premise, action)
    }

    fn term_sample(&self, premise: &[f64], action: Action, rng: &mut SmveRng) -> bool {
        self.term_tree.sample(premise, action, rng) > 0.5
    }

    fn as_bbi(&self) -> Option<&dyn BbiPredictionModel> {
        Some(self)
    }
}

impl BbiPredictionModel for DecisionTreeModel {
    fn state_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> StateBound {
        self.state_trees
            .iter()
            .enumerate()
            .map(|(i, tree)| {
                let bound = tree.bounds_over(premise, actions);
                if self.predict_change {
                    Bound {
                        lower: bound.lower + premise[i].lower,
                        upper: bound.upper + premise[i].upper,
                    }
                } else {
                    bound
                }
            })
            .collect()
    }

    fn reward_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Bound {
        self.reward_tree.bounds_over(premise, actions)
    }

    fn term_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Bound {
        self.term_tree.bounds_over(premise, actions)
    }
}

impl LearnedModel for DecisionTreeModel {
    fn add_example(&mut self, trajectory: &Trajectory, t: usize) {
        let premise = &trajectory.premise_state(t)[..self.state_dim()];
        let action = trajectory.action(t);

        for dim in 0..self.state_trees.len() {
            let outcome = self.state_target(dim).outcome(trajectory, t);
            self.state_trees[dim].add_example(premise, action, outcome);
        }
        self.reward_tree
            .add_example(premise, action, ExampleTarget::Reward.outcome(trajectory, t));
        self.term_tree
            .add_example(premise, action, ExampleTarget::Termination.outcome(trajectory, t));
    }

    /// Trees keep only aggregated statistics, so nothing refers to the
    /// trajectory.
    fn remove_trajectory(&mut self, _id: TrajectoryId) {}

    fn update_predictions(&mut self) {
        for (i, tree) in self
            .state_trees
            .iter_mut()
            .chain([&mut self.reward_tree, &mut self.term_tree])
            .enumerate()
        {
            debug!("model update {}", i);
            tree.split();
        }
    }
}
