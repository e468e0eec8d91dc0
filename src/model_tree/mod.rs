//! Incremental regression tree for one scalar target
//!
//! [`FastIncModelTree`] grows a regression tree from a stream of
//! `(premise, action, outcome)` examples. Every leaf keeps running outcome
//! statistics plus streaming candidate splits (one threshold tree per input
//! dimension and one two-way accumulator per action). [`FastIncModelTree::split`]
//! commits a leaf's best candidate once a Hoeffding-style bound says it is
//! reliably better than the runner-up.
//!
//! Decision nodes are never removed, so they live in a plain vector addressed
//! by index; threshold trees are discarded on commit and recycle their slots
//! through [`threshold::ThresholdArena`].

pub mod discriminator;
pub mod example;
pub mod stats;
pub mod threshold;

pub use discriminator::{Discriminator, Verdict};
pub use example::ExampleTarget;
pub use stats::{SplitStats, Stats};

use tracing::{debug, trace};

use crate::{
    config::SmveConfig,
    error::{Error, Result},
    rng::SmveRng,
    types::{Action, Bound, Normal},
};
use threshold::{ThresholdArena, round_key};

const ROOT: usize = 0;

/// Streaming split candidates of a leaf
#[derive(Debug, Clone)]
struct Candidates {
    /// Examples routed here since the last split evaluation
    pending: usize,
    thresholds: Vec<Option<usize>>,
    /// Per action: left = every other action, right = this action
    action_splits: Vec<SplitStats>,
}

impl Candidates {
    fn new(in_dim: usize, num_actions: usize) -> Self {
        Self {
            pending: 0,
            thresholds: vec![None; in_dim],
            action_splits: vec![SplitStats::default(); num_actions],
        }
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(Candidates),
    Split {
        discriminator: Discriminator,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct DecisionNode {
    stats: Stats,
    kind: NodeKind,
}

/// Best and second-best candidate scores seen so far
struct Ranking {
    best: Option<(Discriminator, f64, SplitStats)>,
    runner_up: Option<f64>,
}

impl Ranking {
    fn new() -> Self {
        Self {
            best: None,
            runner_up: None,
        }
    }

    fn offer(&mut self, discriminator: Discriminator, score: f64, stats: SplitStats) {
        match self.best {
            Some((_, best, _)) if score <= best => {
                if self.runner_up.is_none_or(|r| score > r) {
                    self.runner_up = Some(score);
                }
            }
            Some((_, best, _)) => {
                self.runner_up = Some(best);
                self.best = Some((discriminator, score, stats));
            }
            None => self.best = Some((discriminator, score, stats)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FastIncModelTree {
    in_dim: usize,
    num_actions: usize,
    nodes: Vec<DecisionNode>,
    thresholds: ThresholdArena,
    num_leaves: usize,
    max_leaves: usize,
    confidence: f64,
    tie_threshold: f64,
}

impl FastIncModelTree {
    /// An untrained tree: a single empty leaf.
    pub fn new(in_dim: usize, num_actions: usize, config: &SmveConfig) -> Result<Self> {
        config.validate()?;
        if num_actions == 0 {
            return Err(Error::InvalidConfiguration {
                message: "model tree needs at least one action".to_string(),
            });
        }
        Ok(Self {
            in_dim,
            num_actions,
            nodes: vec![DecisionNode {
                stats: Stats::default(),
                kind: NodeKind::Leaf(Candidates::new(in_dim, num_actions)),
            }],
            thresholds: ThresholdArena::new(),
            num_leaves: 1,
            max_leaves: config.max_leaves,
            confidence: config.split_confidence,
            tie_threshold: config.tie_threshold,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Committed splits, in the order they were made.
    pub fn splits(&self) -> impl Iterator<Item = &Discriminator> + '_ {
        self.nodes.iter().filter_map(|node| match &node.kind {
            NodeKind::Split { discriminator, .. } => Some(discriminator),
            NodeKind::Leaf(_) => None,
        })
    }

    fn accepts_splits(&self) -> bool {
        self.num_leaves < self.max_leaves
    }

    /// Route one example to its leaf and update the leaf's statistics.
    ///
    /// Only the first `in_dim` entries of `premise` are read.
    pub fn add_example(&mut self, premise: &[f64], action: Action, outcome: f64) {
        debug_assert!(premise.len() >= self.in_dim, "premise dimension");
        let leaf = self.leaf_index(premise, action);
        let accepting = self.accepts_splits();

        let node = &mut self.nodes[leaf];
        node.stats.push(outcome);
        trace!(
            "leaf {} updated: outcome = {} min = {} max = {}",
            leaf, outcome, node.stats.min, node.stats.max
        );

        let NodeKind::Leaf(candidates) = &mut node.kind else {
            return;
        };
        candidates.pending += 1;
        if !accepting {
            return;
        }
        for (dim, root) in candidates.thresholds.iter_mut().enumerate() {
            self.thresholds.insert(root, round_key(premise[dim]), outcome);
        }
        for (a, split) in candidates.action_splits.iter_mut().enumerate() {
            if a == action {
                split.right.push(outcome);
            } else {
                split.left.push(outcome);
            }
        }
    }

    /// Evaluate every leaf that saw at least two examples since its last
    /// evaluation and commit the splits that pass the confidence test.
    pub fn split(&mut self) {
        if self.accepts_splits() {
            for leaf in self.leaves_in_order() {
                self.try_split(leaf);
            }
        }
        debug!("num leaves: {}", self.num_leaves);
    }

    fn leaves_in_order(&self) -> Vec<usize> {
        let mut leaves = Vec::with_capacity(self.num_leaves);
        let mut pending = vec![ROOT];
        while let Some(index) = pending.pop() {
            match self.nodes[index].kind {
                NodeKind::Leaf(_) => leaves.push(index),
                NodeKind::Split { left, right, .. } => {
                    pending.push(right);
                    pending.push(left);
                }
            }
        }
        leaves
    }

    fn try_split(&mut self, index: usize) {
        if !self.accepts_splits() {
            return;
        }
        let count = self.nodes[index].stats.count;
        let NodeKind::Leaf(candidates) = &mut self.nodes[index].kind else {
            return;
        };
        if candidates.pending < 2 {
            trace!("leaf {} not ready to split: {} new examples", index, candidates.pending);
            return;
        }
        candidates.pending = 0;

        // Actions are offered first so that an action split wins exact ties.
        let mut ranking = Ranking::new();
        for (a, split) in candidates.action_splits.iter().enumerate() {
            if split.left.count > 0 && split.right.count > 0 {
                ranking.offer(Discriminator::Action(a), split.sdr(), *split);
            }
        }
        for (dim, root) in candidates.thresholds.iter().enumerate() {
            if let Some(best) = root.and_then(|root| self.thresholds.best_split(root)) {
                ranking.offer(
                    Discriminator::Threshold {
                        dim,
                        threshold: best.threshold,
                    },
                    best.score,
                    best.stats,
                );
            }
        }

        let Some((discriminator, score, stats)) = ranking.best else {
            return;
        };
        if score <= 0.0 {
            return;
        }
        let runner_up = ranking.runner_up.unwrap_or(0.0);
        let ratio = runner_up / score;
        let bound = ((1.0 / self.confidence).ln() / (2.0 * count as f64)).sqrt();
        debug!(
            "leaf {}: best {} score = {} runner-up = {} ratio = {} bound = {} count = {}",
            index, discriminator, score, runner_up, ratio, bound, count
        );
        if ratio + bound >= 1.0 && bound >= self.tie_threshold {
            return;
        }

        let roots: Vec<usize> = candidates.thresholds.iter().flatten().copied().collect();
        for root in roots {
            self.thresholds.free_tree(root);
        }

        let left = self.push_leaf(stats.left);
        let right = self.push_leaf(stats.right);
        self.nodes[index].kind = NodeKind::Split {
            discriminator,
            left,
            right,
        };
        self.num_leaves += 1;
        debug!("split leaf {} on {}", index, discriminator);
    }

    fn push_leaf(&mut self, stats: Stats) -> usize {
        self.nodes.push(DecisionNode {
            stats,
            kind: NodeKind::Leaf(Candidates::new(self.in_dim, self.num_actions)),
        });
        self.nodes.len() - 1
    }

    fn leaf_index(&self, premise: &[f64], action: Action) -> usize {
        let mut index = ROOT;
        while let NodeKind::Split {
            discriminator,
            left,
            right,
        } = &self.nodes[index].kind
        {
            index = if discriminator.is_right(premise, action) {
                *right
            } else {
                *left
            };
        }
        index
    }

    fn leaf_stats(&self, premise: &[f64], action: Action) -> &Stats {
        &self.nodes[self.leaf_index(premise, action)].stats
    }

    /// Mean outcome of the leaf `(premise, action)` falls into.
    pub fn prediction(&self, premise: &[f64], action: Action) -> f64 {
        self.leaf_stats(premise, action).mean()
    }

    /// Mean outcome and the leaf's observed `[min, max]`.
    pub fn bounds(&self, premise: &[f64], action: Action) -> (f64, Bound) {
        let stats = self.leaf_stats(premise, action);
        (stats.mean(), stats.bound())
    }

    pub fn distribution(&self, premise: &[f64], action: Action) -> Normal {
        self.leaf_stats(premise, action).distribution()
    }

    /// Gaussian draw from the leaf's distribution, or its mean when the
    /// variance is negligible.
    pub fn sample(&self, premise: &[f64], action: Action, rng: &mut SmveRng) -> f64 {
        let dist = self.distribution(premise, action);
        if dist.var > 0.0 {
            rng.gaussian(dist.mean, dist.var.sqrt())
        } else {
            dist.mean
        }
    }

    /// Envelope of every leaf reachable from a state in `premise` under an
    /// action in `actions`.
    pub fn bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Bound {
        self.bounds_over_from(ROOT, premise, actions)
    }

    fn bounds_over_from(&self, index: usize, premise: &[Bound], actions: &[Action]) -> Bound {
        let node = &self.nodes[index];
        let NodeKind::Split {
            discriminator,
            left,
            right,
        } = &node.kind
        else {
            return node.stats.bound();
        };

        match discriminator.verdict(premise, actions) {
            Verdict::Left => self.bounds_over_from(*left, premise, actions),
            Verdict::Right => self.bounds_over_from(*right, premise, actions),
            Verdict::Unknown => {
                let mut left_premise = premise.to_vec();
                let mut left_actions = actions.to_vec();
                discriminator.narrow_left(&mut left_premise, &mut left_actions);
                let left_bound = self.bounds_over_from(*left, &left_premise, &left_actions);

                let mut right_premise = premise.to_vec();
                let mut right_actions = actions.to_vec();
                discriminator.narrow_right(&mut right_premise, &mut right_actions);
                let right_bound = self.bounds_over_from(*right, &right_premise, &right_actions);

                trace!(
                    "unknown at {}: left {} right {}",
                    discriminator, left_bound, right_bound
                );
                left_bound.union(&right_bound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmveConfig {
        SmveConfig::default()
    }

    #[test]
    fn empty_tree_predicts_zero_with_unbounded_envelope() {
        let tree = FastIncModelTree::new(2, 2, &config()).unwrap();
        assert_eq!(tree.prediction(&[0.0, 0.0], 1), 0.0);
        let (mean, bound) = tree.bounds(&[0.0, 0.0], 1);
        assert_eq!(mean, 0.0);
        assert_eq!(bound, Bound::unbounded());
        assert_eq!(tree.distribution(&[0.0, 0.0], 0), Normal::new(0.0, 0.0));
    }

    #[test]
    fn step_function_splits_near_zero() {
        let mut tree = FastIncModelTree::new(1, 1, &config()).unwrap();
        let mut rng = SmveRng::seed_from_u64(17);
        for _ in 0..300 {
            let x = rng.uniform() * 2.0 - 1.0;
            tree.add_example(&[x], 0, if x > 0.0 { 10.0 } else { 0.0 });
        }
        tree.split();

        assert_eq!(tree.num_leaves(), 2);
        match tree.splits().next() {
            Some(Discriminator::Threshold { dim, threshold }) => {
                assert_eq!(*dim, 0);
                assert!(threshold.abs() < 0.1, "threshold {threshold}");
            }
            other => panic!("unexpected split {other:?}"),
        }
        assert!(tree.prediction(&[-0.5], 0) < 0.5);
        assert!(tree.prediction(&[0.5], 0) > 9.5);
    }

    #[test]
    fn near_tied_action_splits_wait_for_tie_threshold() {
        let mut tree = FastIncModelTree::new(1, 2, &config()).unwrap();
        let add = |tree: &mut FastIncModelTree, n: usize| {
            for i in 0..n {
                let a = i % 2;
                tree.add_example(&[0.0], a, 5.0 * a as f64);
            }
        };

        // both action splits score the same, so only the tie rule can commit
        add(&mut tree, 100);
        tree.split();
        assert_eq!(tree.num_leaves(), 1);

        add(&mut tree, 600);
        tree.split();
        assert_eq!(tree.num_leaves(), 2);
        assert_eq!(tree.splits().next(), Some(&Discriminator::Action(0)));
        assert_eq!(tree.prediction(&[0.0], 0), 0.0);
        assert_eq!(tree.prediction(&[0.0], 1), 5.0);
    }

    #[test]
    fn leaf_budget_stops_growth() {
        let config = config().with_max_leaves(1);
        let mut tree = FastIncModelTree::new(1, 1, &config).unwrap();
        for i in 0..200 {
            let x = i as f64 / 100.0 - 1.0;
            tree.add_example(&[x], 0, if x > 0.0 { 1.0 } else { 0.0 });
        }
        tree.split();
        assert_eq!(tree.num_leaves(), 1);
        assert!(tree.thresholds.is_empty());
    }

    #[test]
    fn leaf_needs_two_new_examples_between_evaluations() {
        let mut tree = FastIncModelTree::new(1, 1, &config()).unwrap();
        tree.add_example(&[-1.0], 0, 0.0);
        tree.split();
        assert_eq!(tree.num_leaves(), 1);

        tree.add_example(&[1.0], 0, 10.0);
        tree.split();
        // two examples, a perfect split and no runner-up
        assert_eq!(tree.num_leaves(), 2);
    }

    #[test]
    fn committed_split_frees_threshold_trees() {
        let mut tree = FastIncModelTree::new(2, 1, &config()).unwrap();
        tree.add_example(&[-1.0, 3.0], 0, 0.0);
        tree.add_example(&[1.0, 3.0], 0, 10.0);
        assert_eq!(tree.thresholds.len(), 3);
        tree.split();
        assert_eq!(tree.num_leaves(), 2);
        assert!(tree.thresholds.is_empty());
    }

    #[test]
    fn distribution_and_sample_follow_leaf_statistics() {
        let mut tree = FastIncModelTree::new(1, 1, &config()).unwrap();
        tree.add_example(&[0.0], 0, 1.0);
        tree.add_example(&[0.0], 0, 3.0);
        let dist = tree.distribution(&[0.0], 0);
        assert_eq!(dist.mean, 2.0);
        assert!((dist.var - 2.0).abs() < 1e-12);

        let mut constant = FastIncModelTree::new(1, 1, &config()).unwrap();
        constant.add_example(&[0.0], 0, 4.0);
        constant.add_example(&[0.0], 0, 4.0);
        let mut rng = SmveRng::seed_from_u64(5);
        assert_eq!(constant.sample(&[0.0], 0, &mut rng), 4.0);
    }

    #[test]
    fn straddling_query_unions_both_children() {
        let mut tree = FastIncModelTree::new(1, 2, &config()).unwrap();
        tree.add_example(&[-1.0], 0, 0.0);
        tree.add_example(&[-0.5], 0, 1.0);
        tree.add_example(&[0.5], 0, 10.0);
        tree.add_example(&[1.0], 0, 11.0);
        tree.split();
        assert_eq!(tree.num_leaves(), 2);

        let left_only = tree.bounds_over(&[Bound::new(-2.0, -0.6)], &[0, 1]);
        assert_eq!(left_only, Bound::new(0.0, 1.0));
        let both = tree.bounds_over(&[Bound::new(-2.0, 2.0)], &[0]);
        assert_eq!(both, Bound::new(0.0, 11.0));
    }
}
