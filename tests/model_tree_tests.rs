//! Incremental regression trees and the tree-backed dynamics model

mod common;

use common::{Corridor, LEFT, RIGHT, corridor_episode};
use proptest::prelude::*;
use smve::{
    Bound, SmveConfig, SmveRng, Trajectory,
    model_tree::{Discriminator, FastIncModelTree},
    models::DecisionTreeModel,
    ports::{LearnedModel, PredictionModel},
};

const EPS: f64 = 1e-9;

/// Premise values on a grid of eighths, so that every value is its own
/// rounded split key.
fn eighth() -> impl Strategy<Value = f64> {
    (-16i32..=16).prop_map(|i| i as f64 / 8.0)
}

fn examples() -> impl Strategy<Value = Vec<(f64, f64, usize, f64)>> {
    prop::collection::vec((eighth(), eighth(), 0usize..2, -10.0..10.0f64), 1..120)
}

fn grow(examples: &[(f64, f64, usize, f64)], every: usize) -> FastIncModelTree {
    let mut tree = FastIncModelTree::new(2, 2, &SmveConfig::default()).unwrap();
    for (i, &(x, y, action, outcome)) in examples.iter().enumerate() {
        tree.add_example(&[x, y], action, outcome);
        if (i + 1) % every == 0 {
            tree.split();
        }
    }
    tree.split();
    tree
}

#[test]
fn test_step_outcome_converges_to_child_means() {
    let mut tree = FastIncModelTree::new(1, 1, &SmveConfig::default()).unwrap();
    let mut rng = SmveRng::seed_from_u64(42);
    for i in 0..2000 {
        let x = rng.uniform() * 2.0 - 1.0;
        tree.add_example(&[x], 0, if x > 0.0 { 10.0 } else { 0.0 });
        if i >= 399 && (i + 1) % 100 == 0 {
            tree.split();
        }
    }

    match tree.splits().next() {
        Some(Discriminator::Threshold { dim, threshold }) => {
            assert_eq!(*dim, 0);
            assert!(threshold.abs() < 0.1, "first split at {threshold}");
        }
        other => panic!("unexpected first split {other:?}"),
    }
    assert!(tree.prediction(&[-0.5], 0).abs() < 0.5);
    assert!((tree.prediction(&[0.5], 0) - 10.0).abs() < 0.5);
}

#[test]
fn test_invalid_confidence_is_rejected() {
    let config = SmveConfig::default().with_split_confidence(0.0);
    assert!(FastIncModelTree::new(1, 1, &config).is_err());
    assert!(DecisionTreeModel::new(1, 1, &config).is_err());
}

#[test]
fn test_leaf_budget_caps_growth() {
    let config = SmveConfig::default().with_max_leaves(3);
    let mut tree = FastIncModelTree::new(1, 2, &config).unwrap();
    for round in 0..10 {
        for i in 0..100 {
            let x = i as f64 / 50.0 - 1.0;
            let action = (i + round) % 2;
            tree.add_example(&[x], action, x.signum() * 5.0 + action as f64 * 20.0);
        }
        tree.split();
    }
    assert_eq!(tree.num_leaves(), 3);
}

#[test]
fn test_tree_model_learns_corridor_moves() {
    let corridor = Corridor { cells: 5 };
    let config = SmveConfig::default().with_predict_change(true);
    let mut model = DecisionTreeModel::new(1, 2, &config).unwrap();
    let mut rng = SmveRng::seed_from_u64(8);
    for _ in 0..40 {
        let trajectory: Trajectory = corridor_episode(&corridor, 60, |_| rng.index(2));
        for t in 0..trajectory.len() {
            model.add_example(&trajectory, t);
        }
        model.update_predictions();
    }

    assert!(model.leaf_counts().iter().all(|&n| n >= 1));
    let moved = model.state_prediction(&[2.5], RIGHT)[0];
    assert!((moved - 3.5).abs() < 0.5, "moved to {moved}");
    let back = model.state_prediction(&[2.5], LEFT)[0];
    assert!((back - 1.5).abs() < 0.5, "moved back to {back}");
    assert!(model.reward_prediction(&[0.5], LEFT).abs() < 0.5);
}

proptest! {
    #[test]
    fn leaf_bounds_contain_routed_outcomes(examples in examples(), every in 1usize..30) {
        let tree = grow(&examples, every);
        for &(x, y, action, outcome) in &examples {
            let (_, bound) = tree.bounds(&[x, y], action);
            prop_assert!(bound.contains(outcome), "{} outside {}", outcome, bound);
        }
    }

    #[test]
    fn interval_queries_cover_point_predictions(
        examples in examples(),
        every in 1usize..30,
        (a, b, c, d) in (eighth(), eighth(), eighth(), eighth()),
        (u, v) in (0.0..=1.0f64, 0.0..=1.0f64),
        actions in prop::sample::select(vec![vec![0], vec![1], vec![0, 1]]),
    ) {
        let tree = grow(&examples, every);
        let premise = [Bound::new(a, b), Bound::new(c, d)];
        let point = [
            premise[0].lower + u * premise[0].width(),
            premise[1].lower + v * premise[1].width(),
        ];
        let over = tree.bounds_over(&premise, &actions);
        for &action in &actions {
            let (mean, leaf) = tree.bounds(&point, action);
            prop_assert!(over.lower <= leaf.lower && leaf.upper <= over.upper);
            prop_assert!(over.lower - EPS <= mean && mean <= over.upper + EPS);
        }
    }
}
