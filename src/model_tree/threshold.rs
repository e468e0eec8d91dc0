//! Streaming candidate thresholds for one leaf and one input dimension
//!
//! Each leaf keeps, per input dimension, a binary search tree over the
//! (rounded) values seen so far. A node stores statistics for the outcomes in
//! its left subtree plus its own key (`stats.left`) and for its right subtree
//! (`stats.right`), and the extrema of its own key plus right subtree. An
//! in-order walk then recovers the exact split statistics of every candidate
//! threshold without rescanning the examples.
//!
//! Nodes of every leaf live in one [`ThresholdArena`]; freed trees return
//! their slots to a free list.

use super::stats::{SplitStats, Stats};

/// Keys are rounded to this many steps per unit to bound memory growth.
const KEY_RESOLUTION: f64 = 1000.0;

pub(crate) fn round_key(value: f64) -> f64 {
    (value * KEY_RESOLUTION).round() / KEY_RESOLUTION
}

#[derive(Debug, Clone)]
struct ThresholdNode {
    threshold: f64,
    left: Option<usize>,
    right: Option<usize>,
    stats: SplitStats,
    here_and_right_min: f64,
    here_and_right_max: f64,
}

impl ThresholdNode {
    fn new(threshold: f64, outcome: f64) -> Self {
        let mut stats = SplitStats::default();
        stats.left.push(outcome);
        Self {
            threshold,
            left: None,
            right: None,
            stats,
            here_and_right_min: outcome,
            here_and_right_max: outcome,
        }
    }
}

/// Best split found in one threshold tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSplit {
    pub threshold: f64,
    pub score: f64,
    pub stats: SplitStats,
}

/// Partial state of the in-order walk: everything strictly left of the
/// current subtree, and the extrema of everything strictly right of it.
#[derive(Debug, Clone, Copy)]
struct Carry {
    left: Stats,
    right_min: f64,
    right_max: f64,
}

enum Frame {
    Enter(usize, Carry),
    Visit(usize, Carry),
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdArena {
    nodes: Vec<ThresholdNode>,
    free: Vec<usize>,
}

impl ThresholdArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live nodes across all trees.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn alloc(&mut self, node: ThresholdNode) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Record `outcome` under `key` in the tree rooted at `*root`.
    pub fn insert(&mut self, root: &mut Option<usize>, key: f64, outcome: f64) {
        let Some(mut current) = *root else {
            *root = Some(self.alloc(ThresholdNode::new(key, outcome)));
            return;
        };

        loop {
            let node = &mut self.nodes[current];
            let go_right = if key < node.threshold {
                node.stats.left.push(outcome);
                false
            } else if key > node.threshold {
                node.stats.right.push(outcome);
                node.here_and_right_min = node.here_and_right_min.min(outcome);
                node.here_and_right_max = node.here_and_right_max.max(outcome);
                true
            } else {
                node.stats.left.push(outcome);
                node.here_and_right_min = node.here_and_right_min.min(outcome);
                node.here_and_right_max = node.here_and_right_max.max(outcome);
                return;
            };

            let child = if go_right { node.right } else { node.left };
            match child {
                Some(child) => current = child,
                None => {
                    let child = self.alloc(ThresholdNode::new(key, outcome));
                    let parent = &mut self.nodes[current];
                    if go_right {
                        parent.right = Some(child);
                    } else {
                        parent.left = Some(child);
                    }
                    return;
                }
            }
        }
    }

    /// Release every node of the tree rooted at `root`.
    pub fn free_tree(&mut self, root: usize) {
        let mut pending = vec![root];
        while let Some(index) = pending.pop() {
            let node = &self.nodes[index];
            pending.extend(node.left);
            pending.extend(node.right);
            self.free.push(index);
        }
    }

    /// Highest-SDR threshold of the tree rooted at `root`.
    ///
    /// Candidates with nothing on their right are skipped; ties keep the
    /// smaller threshold.
    pub fn best_split(&self, root: usize) -> Option<ThresholdSplit> {
        let top = &self.nodes[root];
        let mut total = top.stats.left;
        total.merge(&top.stats.right);

        let mut best: Option<ThresholdSplit> = None;
        let mut stack = vec![Frame::Enter(
            root,
            Carry {
                left: Stats::default(),
                right_min: f64::INFINITY,
                right_max: f64::NEG_INFINITY,
            },
        )];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(index, carry) => {
                    let node = &self.nodes[index];
                    stack.push(Frame::Visit(index, carry));
                    if let Some(left) = node.left {
                        stack.push(Frame::Enter(
                            left,
                            Carry {
                                right_min: carry.right_min.min(node.here_and_right_min),
                                right_max: carry.right_max.max(node.here_and_right_max),
                                ..carry
                            },
                        ));
                    }
                }
                Frame::Visit(index, carry) => {
                    let node = &self.nodes[index];
                    let mut left = carry.left;
                    left.merge(&node.stats.left);

                    let right_count = total.count - left.count;
                    if right_count > 0 {
                        let right = Stats {
                            sum: total.sum - left.sum,
                            sum_sq: total.sum_sq - left.sum_sq,
                            count: right_count,
                            min: carry.right_min.min(node.stats.right.min),
                            max: carry.right_max.max(node.stats.right.max),
                        };
                        let stats = SplitStats { left, right };
                        let score = stats.sdr();
                        if best.is_none_or(|b| score > b.score) {
                            best = Some(ThresholdSplit {
                                threshold: node.threshold,
                                score,
                                stats,
                            });
                        }
                    }

                    if let Some(right) = node.right {
                        stack.push(Frame::Enter(right, Carry { left, ..carry }));
                    }
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(points: &[(f64, f64)]) -> (ThresholdArena, usize) {
        let mut arena = ThresholdArena::new();
        let mut root = None;
        for &(key, outcome) in points {
            arena.insert(&mut root, key, outcome);
        }
        (arena, root.unwrap())
    }

    #[test]
    fn keys_are_rounded_to_thousandths() {
        assert_eq!(round_key(0.12349), 0.123);
        assert_eq!(round_key(-0.0006), -0.001);
    }

    #[test]
    fn best_split_separates_step_function() {
        let points = [
            (0.3, 10.0),
            (-0.5, 0.0),
            (0.8, 10.0),
            (-0.1, 0.0),
            (0.1, 10.0),
            (-0.9, 0.0),
        ];
        let (arena, root) = build(&points);
        let best = arena.best_split(root).unwrap();
        assert_eq!(best.threshold, -0.1);
        assert_eq!(best.stats.left.count, 3);
        assert_eq!(best.stats.right.count, 3);
        assert_eq!(best.stats.left.max, 0.0);
        assert_eq!(best.stats.right.min, 10.0);
        assert_eq!(best.stats.right.max, 10.0);
        assert!((best.score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn split_stats_match_brute_force() {
        let points = [
            (0.5, 1.0),
            (0.2, 4.0),
            (0.9, -2.0),
            (0.2, 3.0),
            (0.7, 8.0),
            (0.1, 0.5),
            (0.6, 2.0),
        ];
        let (arena, root) = build(&points);
        let best = arena.best_split(root).unwrap();

        let mut left = Stats::default();
        let mut right = Stats::default();
        for &(key, outcome) in &points {
            if key <= best.threshold {
                left.push(outcome);
            } else {
                right.push(outcome);
            }
        }
        assert_eq!(best.stats.left.count, left.count);
        assert_eq!(best.stats.right.count, right.count);
        assert_eq!(best.stats.left.min, left.min);
        assert_eq!(best.stats.left.max, left.max);
        assert_eq!(best.stats.right.min, right.min);
        assert_eq!(best.stats.right.max, right.max);
        assert!((best.stats.right.sum - right.sum).abs() < 1e-9);
    }

    #[test]
    fn single_key_has_no_candidate() {
        let (arena, root) = build(&[(1.0, 2.0), (1.0, 3.0)]);
        assert!(arena.best_split(root).is_none());
    }

    #[test]
    fn freed_slots_are_reused() {
        let (mut arena, root) = build(&[(0.0, 1.0), (1.0, 1.0), (-1.0, 1.0)]);
        assert_eq!(arena.len(), 3);
        arena.free_tree(root);
        assert!(arena.is_empty());

        let mut root = None;
        arena.insert(&mut root, 5.0, 1.0);
        assert_eq!(arena.len(), 1);
        assert!(root.unwrap() < 3);
    }
}
