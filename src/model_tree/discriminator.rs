//! Routing tests at committed tree nodes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Action, Bound};

/// Three-valued answer for interval queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Left,
    Right,
    /// The query straddles the test; both branches are reachable
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Discriminator {
    /// Right iff `state[dim] > threshold`
    Threshold { dim: usize, threshold: f64 },
    /// Right iff the action equals the stored one
    Action(Action),
}

impl Discriminator {
    pub fn is_right(&self, state: &[f64], action: Action) -> bool {
        match *self {
            Discriminator::Threshold { dim, threshold } => state[dim] > threshold,
            Discriminator::Action(a) => action == a,
        }
    }

    pub fn verdict(&self, bound: &[Bound], actions: &[Action]) -> Verdict {
        match *self {
            Discriminator::Threshold { dim, threshold } => {
                if bound[dim].lower > threshold {
                    Verdict::Right
                } else if bound[dim].upper <= threshold {
                    Verdict::Left
                } else {
                    Verdict::Unknown
                }
            }
            Discriminator::Action(a) => {
                if actions == [a] {
                    Verdict::Right
                } else if actions.contains(&a) {
                    Verdict::Unknown
                } else {
                    Verdict::Left
                }
            }
        }
    }

    /// Restrict a query to the part that reaches the left child.
    pub fn narrow_left(&self, bound: &mut [Bound], actions: &mut Vec<Action>) {
        match *self {
            Discriminator::Threshold { dim, threshold } => {
                bound[dim].upper = bound[dim].upper.min(threshold);
            }
            Discriminator::Action(a) => actions.retain(|&other| other != a),
        }
    }

    /// Restrict a query to the part that reaches the right child.
    pub fn narrow_right(&self, bound: &mut [Bound], actions: &mut Vec<Action>) {
        match *self {
            Discriminator::Threshold { dim, threshold } => {
                bound[dim].lower = bound[dim].lower.max(threshold);
            }
            Discriminator::Action(a) => {
                actions.clear();
                actions.push(a);
            }
        }
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discriminator::Threshold { dim, threshold } => {
                write!(f, "[Property {dim} > {threshold}]")
            }
            Discriminator::Action(a) => write!(f, "[Action is {a}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_routes_strictly_greater_right() {
        let d = Discriminator::Threshold {
            dim: 1,
            threshold: 0.5,
        };
        assert!(d.is_right(&[0.0, 0.6], 0));
        assert!(!d.is_right(&[0.0, 0.5], 0));
    }

    #[test]
    fn threshold_verdicts_and_narrowing() {
        let d = Discriminator::Threshold {
            dim: 0,
            threshold: 1.0,
        };
        assert_eq!(d.verdict(&[Bound::new(1.5, 2.0)], &[0]), Verdict::Right);
        assert_eq!(d.verdict(&[Bound::new(0.0, 1.0)], &[0]), Verdict::Left);
        assert_eq!(d.verdict(&[Bound::new(0.0, 2.0)], &[0]), Verdict::Unknown);

        let mut actions = vec![0];
        let mut left = vec![Bound::new(0.0, 2.0)];
        d.narrow_left(&mut left, &mut actions);
        assert_eq!(left[0], Bound::new(0.0, 1.0));

        let mut right = vec![Bound::new(0.0, 2.0)];
        d.narrow_right(&mut right, &mut actions);
        assert_eq!(right[0], Bound::new(1.0, 2.0));
    }

    #[test]
    fn action_verdicts_and_narrowing() {
        let d = Discriminator::Action(2);
        assert_eq!(d.verdict(&[], &[2]), Verdict::Right);
        assert_eq!(d.verdict(&[], &[0, 2]), Verdict::Unknown);
        assert_eq!(d.verdict(&[], &[0, 1]), Verdict::Left);

        let mut actions = vec![0, 2, 1];
        d.narrow_left(&mut [], &mut actions);
        assert_eq!(actions, vec![0, 1]);

        let mut actions = vec![0, 2, 1];
        d.narrow_right(&mut [], &mut actions);
        assert_eq!(actions, vec![2]);
    }

    #[test]
    fn display_names_the_test() {
        assert_eq!(Discriminator::Action(3).to_string(), "[Action is 3]");
        let d = Discriminator::Threshold {
            dim: 4,
            threshold: 0.25,
        };
        assert_eq!(d.to_string(), "[Property 4 > 0.25]");
    }
}
