//! Linear ensemble of value functions
//!
//! Used to decompose a value function over subsets of the state dimensions,
//! e.g. one fine tile coder over every dimension plus coarser ones that ignore
//! some dimensions.

use crate::{
    error::{Error, Result},
    ports::QFunction,
    types::{Action, Bound},
};

pub struct SumQ {
    parts: Vec<Box<dyn QFunction>>,
    num_actions: usize,
}

impl SumQ {
    pub fn new(parts: Vec<Box<dyn QFunction>>, num_actions: usize) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::InvalidConfiguration {
                message: "SumQ needs at least one component".to_string(),
            });
        }
        if let Some(part) = parts.iter().find(|p| p.num_actions() != num_actions) {
            return Err(Error::DimensionMismatch {
                expected: num_actions,
                got: part.num_actions(),
                context: "SumQ component action count".to_string(),
            });
        }
        Ok(Self { parts, num_actions })
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl std::fmt::Debug for SumQ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SumQ")
            .field("parts", &self.parts.len())
            .field("num_actions", &self.num_actions)
            .finish()
    }
}

impl QFunction for SumQ {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn q(&self, state: &[f64], action: Action) -> f64 {
        self.parts.iter().map(|p| p.q(state, action)).sum()
    }

    fn all_action_qs(&self, state: &[f64]) -> Vec<f64> {
        let mut values = vec![0.0; self.num_actions];
        for part in &self.parts {
            for (value, q) in values.iter_mut().zip(part.all_action_qs(state)) {
                *value += q;
            }
        }
        values
    }

    fn q_bound(&self, state_bound: &[Bound], action: Action) -> Bound {
        self.parts
            .iter()
            .map(|p| p.q_bound(state_bound, action))
            .fold(Bound::point(0.0), |acc, b| acc + b)
    }

    fn all_action_q_bounds(&self, state_bound: &[Bound]) -> Vec<Bound> {
        let mut bounds = vec![Bound::point(0.0); self.num_actions];
        for part in &self.parts {
            for (total, b) in bounds.iter_mut().zip(part.all_action_q_bounds(state_bound)) {
                *total += b;
            }
        }
        bounds
    }

    fn update_q(&mut self, state: &[f64], action: Action, change: f64) {
        for part in &mut self.parts {
            part.update_q(state, action, change);
        }
    }

    /// Sum of the components' normalizers.
    fn step_size_normalizer(&self) -> f64 {
        self.parts.iter().map(|p| p.step_size_normalizer()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{q_function::TileCodingQFunction, rng::SmveRng, types::point_bound};

    fn ensemble() -> SumQ {
        let mut rng = SmveRng::seed_from_u64(9);
        let bounds = vec![Bound::new(0.0, 1.0), Bound::new(0.0, 1.0)];
        let full = TileCodingQFunction::new(bounds.clone(), vec![4, 4], 2, 3, &mut rng).unwrap();
        let first_only = TileCodingQFunction::new(bounds.clone(), vec![4, 1], 1, 3, &mut rng).unwrap();
        let second_only = TileCodingQFunction::new(bounds, vec![1, 4], 1, 3, &mut rng).unwrap();
        let parts: Vec<Box<dyn QFunction>> = vec![
            Box::new(full) as Box<dyn QFunction>,
            Box::new(first_only),
            Box::new(second_only),
        ];
        SumQ::new(parts, 3).unwrap()
    }

    #[test]
    fn values_and_normalizers_add_up() {
        let mut q = ensemble();
        assert_eq!(q.step_size_normalizer(), 4.0);
        q.update_q(&[0.4, 0.6], 2, 0.5);
        // 2 + 1 + 1 tilings each received the full change
        assert!((q.q(&[0.4, 0.6], 2) - 2.0).abs() < 1e-12);
        assert_eq!(q.all_action_qs(&[0.4, 0.6])[2], q.q(&[0.4, 0.6], 2));
    }

    #[test]
    fn point_bounds_match_point_values() {
        let mut q = ensemble();
        q.update_q(&[0.1, 0.2], 0, -1.0);
        q.update_q(&[0.8, 0.2], 0, 2.0);
        for state in [[0.1, 0.2], [0.8, 0.2], [0.5, 0.9]] {
            let value = q.q(&state, 0);
            let bound = q.q_bound(&point_bound(&state), 0);
            assert!((bound.lower - value).abs() < 1e-9);
            assert!(bound.width().abs() < 1e-9);
        }
    }

    #[test]
    fn mismatched_action_counts_are_rejected() {
        let mut rng = SmveRng::seed_from_u64(1);
        let part = TileCodingQFunction::new(vec![Bound::new(0.0, 1.0)], vec![2], 1, 2, &mut rng).unwrap();
        let parts: Vec<Box<dyn QFunction>> = vec![Box::new(part)];
        assert!(SumQ::new(parts, 3).is_err());
    }
}
