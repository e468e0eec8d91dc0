//! Per-update record of a rollout and its diagnostics

use crate::types::State;

/// Everything one update computed, depth by depth
///
/// Depth 0 is the real transition: its state, reward and termination flag come
/// from the trajectory and its target is the plain one-step target. The error
/// fields are filled only when a reference model was supplied, and are
/// `reference - model` at every depth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurements {
    pub states: Vec<State>,
    pub rewards: Vec<f64>,
    pub terms: Vec<f64>,

    pub targets: Vec<f64>,
    pub uncertainties: Vec<f64>,
    pub weights: Vec<f64>,

    pub state_errors: Vec<Vec<f64>>,
    pub reward_errors: Vec<f64>,
    pub term_errors: Vec<f64>,
    pub target_errors: Vec<f64>,
    pub uncertainty_errors: Vec<f64>,
}

impl Measurements {
    pub(crate) fn with_capacity(horizon: usize) -> Self {
        Self {
            states: Vec::with_capacity(horizon),
            rewards: Vec::with_capacity(horizon),
            terms: Vec::with_capacity(horizon),
            targets: Vec::with_capacity(horizon),
            ..Self::default()
        }
    }

    pub(crate) fn push_depth(&mut self, state: State, reward: f64, term: f64, target: f64) {
        self.states.push(state);
        self.rewards.push(reward);
        self.terms.push(term);
        self.targets.push(target);
    }

    /// Number of depths the rollout produced.
    pub fn depth(&self) -> usize {
        self.targets.len()
    }

    /// Whether a reference model was compared against this rollout.
    pub fn has_errors(&self) -> bool {
        !self.state_errors.is_empty()
    }

    /// Weight-averaged lookahead length, counting depth `h` as `h + 1` steps.
    ///
    /// Plain one-step updates record no weights and count as 1.
    pub fn effective_horizon(&self) -> f64 {
        let mut total = self.weights.first().copied().unwrap_or(1.0);
        let mut weighted = total;
        for (h, &w) in self.weights.iter().enumerate().skip(1) {
            total += w;
            weighted += w * (h + 1) as f64;
        }
        if total > 0.0 { weighted / total } else { 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_step_update_has_unit_horizon() {
        assert_eq!(Measurements::default().effective_horizon(), 1.0);
    }

    #[test]
    fn effective_horizon_weights_depths() {
        let m = Measurements {
            weights: vec![1.0, 1.0, 0.0, 2.0],
            ..Measurements::default()
        };
        // (1*1 + 1*2 + 0*3 + 2*4) / 4
        assert!((m.effective_horizon() - 11.0 / 4.0).abs() < 1e-12);
    }
}
