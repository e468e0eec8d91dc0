//! Model rollouts from a trajectory step's result state
//!
//! Every rollout starts at depth 0 with the real transition and its one-step
//! target, then steps a model forward `horizon - 1` times along the current
//! greedy policy. Once a path has terminated it stays put with zero reward and
//! zero bootstrap value.

use tracing::trace;

use super::{Measurements, QLearner};
use crate::{
    ports::{BbiPredictionModel, PredictionModel},
    trajectory::Trajectory,
    types::{Action, Bound, PredUnc, State, point_bound},
};

fn terminal_value(trajectory_terminal: bool) -> f64 {
    if trajectory_terminal { 1.0 } else { 0.0 }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Scale both ends of a bound by a non-negative factor.
///
/// A zero factor gives the point 0 even for an unbounded input.
fn scaled(bound: Bound, factor: f64) -> Bound {
    if factor == 0.0 {
        return Bound::point(0.0);
    }
    Bound {
        lower: bound.lower * factor,
        upper: bound.upper * factor,
    }
}

impl QLearner {
    /// Follow the model's point predictions.
    pub fn expectation_rollout<M: PredictionModel + ?Sized>(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        model: &M,
    ) -> Measurements {
        let discount = self.config.discount;
        let horizon = self.config.horizon;
        let mut m = Measurements::with_capacity(horizon);

        let mut current = trajectory.result_state(t).clone();
        let mut cum_reward = trajectory.reward(t);
        let term = terminal_value(trajectory.result_terminal(t));
        let mut terminated = term > 0.5;
        let (mut action, q) = self.greedy(&current);
        m.push_depth(current.clone(), cum_reward, term, cum_reward + discount * q);

        let mut total_discount = discount;
        for depth in 1..horizon {
            let mut next = current.clone();
            let mut reward = 0.0;
            let mut next_term = 1.0;
            let mut next_q = 0.0;
            let mut next_action = 0;
            let mut next_terminated = true;

            if !terminated {
                next = model.state_prediction(&current, action);
                reward = model.reward_prediction(&current, action);
                next_term = model.term_prediction(&current, action);
                next_terminated = next_term > 0.5;
                if !next_terminated {
                    (next_action, next_q) = self.greedy(&next);
                }
                trace!(
                    "expectation rollout {}: action {} next {:?} reward {} term {} next q {}",
                    depth, action, next, reward, next_term, next_q
                );
            }

            cum_reward += total_discount * reward;
            total_discount *= discount;
            m.push_depth(next.clone(), reward, next_term, cum_reward + total_discount * next_q);

            current = next;
            action = next_action;
            terminated = terminated || next_terminated;
        }
        m
    }

    /// Follow the model's point predictions while accumulating one-step
    /// uncertainty: variances when `use_variance` is set, bound widths
    /// otherwise. The reward part counts when `inc_rwd` is set, the state part
    /// when `inc_state` is set.
    pub fn one_step_uncertainty_rollout<M: PredictionModel + ?Sized>(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        model: &M,
    ) -> Measurements {
        let discount = self.config.discount;
        let horizon = self.config.horizon;
        let use_variance = self.config.use_variance;
        let inc_rwd = self.config.inc_rwd;
        let inc_state = self.config.inc_state;

        let mut m = Measurements::with_capacity(horizon);
        let mut current = trajectory.result_state(t).clone();
        let mut cum_reward = trajectory.reward(t);
        let term = terminal_value(trajectory.result_terminal(t));
        let mut terminated = term > 0.5;
        let (mut action, q) = self.greedy(&current);
        m.push_depth(current.clone(), cum_reward, term, cum_reward + discount * q);
        m.uncertainties.push(0.0);

        let mut total_discount = discount;
        for depth in 1..horizon {
            let mut next = current.clone();
            let mut reward = PredUnc {
                pred: 0.0,
                uncertainty: 0.0,
            };
            let next_state: Vec<PredUnc>;
            let next_term: PredUnc;
            let mut next_q = 0.0;
            let mut next_action = 0;
            let mut next_terminated = true;

            if !terminated {
                if use_variance {
                    next_state = model
                        .state_distribution(&current, action)
                        .into_iter()
                        .map(|d| PredUnc {
                            pred: d.mean,
                            uncertainty: d.var,
                        })
                        .collect();
                    let r = model.reward_distribution(&current, action);
                    reward = PredUnc {
                        pred: r.mean,
                        uncertainty: r.var,
                    };
                    let tm = model.term_distribution(&current, action);
                    next_term = PredUnc {
                        pred: tm.mean,
                        uncertainty: tm.var,
                    };
                } else {
                    let (pred, bounds) = model.state_bounds(&current, action);
                    next_state = pred
                        .into_iter()
                        .zip(bounds)
                        .map(|(p, b)| PredUnc {
                            pred: p,
                            uncertainty: b.normalized().width(),
                        })
                        .collect();
                    let (r, r_bound) = model.reward_bounds(&current, action);
                    reward = PredUnc {
                        pred: r,
                        uncertainty: r_bound.normalized().width(),
                    };
                    let (tm, tm_bound) = model.term_bounds(&current, action);
                    next_term = PredUnc {
                        pred: tm,
                        uncertainty: tm_bound.normalized().width(),
                    };
                }

                next = next_state.iter().map(|p| p.pred).collect();
                next_terminated = next_term.pred > 0.5;
                if !next_terminated {
                    (next_action, next_q) = self.greedy(&next);
                }
                trace!(
                    "one-step rollout {}: action {} next {:?} reward {:?} term {:?}",
                    depth, action, next_state, reward, next_term
                );
            } else {
                next_state = next
                    .iter()
                    .map(|&x| PredUnc {
                        pred: x,
                        uncertainty: 0.0,
                    })
                    .collect();
                next_term = PredUnc {
                    pred: 1.0,
                    uncertainty: 0.0,
                };
            }

            cum_reward += total_discount * reward.pred;
            total_discount *= discount;
            m.push_depth(
                next.clone(),
                reward.pred,
                next_term.pred,
                cum_reward + total_discount * next_q,
            );

            let mut uncertainty = m.uncertainties.last().copied().unwrap_or(0.0);
            if inc_rwd {
                uncertainty += reward.uncertainty;
            }
            if inc_state {
                uncertainty += next_state.iter().map(|p| p.uncertainty).sum::<f64>();
            }
            m.uncertainties.push(uncertainty);

            current = next;
            action = next_action;
            terminated = terminated || next_terminated;
        }
        m
    }

    /// Propagate a state bound and the set of possibly-greedy actions.
    ///
    /// Returns one bound per depth on the return that depth's target could
    /// take. Once termination becomes possible, reward and value bounds are
    /// widened to include zero; once it is certain, the path stops.
    pub fn bbi_rollout<M: BbiPredictionModel + ?Sized>(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        model: &M,
    ) -> Vec<Bound> {
        let discount = self.config.discount;
        let horizon = self.config.horizon;

        let mut current = point_bound(trajectory.result_state(t));
        let reward = trajectory.reward(t);
        let mut cum_reward = Bound::point(reward);
        let mut terminal = Bound::point(terminal_value(trajectory.result_terminal(t)));

        let (mut actions, q) = self.greedy_over(&current);
        let mut bounds = Vec::with_capacity(horizon);
        bounds.push(Bound::point(reward) + scaled(q, discount));

        let mut total_discount = discount;
        for depth in 1..horizon {
            let mut reward_bound = Bound::point(0.0);
            let mut next_q = Bound::point(0.0);
            let mut next_term = Bound::point(1.0);
            let mut next_actions: Vec<Action> = Vec::new();
            let mut next = current.clone();

            if terminal.lower <= 0.5 {
                next = model
                    .state_bounds_over(&current, &actions)
                    .into_iter()
                    .map(Bound::normalized)
                    .collect();
                reward_bound = model.reward_bounds_over(&current, &actions).normalized();
                if terminal.upper > 0.5 {
                    reward_bound = reward_bound.including_zero();
                }
                next_term = model.term_bounds_over(&current, &actions).normalized();

                if next_term.lower <= 0.5 {
                    (next_actions, next_q) = self.greedy_over(&next);
                    if terminal.upper.max(next_term.upper) > 0.5 {
                        next_q = next_q.including_zero();
                    }
                } else {
                    next = current.clone();
                }
                trace!(
                    "bbi rollout {}: actions {:?} reward {} term {} next q {}",
                    depth, actions, reward_bound, next_term, next_q
                );
            }

            cum_reward += scaled(reward_bound, total_discount);
            total_discount *= discount;
            bounds.push(cum_reward + scaled(next_q, total_discount));

            current = next;
            actions = next_actions;
            terminal.lower = terminal.lower.max(next_term.lower);
            terminal.upper = terminal.upper.max(next_term.upper);
        }
        bounds
    }

    /// Advance `num_samples` particles, each drawing from the model and
    /// following its own greedy action.
    ///
    /// The recorded states, rewards, terminations and targets are population
    /// means; the per-depth target populations are returned alongside.
    pub fn monte_carlo_rollout<M: PredictionModel + ?Sized>(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        model: &M,
    ) -> (Measurements, Vec<Vec<f64>>) {
        let discount = self.config.discount;
        let horizon = self.config.horizon;
        let n = self.config.num_samples;

        let mut m = Measurements::with_capacity(horizon);
        let start = trajectory.result_state(t);
        let reward = trajectory.reward(t);
        let term = terminal_value(trajectory.result_terminal(t));

        let mut particles: Vec<State> = vec![start.clone(); n];
        let mut cum_rewards = vec![reward; n];
        let mut terminated = vec![term >= 0.5; n];

        let (_, q) = self.greedy(start);
        let first = reward + discount * q;
        let mut populations = Vec::with_capacity(horizon);
        populations.push(vec![first; n]);
        m.push_depth(start.clone(), reward, term, first);

        let mut actions = Vec::with_capacity(n);
        for particle in &particles {
            actions.push(self.greedy(particle).0);
        }

        let mut total_discount = discount;
        for depth in 1..horizon {
            let mut targets = vec![0.0; n];
            let mut rewards = vec![0.0; n];
            let mut terms = vec![0.0; n];
            let mut next_particles = Vec::with_capacity(n);

            for j in 0..n {
                let mut next_q = 0.0;
                let mut next_action = 0;
                let next = if terminated[j] {
                    terms[j] = 1.0;
                    particles[j].clone()
                } else {
                    let s = model.state_sample(&particles[j], actions[j], &mut self.rng);
                    rewards[j] = model.reward_sample(&particles[j], actions[j], &mut self.rng);
                    terms[j] = terminal_value(model.term_sample(&particles[j], actions[j], &mut self.rng));
                    if terms[j] < 0.5 {
                        (next_action, next_q) = self.greedy(&s);
                    }
                    s
                };

                cum_rewards[j] += total_discount * rewards[j];
                targets[j] = cum_rewards[j] + total_discount * discount * next_q;
                actions[j] = next_action;
                terminated[j] = terminated[j] || terms[j] >= 0.5;
                next_particles.push(next);
            }

            let dims = next_particles.iter().map(Vec::len).min().unwrap_or(0);
            let mean_state: State = (0..dims)
                .map(|d| next_particles.iter().map(|s| s[d]).sum::<f64>() / n as f64)
                .collect();
            trace!(
                "monte carlo rollout {}: mean state {:?} targets {:?}",
                depth, mean_state, targets
            );
            m.push_depth(mean_state, mean(&rewards), mean(&terms), mean(&targets));
            populations.push(targets);

            particles = next_particles;
            total_discount *= discount;
        }
        (m, populations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SmveConfig, ports::QFunction, q_function::TileCodingQFunction, rng::SmveRng,
    };

    /// Moves right by the action, pays 1 per move, ends past 3.
    struct Ramp;

    impl PredictionModel for Ramp {
        fn state_prediction(&self, premise: &[f64], action: Action) -> State {
            vec![premise[0] + action as f64]
        }

        fn reward_prediction(&self, _premise: &[f64], action: Action) -> f64 {
            action as f64
        }

        fn term_prediction(&self, premise: &[f64], action: Action) -> f64 {
            if premise[0] + action as f64 > 3.0 { 1.0 } else { 0.0 }
        }

        fn as_bbi(&self) -> Option<&dyn BbiPredictionModel> {
            Some(self)
        }
    }

    impl BbiPredictionModel for Ramp {
        fn state_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Vec<Bound> {
            let lo = actions.iter().copied().min().unwrap_or(0) as f64;
            let hi = actions.iter().copied().max().unwrap_or(0) as f64;
            vec![Bound::new(premise[0].lower + lo, premise[0].upper + hi)]
        }

        fn reward_bounds_over(&self, _premise: &[Bound], actions: &[Action]) -> Bound {
            let lo = actions.iter().copied().min().unwrap_or(0) as f64;
            let hi = actions.iter().copied().max().unwrap_or(0) as f64;
            Bound::new(lo, hi)
        }

        fn term_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Bound {
            let hi = actions.iter().copied().max().unwrap_or(0) as f64;
            let lo = actions.iter().copied().min().unwrap_or(0) as f64;
            let end = |x: f64| if x > 3.0 { 1.0 } else { 0.0 };
            Bound::new(end(premise[0].lower + lo), end(premise[0].upper + hi))
        }
    }

    /// Stays put, but knows nothing: every bound is unbounded, like an
    /// untrained leaf.
    struct Unknown;

    impl PredictionModel for Unknown {
        fn state_prediction(&self, premise: &[f64], _action: Action) -> State {
            premise.to_vec()
        }

        fn reward_prediction(&self, _premise: &[f64], _action: Action) -> f64 {
            0.0
        }

        fn term_prediction(&self, _premise: &[f64], _action: Action) -> f64 {
            0.0
        }

        fn as_bbi(&self) -> Option<&dyn BbiPredictionModel> {
            Some(self)
        }
    }

    impl BbiPredictionModel for Unknown {
        fn state_bounds_over(&self, premise: &[Bound], _actions: &[Action]) -> Vec<Bound> {
            vec![Bound::new(f64::NEG_INFINITY, f64::INFINITY); premise.len()]
        }

        fn reward_bounds_over(&self, _premise: &[Bound], _actions: &[Action]) -> Bound {
            Bound::new(f64::NEG_INFINITY, f64::INFINITY)
        }

        fn term_bounds_over(&self, _premise: &[Bound], _actions: &[Action]) -> Bound {
            Bound::point(0.0)
        }
    }

    fn learner(horizon: usize) -> QLearner {
        let mut rng = SmveRng::seed_from_u64(9);
        let config = SmveConfig::default().with_horizon(horizon);
        let mut q = TileCodingQFunction::new(vec![Bound::new(0.0, 8.0)], vec![8], 1, 2, &mut rng)
            .unwrap();
        // moving right is worth 1 everywhere, staying is worth 0
        for x in 0..8 {
            q.update_q(&[x as f64 + 0.5], 1, 1.0);
        }
        QLearner::new(Box::new(q), &config, &mut rng).unwrap()
    }

    fn step_from(x: f64) -> Trajectory {
        let mut traj = Trajectory::new(vec![x - 1.0], false);
        traj.add_step(1, 1.0, vec![x], false);
        traj
    }

    #[test]
    fn expectation_rollout_stops_at_predicted_termination() {
        let mut learner = learner(4);
        let m = learner.expectation_rollout(&step_from(1.5), 0, &Ramp);

        assert_eq!(m.states, vec![vec![1.5], vec![2.5], vec![3.5], vec![3.5]]);
        assert_eq!(m.rewards, vec![1.0, 1.0, 1.0, 0.0]);
        assert_eq!(m.terms, vec![0.0, 0.0, 1.0, 1.0]);
        // 1 + 0.9 * 1, then 1 + 0.9 + 0.81 * 1, then the path ends
        assert!((m.targets[0] - 1.9).abs() < 1e-12);
        assert!((m.targets[1] - 2.71).abs() < 1e-12);
        assert!((m.targets[2] - 2.71).abs() < 1e-12);
        assert!((m.targets[3] - 2.71).abs() < 1e-12);
    }

    #[test]
    fn point_model_has_no_one_step_uncertainty() {
        let mut learner = learner(3);
        let m = learner.one_step_uncertainty_rollout(&step_from(0.5), 0, &Ramp);
        assert_eq!(m.uncertainties, vec![0.0; 3]);
        let plain = learner.expectation_rollout(&step_from(0.5), 0, &Ramp);
        assert_eq!(m.targets, plain.targets);
    }

    #[test]
    fn bbi_rollout_of_exact_model_collapses_to_points() {
        let mut learner = learner(3);
        let traj = step_from(0.5);
        let bounds = learner.bbi_rollout(&traj, 0, &Ramp);
        let m = learner.expectation_rollout(&traj, 0, &Ramp);
        for (bound, target) in bounds.iter().zip(&m.targets) {
            assert!((bound.lower - target).abs() < 1e-12);
            assert!((bound.upper - target).abs() < 1e-12);
        }
    }

    #[test]
    fn possible_termination_widens_to_zero() {
        let mut learner = learner(3);
        // from 2.5 every action set reaches 3.5 and ends
        let bounds = learner.bbi_rollout(&step_from(2.5), 0, &Ramp);
        assert_eq!(bounds.len(), 3);
        // depth 1 terminates for sure: reward 1, no bootstrap
        assert!((bounds[1].lower - 1.9).abs() < 1e-12);
        assert!((bounds[1].upper - 1.9).abs() < 1e-12);
        // depth 2 contributes nothing after certain termination
        assert_eq!(bounds[2], bounds[1]);
    }

    #[test]
    fn zero_factor_scales_unbounded_to_zero() {
        let everything = Bound::new(f64::NEG_INFINITY, f64::INFINITY);
        assert_eq!(scaled(everything, 0.0), Bound::point(0.0));
        assert_eq!(scaled(Bound::new(-1.0, 2.0), 0.5), Bound::new(-0.5, 1.0));
    }

    #[test]
    fn zero_discount_ignores_unbounded_predictions() {
        let mut rng = SmveRng::seed_from_u64(2);
        let config = SmveConfig::default().with_horizon(3).with_discount(0.0);
        let q = TileCodingQFunction::new(vec![Bound::new(0.0, 8.0)], vec![8], 1, 2, &mut rng)
            .unwrap();
        let mut learner = QLearner::new(Box::new(q), &config, &mut rng).unwrap();
        let traj = step_from(1.5);

        let bounds = learner.bbi_rollout(&traj, 0, &Unknown);
        assert_eq!(bounds, vec![Bound::point(1.0); 3]);

        let m = learner.target_range_update(&traj, 0, &Unknown, None, None).unwrap();
        assert!(m.uncertainties.iter().all(|u| !u.is_nan()));
        assert!((learner.q_function().q(&[0.5], 1) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn monte_carlo_particles_agree_on_deterministic_model() {
        let mut learner = learner(3);
        let traj = step_from(0.5);
        let (m, pops) = learner.monte_carlo_rollout(&traj, 0, &Ramp);
        let plain = learner.expectation_rollout(&traj, 0, &Ramp);

        assert_eq!(pops.len(), 3);
        assert!(pops.iter().all(|p| p.len() == learner.config().num_samples));
        assert_eq!(m.states, plain.states);
        for (a, b) in m.targets.iter().zip(&plain.targets) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
