//! The Q-learner and its update rules
//!
//! [`QLearner`] owns a value function and a random generator. Each update
//! method handles one trajectory step: it rolls the chosen model forward from
//! the step's result state, scores every depth, blends the per-depth targets
//! and moves `Q(premise, action)` toward the blend.
//!
//! Diagnostics compare the rollout against reference models. Before each
//! comparison the generator is rewound to its state before the rollout, so the
//! replay breaks greedy ties and draws samples exactly as the first pass did;
//! afterwards it is put back so the comparison never perturbs learning.

use tracing::{debug, trace};

use super::{
    measurements::Measurements,
    weighting::{
        RangePolicy, interval_greedy, population_bounds, population_variances, target_ranges,
        uncertainties_to_weights, uncertainty_errors, weighted_average,
    },
};
use crate::{
    config::{Planner, SmveConfig, UpdateRule},
    error::{Error, Result},
    ports::{BbiPredictionModel, PredictionModel, QFunction},
    rng::SmveRng,
    trajectory::Trajectory,
    types::{Action, Bound},
};

/// Values closer than this count as tied for the greedy maximum.
const TIE_TOLERANCE: f64 = 1e-6;

pub struct QLearner {
    pub(super) q_function: Box<dyn QFunction>,
    pub(super) config: SmveConfig,
    pub(super) rng: SmveRng,
}

impl std::fmt::Debug for QLearner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QLearner")
            .field("num_actions", &self.q_function.num_actions())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QLearner {
    /// Create a learner around `q_function`.
    ///
    /// The learner draws from its own generator, seeded from `rng`.
    pub fn new(q_function: Box<dyn QFunction>, config: &SmveConfig, rng: &mut SmveRng) -> Result<Self> {
        config.validate()?;
        if q_function.num_actions() == 0 {
            return Err(Error::InvalidConfiguration {
                message: "the value function has no actions".to_string(),
            });
        }
        Ok(Self {
            q_function,
            config: config.clone(),
            rng: rng.derive(),
        })
    }

    pub fn q_function(&self) -> &dyn QFunction {
        self.q_function.as_ref()
    }

    pub fn q_function_mut(&mut self) -> &mut dyn QFunction {
        self.q_function.as_mut()
    }

    pub fn config(&self) -> &SmveConfig {
        &self.config
    }

    pub fn num_actions(&self) -> usize {
        self.q_function.num_actions()
    }

    pub fn rng(&self) -> &SmveRng {
        &self.rng
    }

    /// Best action in `state` and its value, breaking near-ties uniformly at
    /// random.
    pub fn greedy(&mut self, state: &[f64]) -> (Action, f64) {
        let qs = self.q_function.all_action_qs(state);

        let mut best = f64::NEG_INFINITY;
        let mut tied = Vec::with_capacity(qs.len());
        for (action, &q) in qs.iter().enumerate() {
            trace!("a {} q {}", action, q);
            if q > best {
                tied.clear();
                tied.push(action);
                best = q;
            } else if (q - best).abs() < TIE_TOLERANCE {
                tied.push(action);
            }
        }

        match tied.len() {
            0 => (0, best),
            n => (tied[self.rng.index(n)], best),
        }
    }

    pub fn greedy_action(&mut self, state: &[f64]) -> Action {
        self.greedy(state).0
    }

    /// Actions that may be greedy somewhere in `state_bound`, and the bound on
    /// the greedy value there.
    pub fn greedy_over(&self, state_bound: &[Bound]) -> (Vec<Action>, Bound) {
        let q_bounds: Vec<Bound> = self
            .q_function
            .all_action_q_bounds(state_bound)
            .into_iter()
            .map(Bound::normalized)
            .collect();
        interval_greedy(&q_bounds)
    }

    fn step_size(&self) -> f64 {
        self.config.step_size / self.q_function.step_size_normalizer()
    }

    /// Move `Q(premise, action)` of step `t` toward `target`.
    fn update_toward(&mut self, trajectory: &Trajectory, t: usize, target: f64) {
        let state = trajectory.premise_state(t);
        let action = trajectory.action(t);
        let td_error = target - self.q_function.q(state, action);
        let change = self.step_size() * td_error;
        trace!("target: {} td error: {}", target, td_error);
        self.q_function.update_q(state, action, change);
    }

    /// Plain one-step Q-learning on step `t`.
    pub fn q_update(&mut self, trajectory: &Trajectory, t: usize) {
        let next_q = if trajectory.result_terminal(t) {
            0.0
        } else {
            self.greedy(trajectory.result_state(t)).1
        };
        let target = trajectory.reward(t) + self.config.discount * next_q;
        self.update_toward(trajectory, t, target);
    }

    /// Blend the targets by their weights and update toward the blend.
    fn weighted_avg_update(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        measurements: &Measurements,
    ) -> Result<()> {
        let target = weighted_average(&measurements.targets, &measurements.weights)?;
        debug!(
            "targets: {:?} weights: {:?} adjusted target: {}",
            measurements.targets, measurements.weights, target
        );
        self.update_toward(trajectory, t, target);
        Ok(())
    }

    /// Run `f` with the generator rewound to `snapshot`, then restore it.
    fn replay<T>(&mut self, snapshot: &SmveRng, f: impl FnOnce(&mut Self) -> T) -> T {
        let current = std::mem::replace(&mut self.rng, snapshot.clone());
        let out = f(self);
        self.rng = current;
        out
    }

    /// Unweighted multi-step expansion through `model`.
    ///
    /// `reference` is only used for prediction-error diagnostics.
    pub fn mve_update(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        model: &dyn PredictionModel,
        reference: Option<&dyn PredictionModel>,
    ) -> Result<Measurements> {
        if trajectory.result_terminal(t) {
            self.q_update(trajectory, t);
            return Ok(Measurements::default());
        }

        let snapshot = self.rng.clone();
        let mut measurements = self.expectation_rollout(trajectory, t, model);
        let depth = measurements.depth();
        measurements.uncertainties = vec![0.0; depth];
        measurements.weights = vec![1.0; depth];
        measurements.uncertainty_errors = vec![0.0; depth];

        if let Some(reference) = reference {
            self.replay(&snapshot, |learner| {
                learner.measure_prediction_error(trajectory, t, reference, &mut measurements)
            });
        }

        self.weighted_avg_update(trajectory, t, &measurements)?;
        Ok(measurements)
    }

    /// Expansion weighted by accumulated one-step predictive uncertainty.
    pub fn one_step_uncertainty_update(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        model: &dyn PredictionModel,
        reference: Option<&dyn PredictionModel>,
        oracle: Option<&dyn BbiPredictionModel>,
    ) -> Result<Measurements> {
        if trajectory.result_terminal(t) {
            self.q_update(trajectory, t);
            return Ok(Measurements::default());
        }

        let snapshot = self.rng.clone();
        let mut measurements = self.one_step_uncertainty_rollout(trajectory, t, model);
        measurements.weights = uncertainties_to_weights(
            &measurements.uncertainties,
            self.config.temperature,
            self.config.decay,
        );
        debug!("uncertainties: {:?}", measurements.uncertainties);

        if let Some(reference) = reference {
            self.replay(&snapshot, |learner| {
                learner.measure_prediction_error(trajectory, t, reference, &mut measurements)
            });
        }

        if let Some(oracle) = oracle {
            let oracle_run = self.replay(&snapshot, |learner| {
                learner.one_step_uncertainty_rollout(trajectory, t, oracle)
            });
            measurements.uncertainty_errors =
                uncertainty_errors(&oracle_run.uncertainties, &measurements.uncertainties);
        }

        self.weighted_avg_update(trajectory, t, &measurements)?;
        Ok(measurements)
    }

    /// Expansion weighted by interval bounds on each depth's return.
    pub fn target_range_update(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        model: &dyn BbiPredictionModel,
        reference: Option<&dyn PredictionModel>,
        oracle: Option<&dyn BbiPredictionModel>,
    ) -> Result<Measurements> {
        if trajectory.result_terminal(t) {
            self.q_update(trajectory, t);
            return Ok(Measurements::default());
        }

        let snapshot = self.rng.clone();
        let mut measurements = self.expectation_rollout(trajectory, t, model);
        let predicted_q = self.premise_q(trajectory, t);

        let bounds = self.bbi_rollout(trajectory, t, model);
        measurements.uncertainties = target_ranges(
            &bounds,
            predicted_q,
            &measurements.targets,
            RangePolicy::from(&self.config),
        );
        measurements.weights = uncertainties_to_weights(
            &measurements.uncertainties,
            self.config.temperature,
            self.config.decay,
        );
        debug!("uncertainties: {:?}", measurements.uncertainties);

        self.measure_all(trajectory, t, &snapshot, reference, oracle, &mut measurements);
        self.weighted_avg_update(trajectory, t, &measurements)?;
        Ok(measurements)
    }

    /// Expansion weighted by the spread of a particle population per depth.
    pub fn monte_carlo_update(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        model: &dyn PredictionModel,
        reference: Option<&dyn PredictionModel>,
        oracle: Option<&dyn BbiPredictionModel>,
    ) -> Result<Measurements> {
        if trajectory.result_terminal(t) {
            self.q_update(trajectory, t);
            return Ok(Measurements::default());
        }

        let snapshot = self.rng.clone();
        let (mut measurements, populations) = self.monte_carlo_rollout(trajectory, t, model);

        measurements.uncertainties = if self.config.use_variance {
            population_variances(&populations, &measurements.targets, self.config.temperature)
        } else {
            let predicted_q = self.premise_q(trajectory, t);
            target_ranges(
                &population_bounds(&populations),
                predicted_q,
                &measurements.targets,
                RangePolicy::from(&self.config),
            )
        };
        measurements.weights = uncertainties_to_weights(
            &measurements.uncertainties,
            self.config.temperature,
            self.config.decay,
        );
        debug!("uncertainties: {:?}", measurements.uncertainties);

        self.measure_all(trajectory, t, &snapshot, reference, oracle, &mut measurements);
        self.weighted_avg_update(trajectory, t, &measurements)?;
        Ok(measurements)
    }

    /// Run the update rule `planner` selects, planning through `model`.
    ///
    /// Target-range updates need interval bounds; a model without them fails
    /// with [`Error::MissingCapability`].
    pub fn planned_update(
        &mut self,
        planner: &Planner,
        trajectory: &Trajectory,
        t: usize,
        model: &dyn PredictionModel,
        reference: Option<&dyn PredictionModel>,
        oracle: Option<&dyn BbiPredictionModel>,
    ) -> Result<Measurements> {
        match planner.rule() {
            UpdateRule::QLearning => {
                self.q_update(trajectory, t);
                Ok(Measurements::default())
            }
            UpdateRule::Expectation => self.mve_update(trajectory, t, model, reference),
            UpdateRule::OneStepUncertainty => {
                self.one_step_uncertainty_update(trajectory, t, model, reference, oracle)
            }
            UpdateRule::TargetRange => {
                let bbi = model.as_bbi().ok_or_else(|| Error::MissingCapability {
                    planner: planner.code().to_string(),
                    capability: "interval bounds",
                })?;
                self.target_range_update(trajectory, t, bbi, reference, oracle)
            }
            UpdateRule::MonteCarlo => {
                self.monte_carlo_update(trajectory, t, model, reference, oracle)
            }
        }
    }

    fn premise_q(&self, trajectory: &Trajectory, t: usize) -> f64 {
        self.q_function
            .q(trajectory.premise_state(t), trajectory.action(t))
    }

    fn measure_all(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        snapshot: &SmveRng,
        reference: Option<&dyn PredictionModel>,
        oracle: Option<&dyn BbiPredictionModel>,
        measurements: &mut Measurements,
    ) {
        if let Some(reference) = reference {
            self.replay(snapshot, |learner| {
                learner.measure_prediction_error(trajectory, t, reference, measurements)
            });
        }
        if let Some(oracle) = oracle {
            self.replay(snapshot, |learner| {
                learner.measure_bbi_error(trajectory, t, oracle, measurements)
            });
        }
    }

    /// Record `reference - model` for states, rewards, terminations and
    /// targets of an expectation rollout through `reference`.
    pub fn measure_prediction_error<M: PredictionModel + ?Sized>(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        reference: &M,
        measurements: &mut Measurements,
    ) {
        let truth = self.expectation_rollout(trajectory, t, reference);
        for i in 0..truth.depth().min(measurements.depth()) {
            measurements.state_errors.push(
                truth.states[i]
                    .iter()
                    .zip(&measurements.states[i])
                    .map(|(r, m)| r - m)
                    .collect(),
            );
            measurements
                .reward_errors
                .push(truth.rewards[i] - measurements.rewards[i]);
            measurements
                .term_errors
                .push(truth.terms[i] - measurements.terms[i]);
            measurements
                .target_errors
                .push(truth.targets[i] - measurements.targets[i]);
        }
    }

    /// Record how far the recorded uncertainties are from the target-range
    /// uncertainties the oracle yields.
    pub fn measure_bbi_error<M: BbiPredictionModel + ?Sized>(
        &mut self,
        trajectory: &Trajectory,
        t: usize,
        oracle: &M,
        measurements: &mut Measurements,
    ) {
        let oracle_run = self.expectation_rollout(trajectory, t, oracle);
        let bounds = self.bbi_rollout(trajectory, t, oracle);
        let predicted_q = self.premise_q(trajectory, t);
        let oracle_uncertainties = target_ranges(
            &bounds,
            predicted_q,
            &oracle_run.targets,
            RangePolicy::from(&self.config),
        );
        measurements.uncertainty_errors =
            uncertainty_errors(&oracle_uncertainties, &measurements.uncertainties);
    }
}
