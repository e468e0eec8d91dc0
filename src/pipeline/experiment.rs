//! The go-right planning experiment
//!
//! An experiment alternates a learning episode with a greedy evaluation
//! episode until the frame budget is spent. During learning every frame is
//! one Q-learner update chosen by the planner; the learned dynamics model
//! ingests every transition and is refit every `update_every` frames.
//! Planning through the learned model only starts after its first refit;
//! until then the learner falls back to one-step Q-learning.

use std::{fs, path::Path, time::Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::metrics::{ErrorAccumulator, ErrorReport};
use crate::{
    config::{Planner, SmveConfig, UpdateRule},
    environments::{GoRight, GoRightUncertain},
    error::{Error, Result},
    models::DecisionTreeModel,
    ports::{BbiPredictionModel, LearnedModel, Observer, PredictionModel},
    q_learning::{Measurements, QLearner},
    rng::SmveRng,
    trajectory::Trajectory,
};

/// Corridor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoRightConfig {
    pub length: usize,
    pub num_indicators: usize,
    pub prize_mult: f64,
}

impl Default for GoRightConfig {
    fn default() -> Self {
        Self {
            length: 10,
            num_indicators: 2,
            prize_mult: 1.0,
        }
    }
}

/// Everything one experiment run depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub planner: Planner,
    /// Learning frames to run; evaluation frames are not counted
    pub num_frames: usize,
    pub seed: u64,
    /// Probability of a uniformly random action while learning
    pub exploration_rate: f64,
    /// Learning frames between model refits
    pub update_every: usize,
    pub max_episode_steps: usize,
    pub go_right: GoRightConfig,
    pub smve: SmveConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            planner: Planner::default(),
            num_frames: 300_000,
            seed: 0,
            exploration_rate: 1.0,
            update_every: 100,
            max_episode_steps: 500,
            go_right: GoRightConfig::default(),
            smve: SmveConfig::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_num_frames(mut self, num_frames: usize) -> Self {
        self.num_frames = num_frames;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_smve(mut self, smve: SmveConfig) -> Self {
        self.smve = smve;
        self
    }

    /// The same configuration with the planner's forced options applied.
    pub fn resolved(mut self) -> Self {
        self.planner.apply(&mut self.smve);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.smve.validate()?;
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(Error::InvalidConfiguration {
                message: format!(
                    "exploration_rate must lie in [0, 1], got {}",
                    self.exploration_rate
                ),
            });
        }
        if self.update_every == 0 || self.max_episode_steps == 0 {
            return Err(Error::InvalidConfiguration {
                message: "update_every and max_episode_steps must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            operation: format!("read experiment config {}", path.display()),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| Error::Io {
            operation: format!("write experiment config {}", path.display()),
            source,
        })
    }
}

/// Outcome of one learning episode and the evaluation episode after it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub episode: usize,
    /// Learning frames so far, this episode included
    pub total_frames: usize,
    pub episode_score: f64,
    pub episode_return: f64,
    pub episode_frames: usize,
    pub eval_score: f64,
    pub eval_return: f64,
    pub eval_frames: usize,
    /// Wall time of the learning episode
    pub episode_seconds: f64,
    /// Part of `episode_seconds` spent in learner updates
    pub plan_seconds: f64,
    pub errors: ErrorReport,
}

/// Totals over a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub planner: String,
    pub episodes: usize,
    pub total_frames: usize,
    pub mean_eval_score: f64,
    pub best_eval_score: f64,
    pub final_eval_score: f64,
    pub mean_effective_horizon: f64,
    /// Leaf count of each model tree at the end of the run
    pub model_leaves: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
struct EpisodeStats {
    score: f64,
    ret: f64,
    frames: usize,
    seconds: f64,
    plan_seconds: f64,
}

/// Mutable state of a run: environment, models, learner and counters
struct Run {
    env: GoRight,
    oracle: GoRightUncertain,
    model: DecisionTreeModel,
    learner: QLearner,
    rng: SmveRng,
    total_frames: usize,
    frames_since_refit: usize,
    model_refit: bool,
}

/// A configured experiment with its observers
pub struct Experiment {
    config: ExperimentConfig,
    observers: Vec<Box<dyn Observer>>,
}

impl Experiment {
    /// Resolve the planner's options into `config` and validate it.
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        let config = config.resolved();
        config.validate()?;
        Ok(Self {
            config,
            observers: Vec::new(),
        })
    }

    pub fn with_observer(mut self, observer: Box<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The resolved configuration.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn run(&mut self) -> Result<ExperimentSummary> {
        let mut run = self.setup()?;
        let horizon = self.config.smve.horizon;

        info!(
            "planner {} for {} frames (horizon {}, seed {})",
            self.config.planner, self.config.num_frames, horizon, self.config.seed
        );
        for observer in &mut self.observers {
            observer.on_experiment_start(self.config.num_frames)?;
        }

        let mut reports = Vec::new();
        while run.total_frames < self.config.num_frames {
            let mut errors = ErrorAccumulator::new(horizon, run.env.model_dim());
            let learning = self.episode(&mut run, Some(&mut errors))?;
            let eval = self.episode(&mut run, None)?;

            let report = EpisodeReport {
                episode: reports.len(),
                total_frames: run.total_frames,
                episode_score: learning.score,
                episode_return: learning.ret,
                episode_frames: learning.frames,
                eval_score: eval.score,
                eval_return: eval.ret,
                eval_frames: eval.frames,
                episode_seconds: learning.seconds,
                plan_seconds: learning.plan_seconds,
                errors: errors.report(),
            };
            info!(
                "episode {}: frames {} score {} eval {} horizon {:.3}",
                report.episode,
                report.total_frames,
                report.episode_score,
                report.eval_score,
                report.errors.effective_horizon
            );
            for observer in &mut self.observers {
                observer.on_episode(&report)?;
            }
            reports.push(report);
        }

        let summary = summarize(&self.config, &run, &reports);
        for observer in &mut self.observers {
            observer.on_experiment_end(&summary)?;
        }
        Ok(summary)
    }

    fn setup(&self) -> Result<Run> {
        let gr = &self.config.go_right;
        let env = GoRight::new(gr.length, gr.num_indicators, gr.prize_mult)?;
        let oracle = GoRightUncertain::matching(&env);

        let mut init = SmveRng::seed_from_u64(self.config.seed);
        let rng = init.derive();
        let q_function = env.q_function(&mut init)?;
        let learner = QLearner::new(Box::new(q_function), &self.config.smve, &mut init)?;
        let model = DecisionTreeModel::new(env.model_dim(), env.num_actions(), &self.config.smve)?;

        Ok(Run {
            env,
            oracle,
            model,
            learner,
            rng,
            total_frames: 0,
            frames_since_refit: 0,
            model_refit: false,
        })
    }

    /// Play one episode. Learning episodes pass an accumulator; evaluation
    /// episodes act greedily and leave the learner and model alone.
    fn episode(&self, run: &mut Run, mut errors: Option<&mut ErrorAccumulator>) -> Result<EpisodeStats> {
        let start = Instant::now();
        let learning = errors.is_some();
        let mut stats = EpisodeStats::default();
        let mut discount = 1.0;

        let mut state = run.env.initial_state(&mut run.rng);
        let mut trajectory = Trajectory::new(state.clone(), false);
        let mut terminated = false;

        while stats.frames < self.config.max_episode_steps && !terminated {
            let action = if learning && run.rng.uniform() < self.config.exploration_rate {
                run.rng.index(run.env.num_actions())
            } else {
                run.learner.greedy_action(&state)
            };

            let next = run.env.state_prediction(&state, action);
            let reward = run.env.reward_prediction(&state, action);
            terminated = run.env.term_prediction(&state, action) > 0.5;
            stats.score += reward;
            stats.ret += discount * reward;
            discount *= self.config.smve.discount;

            if let Some(errors) = errors.as_deref_mut() {
                trajectory.add_step(action, reward, next.clone(), terminated);
                let t = trajectory.len() - 1;

                let plan_start = Instant::now();
                let measurements = self.update(run, &trajectory, t)?;
                stats.plan_seconds += plan_start.elapsed().as_secs_f64();
                errors.record(&measurements, true);

                run.total_frames += 1;
                run.frames_since_refit += 1;
                self.maybe_refit(run);
            }

            state = next;
            stats.frames += 1;
        }

        if learning && self.config.planner.uses_learned_model() {
            run.model.remove_trajectory(trajectory.id());
        }
        stats.seconds = start.elapsed().as_secs_f64();
        Ok(stats)
    }

    fn update(&self, run: &mut Run, trajectory: &Trajectory, t: usize) -> Result<Measurements> {
        let planner = &self.config.planner;

        if planner.uses_perfect_model() {
            return run.learner.mve_update(trajectory, t, &run.env, None);
        }

        let planning_ready = planner.uses_oracle() || run.model_refit;
        let measurements = if planner.rule() == UpdateRule::QLearning
            || !planning_ready
            || self.config.smve.horizon == 1
        {
            run.learner.q_update(trajectory, t);
            Measurements::default()
        } else {
            let planning: &dyn PredictionModel = if planner.uses_oracle() {
                &run.oracle
            } else {
                &run.model
            };
            let reference: &dyn PredictionModel = &run.env;
            let oracle: &dyn BbiPredictionModel = &run.oracle;
            run.learner
                .planned_update(planner, trajectory, t, planning, Some(reference), Some(oracle))?
        };

        if planner.uses_learned_model() {
            run.model.add_example(trajectory, t);
        }
        Ok(measurements)
    }

    fn maybe_refit(&self, run: &mut Run) {
        let due = run.frames_since_refit >= self.config.update_every;
        if due && self.config.planner.uses_learned_model() && self.config.smve.horizon > 1 {
            run.model.update_predictions();
            run.frames_since_refit = 0;
            run.model_refit = true;
            debug!(
                "refit model at frame {}: leaves {:?}",
                run.total_frames,
                run.model.leaf_counts()
            );
        }
    }
}

fn summarize(config: &ExperimentConfig, run: &Run, reports: &[EpisodeReport]) -> ExperimentSummary {
    let episodes = reports.len();
    let mean = |f: fn(&EpisodeReport) -> f64| {
        if episodes == 0 {
            0.0
        } else {
            reports.iter().map(f).sum::<f64>() / episodes as f64
        }
    };

    ExperimentSummary {
        planner: config.planner.to_string(),
        episodes,
        total_frames: run.total_frames,
        mean_eval_score: mean(|r| r.eval_score),
        best_eval_score: reports
            .iter()
            .map(|r| r.eval_score)
            .fold(f64::NEG_INFINITY, f64::max),
        final_eval_score: reports.last().map_or(0.0, |r| r.eval_score),
        mean_effective_horizon: mean(|r| r.errors.effective_horizon),
        model_leaves: run.model.leaf_counts(),
    }
}
