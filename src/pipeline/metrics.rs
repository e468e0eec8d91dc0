//! Aggregation of per-update diagnostics into episode statistics
//!
//! Every learning frame yields a [`Measurements`] record. The
//! [`ErrorAccumulator`] sums the errors of depths 1 and beyond (depth 0 is the
//! real transition and has no model error) and turns the sums into an
//! [`ErrorReport`] once the learning episode is over.

use serde::{Deserialize, Serialize};

use crate::q_learning::Measurements;

/// Quantiles reported for the distribution of uncertainty errors.
pub const QUANTILES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// A statistic per model depth (depth 2 first) plus an overall value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthSeries {
    pub by_depth: Vec<f64>,
    pub total: f64,
}

/// Error statistics for one learning episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Mean weight-averaged lookahead length per update
    pub effective_horizon: f64,
    /// RMS per-dimension state error
    pub state_error: DepthSeries,
    pub reward_error: DepthSeries,
    pub term_error: DepthSeries,
    /// RMS error over state, reward and termination together
    pub prediction_error: DepthSeries,
    /// Mean absolute target error
    pub target_error: DepthSeries,
    /// Mean absolute uncertainty error over the finite errors
    pub uncertainty_error: DepthSeries,
    pub num_inf: Vec<usize>,
    pub num_neg_inf: Vec<usize>,
    /// One series per entry of [`QUANTILES`]; the total pools every depth
    pub uncertainty_quantiles: Vec<DepthSeries>,
    /// Pearson correlation between uncertainty and absolute target error
    pub correlation: DepthSeries,
}

/// Running sums for a Pearson correlation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Correlation {
    n: f64,
    x: f64,
    y: f64,
    xy: f64,
    xx: f64,
    yy: f64,
}

impl Correlation {
    fn push(&mut self, x: f64, y: f64) {
        self.n += 1.0;
        self.x += x;
        self.y += y;
        self.xy += x * y;
        self.xx += x * x;
        self.yy += y * y;
    }

    fn merge(&mut self, other: &Correlation) {
        self.n += other.n;
        self.x += other.x;
        self.y += other.y;
        self.xy += other.xy;
        self.xx += other.xx;
        self.yy += other.yy;
    }

    fn value(&self) -> f64 {
        let num = self.n * self.xy - self.x * self.y;
        // clamp rounding error below zero
        let den_x = (self.n * self.xx - self.x * self.x).max(0.0);
        let den_y = (self.n * self.yy - self.y * self.y).max(0.0);
        let den = den_x.sqrt() * den_y.sqrt();
        if den != 0.0 { num / den } else { 0.0 }
    }
}

/// Sums model errors over the frames of one learning episode
#[derive(Debug, Clone)]
pub struct ErrorAccumulator {
    state_dim: usize,
    frames: usize,
    effective_horizon: f64,
    state: Vec<f64>,
    reward: Vec<f64>,
    term: Vec<f64>,
    prediction: Vec<f64>,
    target: Vec<f64>,
    uncertainty: Vec<f64>,
    num_inf: Vec<usize>,
    num_neg_inf: Vec<usize>,
    uncertainty_errors: Vec<Vec<f64>>,
    correlation: Vec<Correlation>,
}

impl ErrorAccumulator {
    /// Accumulator for rollouts of `horizon` depths over `state_dim`
    /// modelled dimensions.
    pub fn new(horizon: usize, state_dim: usize) -> Self {
        let depths = horizon.saturating_sub(1);
        Self {
            state_dim: state_dim.max(1),
            frames: 0,
            effective_horizon: 0.0,
            state: vec![0.0; depths],
            reward: vec![0.0; depths],
            term: vec![0.0; depths],
            prediction: vec![0.0; depths],
            target: vec![0.0; depths],
            uncertainty: vec![0.0; depths],
            num_inf: vec![0; depths],
            num_neg_inf: vec![0; depths],
            uncertainty_errors: vec![Vec::new(); depths],
            correlation: vec![Correlation::default(); depths],
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Add one update's diagnostics.
    ///
    /// Without an oracle the uncertainty error of every depth is recorded as 0.
    pub fn record(&mut self, m: &Measurements, has_oracle: bool) {
        self.frames += 1;
        self.effective_horizon += m.effective_horizon();

        let depths = m.state_errors.len().min(self.state.len() + 1);
        let state_dim = self.state_dim as f64;
        let pred_dim = state_dim + 2.0;

        for h in 1..depths {
            let i = h - 1;
            let target_error = m.target_errors[h];

            if let Some(&u) = m.uncertainties.get(h) {
                if u != f64::INFINITY {
                    self.correlation[i].push(u, target_error.abs());
                }
            }

            for d in &m.state_errors[h] {
                self.state[i] += d * d / state_dim;
                self.prediction[i] += d * d / pred_dim;
            }
            let reward_sq = m.reward_errors[h] * m.reward_errors[h];
            self.reward[i] += reward_sq;
            self.prediction[i] += reward_sq / pred_dim;
            let term_sq = m.term_errors[h] * m.term_errors[h];
            self.term[i] += term_sq;
            self.prediction[i] += term_sq / pred_dim;
            self.target[i] += target_error.abs();

            if has_oracle {
                let e = m.uncertainty_errors.get(h).copied().unwrap_or(0.0);
                self.uncertainty_errors[i].push(e);
                if e == f64::INFINITY {
                    self.num_inf[i] += 1;
                } else if e == f64::NEG_INFINITY {
                    self.num_neg_inf[i] += 1;
                } else {
                    self.uncertainty[i] += e.abs();
                }
            } else {
                self.uncertainty_errors[i].push(0.0);
            }
        }
    }

    /// Statistics over everything recorded so far.
    pub fn report(&self) -> ErrorReport {
        let frames = self.frames as f64;
        let per_frame = |sums: &[f64]| -> Vec<f64> { sums.iter().map(|s| ratio(*s, frames)).collect() };

        let rms = |sums: &[f64]| -> DepthSeries {
            let means = per_frame(sums);
            DepthSeries {
                by_depth: means.iter().map(|m| m.sqrt()).collect(),
                total: root_mean(&means),
            }
        };

        let target_means = per_frame(&self.target);
        let uncertainty_means: Vec<f64> = self
            .uncertainty
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let finite = self.frames - self.num_inf[i] - self.num_neg_inf[i];
                ratio(*s, finite as f64)
            })
            .collect();

        let mut pooled = Correlation::default();
        for c in &self.correlation {
            pooled.merge(c);
        }

        ErrorReport {
            effective_horizon: ratio(self.effective_horizon, frames),
            state_error: rms(&self.state),
            reward_error: rms(&self.reward),
            term_error: rms(&self.term),
            prediction_error: rms(&self.prediction),
            target_error: DepthSeries {
                total: root_mean(&target_means),
                by_depth: target_means,
            },
            uncertainty_error: DepthSeries {
                total: root_mean(&uncertainty_means),
                by_depth: uncertainty_means,
            },
            num_inf: self.num_inf.clone(),
            num_neg_inf: self.num_neg_inf.clone(),
            uncertainty_quantiles: self.quantiles(),
            correlation: DepthSeries {
                by_depth: self.correlation.iter().map(Correlation::value).collect(),
                total: pooled.value(),
            },
        }
    }

    fn quantiles(&self) -> Vec<DepthSeries> {
        let sorted: Vec<Vec<f64>> = self
            .uncertainty_errors
            .iter()
            .map(|errors| {
                let mut errors = errors.clone();
                errors.sort_by(f64::total_cmp);
                errors
            })
            .collect();
        let mut pooled: Vec<f64> = sorted.iter().flatten().copied().collect();
        pooled.sort_by(f64::total_cmp);

        QUANTILES
            .iter()
            .map(|&q| DepthSeries {
                by_depth: sorted.iter().map(|errors| quantile(errors, q)).collect(),
                total: quantile(&pooled, q),
            })
            .collect()
    }
}

fn ratio(sum: f64, count: f64) -> f64 {
    if count > 0.0 { sum / count } else { 0.0 }
}

/// `sqrt(mean(values))`, or 0 for no values.
fn root_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        (values.iter().sum::<f64>() / values.len() as f64).sqrt()
    }
}

/// Lower-index quantile of sorted values, 0 when there are none.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q) as usize;
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured(state_error: f64, target_error: f64, uncertainty: f64, uncertainty_error: f64) -> Measurements {
        Measurements {
            uncertainties: vec![0.0, uncertainty],
            weights: vec![1.0, 1.0],
            state_errors: vec![vec![0.0, 0.0], vec![state_error, state_error]],
            reward_errors: vec![0.0, 1.0],
            term_errors: vec![0.0, 0.0],
            target_errors: vec![0.0, target_error],
            uncertainty_errors: vec![0.0, uncertainty_error],
            ..Measurements::default()
        }
    }

    #[test]
    fn empty_accumulator_reports_zeros() {
        let report = ErrorAccumulator::new(3, 2).report();
        assert_eq!(report.state_error.by_depth, vec![0.0, 0.0]);
        assert_eq!(report.effective_horizon, 0.0);
        assert_eq!(report.uncertainty_quantiles.len(), QUANTILES.len());
    }

    #[test]
    fn errors_are_root_mean_squared_per_depth() {
        let mut acc = ErrorAccumulator::new(2, 2);
        acc.record(&measured(2.0, -1.0, 0.5, 1.0), true);
        acc.record(&measured(0.0, 3.0, 1.5, -2.0), true);
        let report = acc.report();

        // (2^2 + 2^2) / 2 dims in frame one, nothing in frame two
        assert!((report.state_error.by_depth[0] - 2.0f64.sqrt()).abs() < 1e-12);
        assert!((report.reward_error.by_depth[0] - 1.0).abs() < 1e-12);
        assert!((report.target_error.by_depth[0] - 2.0).abs() < 1e-12);
        assert!((report.uncertainty_error.by_depth[0] - 1.5).abs() < 1e-12);
        // two depths weighted equally: (1 + 2) / 2
        assert!((report.effective_horizon - 1.5).abs() < 1e-12);
    }

    #[test]
    fn infinite_uncertainty_errors_are_counted_not_summed() {
        let mut acc = ErrorAccumulator::new(2, 1);
        acc.record(&measured(0.0, 0.0, 0.0, f64::INFINITY), true);
        acc.record(&measured(0.0, 0.0, 0.0, f64::NEG_INFINITY), true);
        acc.record(&measured(0.0, 0.0, 0.0, 4.0), true);
        let report = acc.report();

        assert_eq!(report.num_inf, vec![1]);
        assert_eq!(report.num_neg_inf, vec![1]);
        assert_eq!(report.uncertainty_error.by_depth, vec![4.0]);
        assert_eq!(report.uncertainty_quantiles[0].by_depth, vec![f64::NEG_INFINITY]);
        assert_eq!(report.uncertainty_quantiles[2].by_depth, vec![4.0]);
    }

    #[test]
    fn correlation_tracks_uncertainty_and_target_error() {
        let mut acc = ErrorAccumulator::new(2, 1);
        for x in [1.0, 2.0, 3.0] {
            acc.record(&measured(0.0, 2.0 * x, x, 0.0), false);
        }
        let report = acc.report();
        assert!((report.correlation.by_depth[0] - 1.0).abs() < 1e-9);
        assert!((report.correlation.total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unmeasured_updates_only_count_frames() {
        let mut acc = ErrorAccumulator::new(4, 3);
        acc.record(&Measurements::default(), true);
        assert_eq!(acc.frames(), 1);
        let report = acc.report();
        assert_eq!(report.effective_horizon, 1.0);
        assert!(report.state_error.by_depth.iter().all(|&e| e == 0.0));
    }
}
