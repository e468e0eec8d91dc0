//! Turning per-depth uncertainty into blending weights
//!
//! Every selective update produces one target per depth plus an uncertainty
//! for each. The helpers here score return bounds and particle populations,
//! map uncertainty to weights and blend the targets.

use crate::{
    config::SmveConfig,
    error::{Error, Result},
    types::{Action, Bound},
};

/// How a depth's return bound is scored against the current estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangePolicy {
    pub temperature: f64,
    pub directional_range: bool,
    pub reject_overlap: bool,
}

impl From<&SmveConfig> for RangePolicy {
    fn from(config: &SmveConfig) -> Self {
        Self {
            temperature: config.temperature,
            directional_range: config.directional_range,
            reject_overlap: config.reject_overlap,
        }
    }
}

/// Score each depth's return bound.
///
/// The directional edge is the bound end on the same side of `predicted_q` as
/// the depth's target would move the estimate. A bound straddling
/// `predicted_q` counts as overlapping; with `reject_overlap` it scores
/// infinity. Otherwise the score is either the distance from the target to the
/// directional edge or the full width. Infinite temperature scores every depth
/// zero.
pub fn target_ranges(
    bounds: &[Bound],
    predicted_q: f64,
    targets: &[f64],
    policy: RangePolicy,
) -> Vec<f64> {
    bounds
        .iter()
        .zip(targets)
        .map(|(bound, &target)| {
            if policy.temperature.is_infinite() {
                return 0.0;
            }
            let (edge, overlap) = if target > predicted_q {
                (bound.lower, bound.lower < predicted_q)
            } else if target < predicted_q {
                (bound.upper, bound.upper > predicted_q)
            } else {
                (
                    bound.upper,
                    bound.lower < predicted_q || bound.upper > predicted_q,
                )
            };

            if policy.reject_overlap && overlap {
                f64::INFINITY
            } else if policy.directional_range {
                (target - edge).abs()
            } else {
                bound.width()
            }
        })
        .collect()
}

/// Smallest bound around each depth's particle targets.
pub fn population_bounds(populations: &[Vec<f64>]) -> Vec<Bound> {
    populations
        .iter()
        .map(|pop| {
            pop.iter().fold(
                Bound {
                    lower: f64::INFINITY,
                    upper: f64::NEG_INFINITY,
                },
                |acc, &x| Bound {
                    lower: acc.lower.min(x),
                    upper: acc.upper.max(x),
                },
            )
        })
        .collect()
}

/// Sample variance of each depth's particle targets around its mean target.
///
/// Infinite temperature, or a single particle, scores zero.
pub fn population_variances(populations: &[Vec<f64>], targets: &[f64], temperature: f64) -> Vec<f64> {
    populations
        .iter()
        .zip(targets)
        .map(|(pop, &target)| {
            if temperature.is_infinite() || pop.len() <= 1 {
                return 0.0;
            }
            let sum_sq: f64 = pop.iter().map(|x| (x - target) * (x - target)).sum();
            sum_sq / (pop.len() - 1) as f64
        })
        .collect()
}

/// `exp(-u / temperature) * decay^h` per depth.
///
/// Infinite uncertainty always weighs zero; infinite temperature weighs every
/// finite uncertainty by decay alone.
pub fn uncertainties_to_weights(uncertainties: &[f64], temperature: f64, decay: f64) -> Vec<f64> {
    let mut total_decay = 1.0;
    uncertainties
        .iter()
        .map(|&u| {
            let w = if u == f64::INFINITY {
                0.0
            } else if temperature.is_infinite() {
                total_decay
            } else {
                (-u / temperature).exp() * total_decay
            };
            total_decay *= decay;
            w
        })
        .collect()
}

/// Weighted mean of the targets.
pub fn weighted_average(targets: &[f64], weights: &[f64]) -> Result<f64> {
    let (value, total) = targets
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(value, total), (&t, &w)| (value + t * w, total + w));
    if total == 0.0 || !total.is_finite() {
        return Err(Error::DegenerateWeights { total });
    }
    Ok(value / total)
}

/// `reference - model` per depth, where both infinite counts as agreement.
pub fn uncertainty_errors(reference: &[f64], model: &[f64]) -> Vec<f64> {
    reference
        .iter()
        .zip(model)
        .map(|(&r, &m)| {
            if r == f64::INFINITY && m == f64::INFINITY {
                0.0
            } else {
                r - m
            }
        })
        .collect()
}

/// Interval version of greedy action selection.
///
/// One left-to-right sweep over per-action value bounds. An action whose lower
/// bound beats the running upper bound becomes the only contender; an action
/// whose upper bound reaches the running lower bound joins the contenders,
/// widens the running bound and evicts contenders it now dominates. Returns
/// the surviving actions in order and the bound on the greedy value.
pub fn interval_greedy(q_bounds: &[Bound]) -> (Vec<Action>, Bound) {
    let mut greedy = Bound {
        lower: f64::NEG_INFINITY,
        upper: f64::NEG_INFINITY,
    };
    let mut contenders: Vec<(Action, Bound)> = Vec::with_capacity(q_bounds.len());

    for (action, &q) in q_bounds.iter().enumerate() {
        if q.lower > greedy.upper {
            contenders.clear();
            contenders.push((action, q));
            greedy = q;
        } else if q.upper >= greedy.lower {
            greedy.lower = greedy.lower.max(q.lower);
            greedy.upper = greedy.upper.max(q.upper);
            contenders.retain(|(_, b)| b.upper >= greedy.lower);
            contenders.push((action, q));
        }
    }

    (contenders.into_iter().map(|(a, _)| a).collect(), greedy)
}
