//! The "go right" corridor
//!
//! The agent walks a corridor of `length + 1` cells. Moving right costs 1,
//! except that moving right from the last cell while every prize indicator is
//! on pays a large prize. Indicators switch on when the agent enters the last
//! cell with the status variable at its highest level, then count in binary
//! while the agent stays, and reset when it leaves. The status variable cycles
//! through a fixed pattern of three levels independently of the agent.
//!
//! State layout: `[position, indicator_1..indicator_n, status, previous_status]`.
//! Status levels are multiples of `length / 2` plus a per-episode offset.
//!
//! [`GoRight`] is the exact dynamics. [`GoRightUncertain`] is the oracle a
//! planner may use instead of a learned model: it treats the status as
//! uniformly random and the indicators on entering the prize cell as coin
//! flips, and drops the previous status.

use crate::{
    error::{Error, Result},
    ports::{BbiPredictionModel, PredictionModel},
    q_function::TileCodingQFunction,
    rng::SmveRng,
    types::{Action, Bound, Normal, State, StateBound, point_bound},
};

const MAX_STATUS: usize = 2;
const LEFT: Action = 0;
const RIGHT: Action = 1;

/// Parameters shared by the exact and the uncertain model
#[derive(Debug, Clone, Copy, PartialEq)]
struct Corridor {
    length: usize,
    num_indicators: usize,
    prize_mult: f64,
}

impl Corridor {
    fn new(length: usize, num_indicators: usize, prize_mult: f64) -> Result<Self> {
        if length == 0 {
            return Err(Error::InvalidConfiguration {
                message: "go-right corridor needs a length of at least 1".to_string(),
            });
        }
        if num_indicators == 0 {
            return Err(Error::InvalidConfiguration {
                message: "go-right corridor needs at least one prize indicator".to_string(),
            });
        }
        Ok(Self {
            length,
            num_indicators,
            prize_mult,
        })
    }

    fn status_scale(&self) -> f64 {
        self.length as f64 / MAX_STATUS as f64
    }

    /// Positions at or beyond this are the prize cell.
    fn prize_edge(&self) -> f64 {
        self.length as f64 - 0.5
    }

    fn status_index(&self) -> usize {
        1 + self.num_indicators
    }

    fn prize(&self) -> f64 {
        let horizon = (self.length + MAX_STATUS) as i32;
        self.prize_mult * ((1.0 - 0.9f64.powi(horizon)) / 0.9f64.powi(horizon + 1)).ceil()
    }

    fn next_position(&self, position: f64, action: Action) -> f64 {
        let blocked = (position < 0.5 && action == LEFT)
            || (position >= self.prize_edge() && action == RIGHT);
        if blocked {
            position
        } else if action == RIGHT {
            position + 1.0
        } else {
            position - 1.0
        }
    }

    /// Indicators after staying in the prize cell: shift up by one and set
    /// the first to whether the rest were uniform and matched it.
    fn staying_indicators(&self, premise: &[f64]) -> Vec<f64> {
        let n = self.num_indicators;
        let rest = &premise[2..=n];
        let any_on = rest.iter().any(|&x| x > 0.5);
        let any_off = rest.iter().any(|&x| x <= 0.5);
        let first = premise[1];
        let flip = (!any_on && first < 0.5) || (!any_off && first >= 0.5);

        let mut next = Vec::with_capacity(n);
        next.push(if flip { 1.0 } else { 0.0 });
        next.extend_from_slice(&premise[1..n]);
        next
    }

    fn reward(&self, premise: &[f64], action: Action) -> f64 {
        let all_on = premise[1..=self.num_indicators].iter().all(|&x| x > 0.5);
        if action == RIGHT && all_on {
            self.prize()
        } else if action == RIGHT {
            -1.0
        } else {
            0.0
        }
    }
}

/// Exact go-right dynamics over `3 + num_indicators` dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct GoRight {
    corridor: Corridor,
}

impl GoRight {
    pub fn new(length: usize, num_indicators: usize, prize_mult: f64) -> Result<Self> {
        Ok(Self {
            corridor: Corridor::new(length, num_indicators, prize_mult)?,
        })
    }

    pub fn length(&self) -> usize {
        self.corridor.length
    }

    pub fn num_indicators(&self) -> usize {
        self.corridor.num_indicators
    }

    pub fn num_actions(&self) -> usize {
        2
    }

    /// Dimensions of a full observation.
    pub fn state_dim(&self) -> usize {
        3 + self.corridor.num_indicators
    }

    /// Dimensions a model has to predict; the previous status is left out.
    pub fn model_dim(&self) -> usize {
        2 + self.corridor.num_indicators
    }

    /// Reward for moving right from the prize cell with every indicator on.
    pub fn prize(&self) -> f64 {
        self.corridor.prize()
    }

    /// A randomized start near the left wall.
    ///
    /// The position is jittered by up to a quarter cell, both status values
    /// are drawn uniformly from the three levels, and both share an offset of
    /// up to a quarter level.
    pub fn initial_state(&self, rng: &mut SmveRng) -> State {
        let scale = self.corridor.status_scale();
        let levels = (MAX_STATUS + 1) as f64;

        let mut state = Vec::with_capacity(self.state_dim());
        state.push(rng.uniform() * 0.5 - 0.25);
        state.extend(std::iter::repeat_n(0.0, self.corridor.num_indicators));

        let prev_status = (rng.uniform() * levels).floor() * scale;
        let status = (rng.uniform() * levels).floor() * scale;
        let offset = rng.uniform() * scale / 2.0 - scale / 4.0;
        state.push(offset + status);
        state.push(offset + prev_status);
        state
    }

    /// Ranges and divisions of the value function's tiling: one cell per
    /// position, two per indicator and one per status level.
    pub fn tile_layout(&self) -> (Vec<Bound>, Vec<usize>) {
        let length = self.corridor.length as f64;
        let scale = self.corridor.status_scale();
        let n = self.corridor.num_indicators;

        let mut bounds = vec![Bound::new(-0.5, length + 0.5)];
        bounds.extend(std::iter::repeat_n(Bound::new(-0.25, 1.25), n));
        bounds.push(Bound::new(-0.5 * scale, scale * (MAX_STATUS as f64 + 0.5)));

        let mut divisions = vec![self.corridor.length + 1];
        divisions.extend(std::iter::repeat_n(2, n));
        divisions.push(MAX_STATUS + 1);
        (bounds, divisions)
    }

    /// Single-tiling value function over the first `2 + num_indicators`
    /// dimensions.
    pub fn q_function(&self, rng: &mut SmveRng) -> Result<TileCodingQFunction> {
        let (bounds, divisions) = self.tile_layout();
        TileCodingQFunction::new(bounds, divisions, 1, self.num_actions(), rng)
    }

    fn next_status(&self, status: f64, prev: f64) -> f64 {
        let scale = self.corridor.status_scale();
        let high = scale * (MAX_STATUS as f64 - 0.5);
        let max = MAX_STATUS as f64 * scale;

        // levels repeat 0 0 1 0 2 1 1 2 2
        if status == prev && status >= high {
            status - max
        } else if status == prev {
            status + scale
        } else if status > prev && status >= high {
            prev + scale
        } else if status > prev {
            prev
        } else if prev >= high {
            status
        } else {
            prev + scale
        }
    }
}

impl PredictionModel for GoRight {
    fn state_prediction(&self, premise: &[f64], action: Action) -> State {
        let c = &self.corridor;
        let n = c.num_indicators;
        let edge = c.prize_edge();
        let position = premise[0];
        let next_position = c.next_position(position, action);

        let status = premise[c.status_index()];
        let next_status = self.next_status(status, premise[c.status_index() + 1]);
        let high = c.status_scale() * (MAX_STATUS as f64 - 0.5);

        let indicators: Vec<f64> = if position < edge && next_position >= edge && next_status >= high {
            vec![1.0; n]
        } else if position >= edge && next_position >= edge {
            c.staying_indicators(premise)
        } else if position >= edge && next_position < edge {
            vec![0.0; n]
        } else {
            premise[1..=n].to_vec()
        };

        let mut next = Vec::with_capacity(self.state_dim());
        next.push(next_position);
        next.extend(indicators);
        next.push(next_status);
        next.push(status);
        next
    }

    fn reward_prediction(&self, premise: &[f64], action: Action) -> f64 {
        self.corridor.reward(premise, action)
    }

    fn term_prediction(&self, _premise: &[f64], _action: Action) -> f64 {
        0.0
    }
}

/// Oracle model of the corridor over `2 + num_indicators` dimensions
///
/// Knows the position and indicator rules exactly but treats the next status
/// as uniform over the three levels and, on entering the prize cell, each
/// indicator as on with probability 1/3.
#[derive(Debug, Clone, PartialEq)]
pub struct GoRightUncertain {
    corridor: Corridor,
}

impl GoRightUncertain {
    pub fn new(length: usize, num_indicators: usize, prize_mult: f64) -> Result<Self> {
        Ok(Self {
            corridor: Corridor::new(length, num_indicators, prize_mult)?,
        })
    }

    /// Oracle for the same corridor as `env`.
    pub fn matching(env: &GoRight) -> Self {
        Self {
            corridor: env.corridor,
        }
    }

    /// Status value with the same offset at level `level`.
    fn status_at(&self, status: f64, level: f64) -> f64 {
        let scale = self.corridor.status_scale();
        status + scale * (level - (status / scale).round())
    }
}

impl PredictionModel for GoRightUncertain {
    fn state_prediction(&self, premise: &[f64], action: Action) -> State {
        self.state_distribution(premise, action)
            .into_iter()
            .map(|d| d.mean)
            .collect()
    }

    fn reward_prediction(&self, premise: &[f64], action: Action) -> f64 {
        self.corridor.reward(premise, action)
    }

    fn term_prediction(&self, _premise: &[f64], _action: Action) -> f64 {
        0.0
    }

    fn state_bounds(&self, premise: &[f64], action: Action) -> (State, StateBound) {
        (
            self.state_prediction(premise, action),
            self.state_bounds_over(&point_bound(premise), &[action]),
        )
    }

    fn state_distribution(&self, premise: &[f64], action: Action) -> Vec<Normal> {
        let c = &self.corridor;
        let n = c.num_indicators;
        let edge = c.prize_edge();
        let scale = c.status_scale();
        let position = premise[0];
        let next_position = c.next_position(position, action);
        let status = premise[c.status_index()];

        let levels = MAX_STATUS as f64;
        let status_dist = Normal::new(
            self.status_at(status, levels / 2.0),
            scale * scale * levels * (levels + 2.0) / 12.0,
        );

        let p_on = 1.0 / (levels + 1.0);
        let indicators: Vec<Normal> = if position < edge && next_position >= edge {
            vec![Normal::new(p_on, p_on * (1.0 - p_on)); n]
        } else if position >= edge && next_position >= edge {
            c.staying_indicators(premise)
                .into_iter()
                .map(Normal::deterministic)
                .collect()
        } else if position >= edge && next_position < edge {
            vec![Normal::deterministic(0.0); n]
        } else {
            premise[1..=n].iter().copied().map(Normal::deterministic).collect()
        };

        let mut dist = Vec::with_capacity(2 + n);
        dist.push(Normal::deterministic(next_position));
        dist.extend(indicators);
        dist.push(status_dist);
        dist
    }

    fn state_sample(&self, premise: &[f64], action: Action, rng: &mut SmveRng) -> State {
        let c = &self.corridor;
        let n = c.num_indicators;
        let edge = c.prize_edge();
        let position = premise[0];
        let next_position = c.next_position(position, action);
        let status = premise[c.status_index()];

        let level = rng.index(MAX_STATUS + 1) as f64;
        let next_status = self.status_at(status, level);

        let indicators: Vec<f64> = if position < edge && next_position >= edge {
            let p_on = 1.0 / (MAX_STATUS + 1) as f64;
            (0..n)
                .map(|_| if rng.uniform() < p_on { 1.0 } else { 0.0 })
                .collect()
        } else if position >= edge && next_position >= edge {
            c.staying_indicators(premise)
        } else if position >= edge && next_position < edge {
            vec![0.0; n]
        } else {
            premise[1..=n].to_vec()
        };

        let mut next = Vec::with_capacity(2 + n);
        next.push(next_position);
        next.extend(indicators);
        next.push(next_status);
        next
    }

    fn as_bbi(&self) -> Option<&dyn BbiPredictionModel> {
        Some(self)
    }
}

impl BbiPredictionModel for GoRightUncertain {
    fn state_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> StateBound {
        let c = &self.corridor;
        let n = c.num_indicators;
        let edge = c.prize_edge();
        let scale = c.status_scale();
        let position = premise[0];

        let (low, high) = match actions {
            [action] => (
                c.next_position(position.lower, *action),
                c.next_position(position.upper, *action),
            ),
            _ => (
                if position.lower >= 0.5 {
                    position.lower - 1.0
                } else {
                    position.lower
                },
                if position.upper >= edge {
                    position.upper
                } else {
                    position.upper + 1.0
                },
            ),
        };

        // the status may land on any level but keeps its offset
        let status = premise[c.status_index()].upper;
        let offset = status - (status / scale).round() * scale;
        let status_bound = Bound::new(offset, offset + scale * MAX_STATUS as f64);

        let mut indicators: Vec<Bound> = premise[1..=n].to_vec();
        if position.upper >= edge && high >= edge {
            let rest = &premise[2..=n];
            let all_off = rest.iter().all(|b| b.upper < 0.5);
            let maybe_all_off = rest.iter().all(|b| b.lower < 0.5);
            let all_on = rest.iter().all(|b| b.lower >= 0.5);
            let maybe_all_on = rest.iter().all(|b| b.upper >= 0.5);
            let first = premise[1];

            let mut staying = Vec::with_capacity(n);
            staying.push(
                if (all_on && first.lower >= 0.5) || (all_off && first.upper < 0.5) {
                    Bound::point(1.0)
                } else if (maybe_all_on && first.upper >= 0.5) || (maybe_all_off && first.lower < 0.5) {
                    Bound::new(0.0, 1.0)
                } else {
                    Bound::point(0.0)
                },
            );
            staying.extend_from_slice(&premise[1..n]);
            indicators = staying;

            if low < edge {
                // might be leaving
                for b in &mut indicators {
                    b.lower = 0.0;
                }
            }
            if position.lower < edge {
                // might be arriving
                for b in &mut indicators {
                    b.upper = 1.0;
                }
            }
        } else if high >= edge {
            indicators = vec![Bound::new(0.0, 1.0); n];
        } else if low < edge {
            indicators = vec![Bound::point(0.0); n];
        }

        let mut bounds = Vec::with_capacity(2 + n);
        bounds.push(Bound::new(low, high));
        bounds.extend(indicators.into_iter().map(Bound::normalized));
        bounds.push(status_bound);
        bounds
    }

    fn reward_bounds_over(&self, premise: &[Bound], actions: &[Action]) -> Bound {
        if actions == [LEFT] {
            return Bound::point(0.0);
        }
        let indicators = &premise[1..=self.corridor.num_indicators];
        let all_on = indicators.iter().all(|b| b.lower >= 0.5);
        let maybe_all_on = indicators.iter().all(|b| b.upper >= 0.5);
        let prize = self.corridor.prize();

        if actions == [RIGHT] {
            if all_on {
                Bound::point(prize)
            } else if maybe_all_on {
                Bound::new(-1.0, prize)
            } else {
                Bound::point(-1.0)
            }
        } else if all_on {
            Bound::new(0.0, prize)
        } else if maybe_all_on {
            Bound::new(-1.0, prize)
        } else {
            Bound::new(-1.0, 0.0)
        }
    }

    fn term_bounds_over(&self, _premise: &[Bound], _actions: &[Action]) -> Bound {
        Bound::point(0.0)
    }
}
