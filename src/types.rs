//! Shared value types: states, intervals and distribution summaries
//!
//! A [`State`] is an opaque fixed-length real vector. Interval queries work
//! on a [`StateBound`], one [`Bound`] per state dimension.

use std::{
    fmt,
    ops::{Add, AddAssign},
};

use serde::{Deserialize, Serialize};

/// Index of a discrete action
pub type Action = usize;

/// Real-valued observation vector
pub type State = Vec<f64>;

/// Per-dimension interval over states
pub type StateBound = Vec<Bound>;

/// Closed scalar interval `[lower, upper]`
///
/// The invariant `lower <= upper` is restored by swapping whenever a bound is
/// built from possibly-inverted values. Early in training, learned models do
/// not always produce monotonic bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    /// Create a bound, swapping the ends if they are inverted.
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }.normalized()
    }

    /// Zero-width bound around a single value.
    pub fn point(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    /// The bound that contains every real value.
    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    /// Return the bound with `lower <= upper`.
    pub fn normalized(self) -> Self {
        if self.upper < self.lower {
            Self {
                lower: self.upper,
                upper: self.lower,
            }
        } else {
            self
        }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Smallest bound containing both `self` and `other`.
    pub fn union(&self, other: &Bound) -> Bound {
        Bound {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Widen the bound so that it contains zero.
    pub fn including_zero(&self) -> Bound {
        Bound {
            lower: self.lower.min(0.0),
            upper: self.upper.max(0.0),
        }
    }

    /// Shift both ends by `offset`.
    pub fn shift(&self, offset: f64) -> Bound {
        Bound {
            lower: self.lower + offset,
            upper: self.upper + offset,
        }
    }
}

impl Add for Bound {
    type Output = Bound;

    /// Sum of independent bounds is a bound on the sum.
    fn add(self, other: Bound) -> Bound {
        Bound {
            lower: self.lower + other.lower,
            upper: self.upper + other.upper,
        }
    }
}

impl AddAssign for Bound {
    fn add_assign(&mut self, other: Bound) {
        self.lower += other.lower;
        self.upper += other.upper;
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lower, self.upper)
    }
}

/// Zero-width state bound around a concrete state.
pub fn point_bound(state: &[f64]) -> StateBound {
    state.iter().copied().map(Bound::point).collect()
}

/// Mean and variance of a scalar prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normal {
    pub mean: f64,
    pub var: f64,
}

impl Normal {
    pub fn new(mean: f64, var: f64) -> Self {
        Self { mean, var }
    }

    /// Degenerate distribution concentrated on `mean`.
    pub fn deterministic(mean: f64) -> Self {
        Self { mean, var: 0.0 }
    }
}

/// Point prediction paired with a scalar uncertainty
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredUnc {
    pub pred: f64,
    pub uncertainty: f64,
}
