//! Running sufficient statistics for tree leaves and split candidates

use crate::types::{Bound, Normal};

/// Variances at or below this are treated as zero.
const VARIANCE_FLOOR: f64 = 1e-6;

/// Sum, sum of squares, extrema and count of a stream of outcomes
///
/// Empty extrema are `(+inf, -inf)` so that merging is plain `min`/`max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub sum: f64,
    pub sum_sq: f64,
    pub count: usize,
    pub min: f64,
    pub max: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            sum: 0.0,
            sum_sq: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Stats {
    pub fn push(&mut self, outcome: f64) {
        self.sum += outcome;
        self.sum_sq += outcome * outcome;
        self.count += 1;
        self.include_extrema(outcome, outcome);
    }

    pub fn merge(&mut self, other: &Stats) {
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.count += other.count;
        self.include_extrema(other.min, other.max);
    }

    pub fn include_extrema(&mut self, min: f64, max: f64) {
        self.min = self.min.min(min);
        self.max = self.max.max(max);
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Unbiased sample variance, floored to zero when negligible.
    pub fn sample_variance(&self) -> f64 {
        if self.count <= 1 {
            return 0.0;
        }
        let n = self.count as f64;
        let var = (self.sum_sq - self.sum * self.sum / n) / (n - 1.0);
        if var > VARIANCE_FLOOR { var } else { 0.0 }
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f64 {
        std_dev(self.count, self.sum, self.sum_sq)
    }

    pub fn distribution(&self) -> Normal {
        Normal::new(self.mean(), self.sample_variance())
    }

    /// Observed envelope; unbounded while nothing has been seen.
    pub fn bound(&self) -> Bound {
        if self.count == 0 {
            Bound::unbounded()
        } else {
            Bound {
                lower: self.min,
                upper: self.max,
            }
        }
    }
}

fn std_dev(count: usize, sum: f64, sum_sq: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let n = count as f64;
    ((sum_sq - sum * sum / n) / n).max(0.0).sqrt()
}

/// Outcome statistics on either side of a candidate split
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SplitStats {
    pub left: Stats,
    pub right: Stats,
}

impl SplitStats {
    pub fn count(&self) -> usize {
        self.left.count + self.right.count
    }

    /// Standard deviation reduction of splitting the combined sample.
    pub fn sdr(&self) -> f64 {
        let total = self.count();
        if total == 0 {
            return 0.0;
        }
        let unsplit = std_dev(
            total,
            self.left.sum + self.right.sum,
            self.left.sum_sq + self.right.sum_sq,
        );
        let n = total as f64;
        unsplit
            - (self.left.count as f64 / n * self.left.std_dev()
                + self.right.count as f64 / n * self.right.std_dev())
    }
}
