//! Sparse multi-grid linear value function
//!
//! Each of `num_tilings` grids covers the configured state box, shifted by a
//! random per-tiling offset. A state activates one cell per tiling and its
//! value is the sum of those cells' weights.
//!
//! Weights are stored sparsely: every tiling owns a trie keyed by the cell
//! coordinate one dimension per level, and a cell exists only after its first
//! nonzero update. Interval queries walk the trie over the range of cells a
//! state bound can touch; a missing subtree contributes exactly zero without
//! being visited, which keeps bounds over unexplored regions cheap.

use tracing::trace;

use crate::{
    error::{Error, Result},
    ports::QFunction,
    rng::SmveRng,
    types::{Action, Bound},
};

/// Child slots of one trie level, indexed by cell coordinate.
///
/// On the last level the slots index into the leaf arena.
type Branch = Vec<Option<usize>>;

#[derive(Debug, Clone, Copy)]
struct CellRange {
    lower: usize,
    upper: usize,
}

#[derive(Debug, Clone)]
pub struct TileCodingQFunction {
    dim_bounds: Vec<Bound>,
    grid_sizes: Vec<usize>,
    cell_sizes: Vec<f64>,
    /// Per tiling, per dimension additive offset applied before quantizing
    offsets: Vec<Vec<f64>>,
    num_actions: usize,
    branches: Vec<Branch>,
    leaves: Vec<Vec<f64>>,
    roots: Vec<usize>,
}

impl TileCodingQFunction {
    /// Build a tile coder over `dim_bounds`.
    ///
    /// A dimension with more than one division gets `divisions + 1` cells per
    /// tiling so that offset grids still cover the whole range; a dimension
    /// with a single division is ignored. Offsets are drawn from a generator
    /// derived from `rng`.
    pub fn new(
        dim_bounds: Vec<Bound>,
        num_divisions: Vec<usize>,
        num_tilings: usize,
        num_actions: usize,
        rng: &mut SmveRng,
    ) -> Result<Self> {
        if dim_bounds.is_empty() {
            return Err(Error::InvalidConfiguration {
                message: "tile coding needs at least one state dimension".to_string(),
            });
        }
        if dim_bounds.len() != num_divisions.len() {
            return Err(Error::DimensionMismatch {
                expected: dim_bounds.len(),
                got: num_divisions.len(),
                context: "tile coding divisions".to_string(),
            });
        }
        if num_tilings == 0 || num_actions == 0 {
            return Err(Error::InvalidConfiguration {
                message: format!(
                    "tile coding needs at least one tiling and one action (got {num_tilings} tilings, {num_actions} actions)"
                ),
            });
        }
        if let Some(dim) = num_divisions.iter().position(|&d| d == 0) {
            return Err(Error::InvalidConfiguration {
                message: format!("dimension {dim} has zero divisions"),
            });
        }
        if let Some(dim) = dim_bounds
            .iter()
            .position(|b| !(b.lower.is_finite() && b.upper.is_finite() && b.upper > b.lower))
        {
            return Err(Error::InvalidConfiguration {
                message: format!(
                    "dimension {dim} needs a finite, non-empty range, got {}",
                    dim_bounds[dim]
                ),
            });
        }

        let mut rng = rng.derive();

        let cell_sizes: Vec<f64> = dim_bounds
            .iter()
            .zip(&num_divisions)
            .map(|(b, &d)| b.width() / d as f64)
            .collect();

        let offsets = (0..num_tilings)
            .map(|_| {
                dim_bounds
                    .iter()
                    .zip(&num_divisions)
                    .zip(&cell_sizes)
                    .map(|((b, &d), &cell)| {
                        if d > 1 && num_tilings > 1 {
                            -b.lower + rng.uniform() * cell
                        } else {
                            -b.lower
                        }
                    })
                    .collect()
            })
            .collect();

        let grid_sizes: Vec<usize> = num_divisions
            .iter()
            .map(|&d| if d > 1 { d + 1 } else { 1 })
            .collect();

        let branches: Vec<Branch> = (0..num_tilings)
            .map(|_| vec![None; grid_sizes[0]])
            .collect();
        let roots = (0..num_tilings).collect();

        Ok(Self {
            dim_bounds,
            grid_sizes,
            cell_sizes,
            offsets,
            num_actions,
            branches,
            leaves: Vec::new(),
            roots,
        })
    }

    pub fn num_tilings(&self) -> usize {
        self.roots.len()
    }

    pub fn num_dims(&self) -> usize {
        self.dim_bounds.len()
    }

    /// Number of cells that have been materialized across all tilings.
    pub fn materialized_cells(&self) -> usize {
        self.leaves.len()
    }

    fn cell(&self, tiling: usize, dim: usize, value: f64) -> usize {
        let size = self.grid_sizes[dim];
        if size == 1 {
            return 0;
        }
        let bound = self.dim_bounds[dim];
        let clipped = value.clamp(bound.lower, bound.upper);
        let index = ((clipped + self.offsets[tiling][dim]) / self.cell_sizes[dim]).ceil() - 1.0;
        if index > 0.0 {
            (index as usize).min(size - 1)
        } else {
            0
        }
    }

    fn coordinates(&self, tiling: usize, state: &[f64]) -> Vec<usize> {
        (0..self.num_dims())
            .map(|dim| self.cell(tiling, dim, state[dim]))
            .collect()
    }

    fn cell_ranges(&self, tiling: usize, state_bound: &[Bound]) -> Vec<CellRange> {
        (0..self.num_dims())
            .map(|dim| {
                let bound = state_bound[dim].normalized();
                CellRange {
                    lower: self.cell(tiling, dim, bound.lower),
                    upper: self.cell(tiling, dim, bound.upper),
                }
            })
            .collect()
    }

    fn leaf(&self, tiling: usize, coords: &[usize]) -> Option<&[f64]> {
        let mut slot = self.roots[tiling];
        for &cell in coords {
            slot = self.branches[slot][cell]?;
        }
        Some(&self.leaves[slot])
    }

    fn materialize(&mut self, tiling: usize, coords: &[usize]) -> usize {
        let last = coords.len() - 1;
        let mut node = self.roots[tiling];
        for (dim, &cell) in coords[..last].iter().enumerate() {
            node = match self.branches[node][cell] {
                Some(child) => child,
                None => {
                    let child = self.branches.len();
                    self.branches.push(vec![None; self.grid_sizes[dim + 1]]);
                    self.branches[node][cell] = Some(child);
                    child
                }
            };
        }
        match self.branches[node][coords[last]] {
            Some(leaf) => leaf,
            None => {
                let leaf = self.leaves.len();
                self.leaves.push(vec![0.0; self.num_actions]);
                self.branches[node][coords[last]] = Some(leaf);
                leaf
            }
        }
    }

    /// Widen `acc` to cover every weight in the hyper-rectangle `ranges`
    /// below `node`, which sits at level `dim`.
    fn extend_weight_bounds(&self, node: usize, dim: usize, ranges: &[CellRange], acc: &mut [Bound]) {
        let range = ranges[dim];
        let last_level = dim + 1 == ranges.len();
        let mut unvisited = false;

        for cell in range.lower..=range.upper {
            match self.branches[node][cell] {
                Some(leaf) if last_level => {
                    for (bound, &w) in acc.iter_mut().zip(&self.leaves[leaf]) {
                        bound.lower = bound.lower.min(w);
                        bound.upper = bound.upper.max(w);
                    }
                }
                Some(child) => self.extend_weight_bounds(child, dim + 1, ranges, acc),
                None => unvisited = true,
            }
        }

        if unvisited {
            for bound in acc.iter_mut() {
                *bound = bound.including_zero();
            }
        }
    }
}

impl QFunction for TileCodingQFunction {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn q(&self, state: &[f64], action: Action) -> f64 {
        (0..self.num_tilings())
            .filter_map(|tiling| {
                let coords = self.coordinates(tiling, state);
                self.leaf(tiling, &coords).map(|w| w[action])
            })
            .sum()
    }

    fn all_action_qs(&self, state: &[f64]) -> Vec<f64> {
        let mut values = vec![0.0; self.num_actions];
        for tiling in 0..self.num_tilings() {
            let coords = self.coordinates(tiling, state);
            if let Some(weights) = self.leaf(tiling, &coords) {
                for (value, w) in values.iter_mut().zip(weights) {
                    *value += w;
                }
            }
        }
        values
    }

    fn q_bound(&self, state_bound: &[Bound], action: Action) -> Bound {
        self.all_action_q_bounds(state_bound)[action]
    }

    fn all_action_q_bounds(&self, state_bound: &[Bound]) -> Vec<Bound> {
        let mut totals = vec![Bound::point(0.0); self.num_actions];
        for tiling in 0..self.num_tilings() {
            let ranges = self.cell_ranges(tiling, state_bound);
            let mut weights = vec![
                Bound {
                    lower: f64::INFINITY,
                    upper: f64::NEG_INFINITY,
                };
                self.num_actions
            ];
            self.extend_weight_bounds(self.roots[tiling], 0, &ranges, &mut weights);
            for (total, w) in totals.iter_mut().zip(weights) {
                *total += w;
            }
        }
        totals
    }

    fn update_q(&mut self, state: &[f64], action: Action, change: f64) {
        if change == 0.0 {
            return;
        }
        for tiling in 0..self.num_tilings() {
            let coords = self.coordinates(tiling, state);
            trace!(tiling, ?coords, action, change, "tile update");
            let leaf = self.materialize(tiling, &coords);
            self.leaves[leaf][action] += change;
        }
    }

    fn step_size_normalizer(&self) -> f64 {
        self.num_tilings() as f64
    }
}
