//! Interpolation and rebinning primitives shared by every table kind.
//!
//! All functions work on plain slices so that the hot loops of the table
//! operations can call them on rows of larger arrays without copying.
//!
//! Conventions:
//!
//! ```text
//!   grid:     g[0] < g[1] < ... < g[n-1]
//!   index i:  the upper node of the bracketing pair (g[i-1], g[i])
//!   weight w: (x - g[i-1]) / (g[i] - g[i-1]), in [0, 1]
//! ```

use std::ops::Range;

/// First index `i` such that `a[i] >= x` (numpy `searchsorted(side="left")`).
pub fn searchsorted_left(a: &[f64], x: f64) -> usize {
    a.partition_point(|&v| v < x)
}

/// First index `i` such that `a[i] > x` (numpy `searchsorted(side="right")`).
pub fn searchsorted_right(a: &[f64], x: f64) -> usize {
    a.partition_point(|&v| v <= x)
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be non-decreasing. Outside `[xp[0], xp[n-1]]` the boundary
/// values are returned.
///
/// # Panics
///
/// Panics if `xp` is empty or if `xp` and `fp` have different lengths.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    assert!(!xp.is_empty(), "interp needs at least one point");
    assert_eq!(xp.len(), fp.len(), "xp and fp must have the same length");
    let n = xp.len();
    if x < xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // xp[j] <= x < xp[j + 1], so the denominator is strictly positive
    let j = searchsorted_right(xp, x) - 1;
    let slope = (fp[j + 1] - fp[j]) / (xp[j + 1] - xp[j]);
    fp[j] + slope * (x - xp[j])
}

/// Interpolates `(xp, fp)` at every point of `x` into `out`.
pub fn interp_into(x: &[f64], xp: &[f64], fp: &[f64], out: &mut [f64]) {
    for (o, &xi) in out.iter_mut().zip(x) {
        *o = interp(xi, xp, fp);
    }
}

/// Bracketing index and weight of `x` on an ascending `grid`.
///
/// `x` is first clamped to the grid extent, so out-of-range queries get the
/// same result as a query exactly at the nearest boundary. A single-node grid
/// always yields `(0, 0.0)`.
pub fn interp_ind_weights(x: f64, grid: &[f64]) -> (usize, f64) {
    let n = grid.len();
    if n < 2 {
        return (0, 0.0);
    }
    let used = x.clamp(grid[0], grid[n - 1]);
    let i = searchsorted_left(grid, used).max(1);
    (i, (used - grid[i - 1]) / (grid[i] - grid[i - 1]))
}

/// Bilinear interpolation between four corner values.
///
/// `z10` sits at the upper end of the first axis, `z01` at the upper end of
/// the second one; `x` and `y` are the weights along those axes.
pub fn bilinear(z00: f64, z10: f64, z01: f64, z11: f64, x: f64, y: f64) -> f64 {
    (z11 - z01 + z00 - z10) * x * y + (z01 - z00) * y + (z10 - z00) * x + z00
}

/// Evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Running sum of `values`.
pub fn cumsum(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, &v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

/// Fills `indices` with the permutation sorting `values` ascending.
///
/// The sort is stable and uses a total order, so NaNs go last.
pub fn argsort_into(values: &[f64], indices: &mut Vec<usize>) {
    indices.clear();
    indices.extend(0..values.len());
    indices.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
}

/// Checks that `values` is strictly increasing.
pub fn is_strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

/// Old bins covering each new bin, with the fraction each contributes.
///
/// For new bin `ii`, the old bins are `plan.contributing(ii)` and
/// `plan.weights[ii]` has one normalized weight per old bin in that range.
#[derive(Debug, Clone, PartialEq)]
pub struct RebinPlan {
    pub indices: Vec<usize>,
    pub weights: Vec<Vec<f64>>,
}

impl RebinPlan {
    /// Range of old bins contributing to new bin `ii`.
    pub fn contributing(&self, ii: usize) -> Range<usize> {
        let start = self.indices[ii].saturating_sub(1);
        let end = self.indices[ii + 1].max(start + 1);
        start..end
    }

    /// Number of new bins.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Computes which old bins overlap each new bin and by how much.
///
/// Both grids are bin edges. New edges are expected to lie inside the old
/// grid. A new bin lying entirely inside one old bin gets that bin with
/// weight 1.
pub fn rebin_ind_weights(old_edges: &[f64], new_edges: &[f64]) -> RebinPlan {
    let n_old = old_edges.len();
    let mut indices: Vec<usize> = new_edges
        .iter()
        .map(|&e| searchsorted_right(old_edges, e))
        .collect();
    if let Some(last) = indices.last_mut() {
        if *last == n_old {
            *last -= 1;
        }
    }
    let weights = (0..new_edges.len().saturating_sub(1))
        .map(|ig| {
            let (lo, hi) = (indices[ig], indices[ig + 1]);
            let mut w = if hi > lo {
                let mut w = Vec::with_capacity(hi - lo + 1);
                w.push(old_edges[lo] - new_edges[ig]);
                w.extend((lo..hi - 1).map(|i| old_edges[i + 1] - old_edges[i]));
                w.push(new_edges[ig + 1] - old_edges[hi - 1]);
                w
            } else {
                vec![new_edges[ig + 1] - new_edges[ig]]
            };
            let total: f64 = w.iter().sum();
            if total > 0.0 {
                w.iter_mut().for_each(|v| *v /= total);
            }
            w
        })
        .collect();
    RebinPlan { indices, weights }
}

/// Averages a function given on fine cells over coarser cells.
///
/// `f_fine[i]` is the value on the fine cell starting at `fine_edges[i]`.
/// Coarse cells falling inside a single fine cell take its value.
pub fn rebin(f_fine: &[f64], fine_edges: &[f64], coarse_edges: &[f64]) -> Vec<f64> {
    let n_fine = fine_edges.len();
    let mut indices: Vec<usize> = coarse_edges
        .iter()
        .map(|&e| searchsorted_right(fine_edges, e))
        .collect();
    if indices.last() == Some(&n_fine) {
        indices.iter_mut().for_each(|i| *i = (*i).min(n_fine - 1));
    }
    let n_coarse = coarse_edges.len().saturating_sub(1);
    let mut f_coarse = vec![0.0; n_coarse];
    let mut ifine = indices[0].saturating_sub(1);
    for ii in 0..n_coarse {
        if indices[ii + 1] > indices[ii] {
            let mut tmp_w = fine_edges[ifine + 1] - coarse_edges[ii];
            let mut tmp_f = f_fine[ifine] * tmp_w;
            for k in indices[ii]..indices[ii + 1] - 1 {
                let dw = fine_edges[k + 1] - fine_edges[k];
                tmp_f += dw * f_fine[k];
                tmp_w += dw;
            }
            ifine = indices[ii + 1] - 1;
            let dw = coarse_edges[ii + 1] - fine_edges[ifine];
            tmp_f += f_fine[ifine] * dw;
            tmp_w += dw;
            f_coarse[ii] = if tmp_w != 0.0 {
                tmp_f / tmp_w
            } else {
                f_fine[ifine]
            };
        } else {
            f_coarse[ii] = f_fine[ifine];
        }
    }
    f_coarse
}
