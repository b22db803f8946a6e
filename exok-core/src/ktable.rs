//! Correlated-k tables.
//!
//! A [`CorrelatedKTable`] stores, for every (p, t) node and wavenumber bin, the
//! k-distribution of the bin sampled at the quadrature abscissas. It is a
//! [`SpectralTable`] with a g axis, and derefs to it for every shared
//! operation.

use crate::errors::{ExokError, ExokResult};
use crate::interp::{argsort_into, interp, linspace, rebin, searchsorted_left, RebinPlan};
use crate::overlap::Resampling;
use crate::quadrature::QuadratureGrid;
use crate::settings::Settings;
use crate::spectral_grid::SpectralGrid;
use crate::table::{SpectralTable, TableKind, TableMetadata, TableParts, VmrField};
use ndarray::{s, Array2, Array5, ArrayViewMut1};
use std::ops::{Deref, DerefMut};

#[derive(Clone, Debug)]
pub struct CorrelatedKTable(SpectralTable);

impl Deref for CorrelatedKTable {
    type Target = SpectralTable;

    fn deref(&self) -> &SpectralTable {
        &self.0
    }
}

impl DerefMut for CorrelatedKTable {
    fn deref_mut(&mut self) -> &mut SpectralTable {
        &mut self.0
    }
}

impl TryFrom<SpectralTable> for CorrelatedKTable {
    type Error = ExokError;

    fn try_from(table: SpectralTable) -> ExokResult<Self> {
        match table.kind() {
            TableKind::CorrelatedK => Ok(Self(table)),
            kind => Err(ExokError::Configuration(format!(
                "expected a correlated-k table, found a {kind:?} table"
            ))),
        }
    }
}

impl From<CorrelatedKTable> for SpectralTable {
    fn from(table: CorrelatedKTable) -> Self {
        table.0
    }
}

impl CorrelatedKTable {
    /// Builds a table from values indexed `[p][t][x = 1][w][g]`.
    pub fn from_parts(parts: TableParts, settings: &Settings) -> ExokResult<Self> {
        Self::try_from(SpectralTable::from_parts(parts, settings)?)
    }

    pub fn into_table(self) -> SpectralTable {
        self.0
    }

    pub fn as_table(&self) -> &SpectralTable {
        &self.0
    }

    /// The quadrature of the table.
    pub fn g_grid(&self) -> &QuadratureGrid {
        match self.0.quadrature() {
            Some(q) => q,
            None => unreachable!("correlated-k tables always have a quadrature"),
        }
    }

    /// Computes k-distributions from a high-resolution cross-section table.
    ///
    /// When `mid_dw` is set each fine point covers half the distance to its
    /// neighbours and the first and last points are dropped, otherwise each
    /// point covers the interval up to the next one and the last point is
    /// dropped. Coarse bins that no fine point falls into are left at zero.
    ///
    /// # Errors
    ///
    /// `Configuration` if `hires` is not a cross-section table, `InvalidGrid`
    /// for bad coarse edges or too few fine points.
    pub fn build_from_spectrum(
        hires: &SpectralTable,
        coarse_edges: &[f64],
        quadrature: &QuadratureGrid,
        mid_dw: bool,
    ) -> ExokResult<Self> {
        if hires.kind() != TableKind::CrossSection {
            return Err(ExokError::Configuration(
                "k-distributions are built from a cross-section table".to_string(),
            ));
        }
        let grid = SpectralGrid::from_edges(coarse_edges.to_vec())?;
        let wns = hires.grid().centers();
        let n = wns.len();
        if n < 3 {
            return Err(ExokError::InvalidGrid(
                "a high-resolution spectrum needs at least three points".to_string(),
            ));
        }
        let (fine, wn_hr, dwn_hr): (std::ops::Range<usize>, Vec<f64>, Vec<f64>) = if mid_dw {
            (
                1..n - 1,
                wns[1..n - 1].to_vec(),
                wns.windows(3).map(|w| 0.5 * (w[2] - w[0])).collect(),
            )
        } else {
            (
                0..n - 1,
                wns[..n - 1].to_vec(),
                wns.windows(2).map(|w| w[1] - w[0]).collect(),
            )
        };
        let [np, nt, ..] = hires.shape();
        let mut values = Array5::<f64>::zeros((np, nt, 1, grid.len(), quadrature.len()));
        let mut warned = false;
        for ip in 0..np {
            for it in 0..nt {
                let k_hr: Vec<f64> = hires
                    .values()
                    .slice(s![ip, it, 0, fine.clone(), 0])
                    .iter()
                    .copied()
                    .collect();
                let (kdist, empty) =
                    from_spectrum_single(&k_hr, &wn_hr, &dwn_hr, grid.edges(), quadrature);
                if empty > 0 && !warned {
                    log::warn!(
                        "{empty} of {} bins of {} contain no high-resolution point and are left at zero",
                        grid.len(),
                        hires.molecule()
                    );
                    warned = true;
                }
                values.slice_mut(s![ip, it, 0, .., ..]).assign(&kdist);
            }
        }
        let mut metadata = TableMetadata::new(hires.molecule());
        metadata.method = quadrature.sampling_method().to_string();
        let parts = TableParts {
            metadata,
            pressure: hires.pressure().to_vec(),
            temperature: hires.temperature().to_vec(),
            mixing_ratio: None,
            grid,
            quadrature: Some(quadrature.clone()),
            values,
            pressure_unit: hires.pressure_unit().clone(),
            value_unit: hires.value_unit().clone(),
        };
        Self::from_parts(parts, hires.settings())
    }

    /// New table for the random overlap of this table and `other`, each
    /// multiplied by its mixing ratio.
    pub fn combine_with(
        &self,
        other: &CorrelatedKTable,
        x_self: &VmrField,
        x_other: &VmrField,
        resampling: Resampling,
    ) -> ExokResult<Self> {
        Ok(Self(self.0.combine_with(&other.0, x_self, x_other, resampling)?))
    }
}

/// k-distributions `[Nw, Ng]` of one high-resolution spectrum.
///
/// `k_hr`, `wn_hr` and `dwn_hr` are the values, wavenumbers and widths of the
/// fine points; fine point `i` belongs to bin `b` if
/// `edges[b] <= wn_hr[i] < edges[b+1]`. Also returns the number of bins
/// without any fine point, which are left at zero.
pub fn from_spectrum_single(
    k_hr: &[f64],
    wn_hr: &[f64],
    dwn_hr: &[f64],
    edges: &[f64],
    quadrature: &QuadratureGrid,
) -> (Array2<f64>, usize) {
    let nw = edges.len().saturating_sub(1);
    let mut kdata = Array2::<f64>::zeros((nw, quadrature.len()));
    let pos: Vec<usize> = edges.iter().map(|&e| searchsorted_left(wn_hr, e)).collect();
    let mut order = Vec::new();
    let mut cumulative_g = Vec::new();
    let mut sorted_k = Vec::new();
    let mut empty = 0;
    for (ib, mut row) in kdata.outer_iter_mut().enumerate() {
        let bin = pos[ib]..pos[ib + 1];
        if bin.is_empty() {
            empty += 1;
            continue;
        }
        let k = &k_hr[bin.clone()];
        let dwn = &dwn_hr[bin];
        let total: f64 = dwn.iter().sum();
        argsort_into(k, &mut order);
        cumulative_g.clear();
        sorted_k.clear();
        let mut g = 0.0;
        for &i in &order {
            g += dwn[i] / total;
            cumulative_g.push(g);
            sorted_k.push(k[i]);
        }
        for (kd, &gi) in row.iter_mut().zip(quadrature.abscissas()) {
            *kd = interp(gi, &cumulative_g, &sorted_k);
        }
    }
    (kdata, empty)
}

/// Recombines k-distributions on coarser bins.
///
/// For new bin `first + iw`, the old bins of `plan.contributing(iw)` with a
/// positive weight are merged: the cumulative g of each old distribution is
/// read on a common fine ln(k) grid, weighted by the overlap and summed, and
/// the sum is inverted at the new abscissas.
#[allow(clippy::too_many_arguments)]
pub(crate) fn bin_down_kcoeff(
    values: &Array5<f64>,
    old_quadrature: &QuadratureGrid,
    new_quadrature: &QuadratureGrid,
    plan: &RebinPlan,
    first: usize,
    nw_new: usize,
    settings: &Settings,
    resampling: Resampling,
) -> Array5<f64> {
    let (np, nt, nx) = (values.shape()[0], values.shape()[1], values.shape()[2]);
    let mut out = Array5::<f64>::zeros((np, nt, nx, nw_new, new_quadrature.len()));
    let same_quadrature = old_quadrature == new_quadrature;
    let mut kernel = LogKMerger::new(old_quadrature, new_quadrature, settings, resampling);
    for iw in 0..plan.len() {
        let bins: Vec<(usize, f64)> = plan
            .contributing(iw)
            .zip(&plan.weights[iw])
            .filter(|(_, w)| **w > 0.0)
            .map(|(j, &w)| (j, w))
            .collect();
        if bins.is_empty() {
            continue;
        }
        for ip in 0..np {
            for it in 0..nt {
                for ix in 0..nx {
                    let dest = out.slice_mut(s![ip, it, ix, first + iw, ..]);
                    let old = values.slice(s![ip, it, ix, .., ..]);
                    if same_quadrature && bins.len() == 1 {
                        let mut dest = dest;
                        dest.assign(&old.row(bins[0].0));
                        continue;
                    }
                    kernel.merge(&bins, |j| old.row(j).to_vec(), dest);
                }
            }
        }
    }
    out
}

/// Scratch space for merging k-distributions in log(k).
struct LogKMerger<'q> {
    g_0_to_1: Vec<f64>,
    new_quadrature: &'q QuadratureGrid,
    resampling: Resampling,
    points: usize,
    margin_cells: f64,
    decades: f64,
    log_k_grid: Vec<f64>,
    k_grid: Vec<f64>,
    cumulative_g: Vec<f64>,
}

impl<'q> LogKMerger<'q> {
    fn new(
        old_quadrature: &QuadratureGrid,
        new_quadrature: &'q QuadratureGrid,
        settings: &Settings,
        resampling: Resampling,
    ) -> Self {
        let points = settings.bin_down.log_k_points;
        Self {
            g_0_to_1: old_quadrature.abscissas_0_to_1(),
            new_quadrature,
            resampling,
            points,
            margin_cells: settings.bin_down.log_k_margin_cells,
            decades: settings.remove_zeros_decades,
            log_k_grid: Vec::with_capacity(points),
            k_grid: Vec::with_capacity(points),
            cumulative_g: vec![0.0; points],
        }
    }

    fn merge(
        &mut self,
        bins: &[(usize, f64)],
        k_of: impl Fn(usize) -> Vec<f64>,
        mut dest: ArrayViewMut1<f64>,
    ) {
        let distributions: Vec<(Vec<f64>, f64)> =
            bins.iter().map(|&(j, w)| (k_of(j), w)).collect();
        let k_max = distributions
            .iter()
            .filter_map(|(k, _)| k.last().copied())
            .fold(f64::NEG_INFINITY, f64::max);
        if k_max <= 0.0 {
            dest.fill(0.0);
            return;
        }
        // zeros have no logarithm; floor them below the smallest positive k
        let min_positive = distributions
            .iter()
            .flat_map(|(k, _)| k.iter().copied())
            .filter(|&k| k > 0.0)
            .fold(f64::INFINITY, f64::min);
        let floor = min_positive / 10f64.powf(self.decades);
        let log_k = |k: f64| k.max(floor).ln();

        let l_min = distributions
            .iter()
            .map(|(k, _)| log_k(k[0]))
            .fold(f64::INFINITY, f64::min);
        let l_max = log_k(k_max);
        if l_min == l_max {
            dest.fill(l_max.exp());
            return;
        }
        let pad = (l_max - l_min) / (self.points as f64 - self.margin_cells);
        self.log_k_grid = linspace(l_min - pad, l_max + pad, self.points);
        self.k_grid.clear();
        self.k_grid.extend(self.log_k_grid.iter().map(|l| l.exp()));

        self.cumulative_g.iter_mut().for_each(|g| *g = 0.0);
        for (k, w) in &distributions {
            let lk: Vec<f64> = k.iter().map(|&v| log_k(v)).collect();
            for (g, &l) in self.cumulative_g.iter_mut().zip(&self.log_k_grid) {
                *g += w * interp(l, &lk, &self.g_0_to_1);
            }
        }
        match self.resampling {
            Resampling::Interpolate => {
                for (d, &g) in dest.iter_mut().zip(self.new_quadrature.abscissas()) {
                    *d = interp(g, &self.cumulative_g, &self.k_grid);
                }
            }
            Resampling::Rebin => {
                let merged = rebin(
                    &self.k_grid,
                    &self.cumulative_g,
                    self.new_quadrature.cumulative_edges(),
                );
                dest.iter_mut().zip(merged).for_each(|(d, k)| *d = k);
            }
        }
    }
}
