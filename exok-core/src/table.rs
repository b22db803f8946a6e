//! Opacity tables over pressure, temperature and wavenumber.
//!
//! Every table kind shares one storage layout,
//!
//! ```text
//!   values[p][t][x][w][g]
//! ```
//!
//! where absent axes have length 1: cross-section tables have no `x` and no
//! `g` axis, correlated-k tables have a `g` axis, and variable-gas tables have
//! both. A single multilinear interpolator then serves all of them.
//!
//! Interpolation is done in log10 of pressure, in temperature and (for
//! variable-gas tables) in ln of the mixing ratio. Queries outside the grid
//! are clamped to its boundary.

use crate::errors::{ExokError, ExokResult};
use crate::interp::{interp, interp_ind_weights, is_strictly_increasing, rebin_ind_weights};
use crate::ktable::bin_down_kcoeff;
use crate::overlap::{RandomOverlap, Resampling};
use crate::quadrature::QuadratureGrid;
use crate::settings::Settings;
use crate::spectral_grid::SpectralGrid;
use crate::units::{
    resolve_unit, strip_per_molecule, UnitSpec, MKS_CROSS_SECTION, MKS_PRESSURE,
};
use is_close::is_close;
use ndarray::{s, Array2, Array3, Array5, ArrayBase, Axis, DataMut, Dimension, Zip};
use serde::{Deserialize, Serialize};

/// Kind of table, given by which optional axes are present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableKind {
    CrossSection,
    CorrelatedK,
    VariableGas,
}

/// Free-text description of where a table comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub molecule: String,
    pub doi: String,
    pub date_id: String,
    pub method: String,
}

impl TableMetadata {
    pub fn new(molecule: &str) -> Self {
        Self {
            molecule: molecule.to_string(),
            doi: "unknown".to_string(),
            date_id: date_id(),
            method: "unknown".to_string(),
        }
    }
}

/// Identifier stamped on newly created tables, e.g. `exok-v0.1.0-17/10/2026`.
pub fn date_id() -> String {
    format!(
        "exok-v{}-{}",
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%d/%m/%Y")
    )
}

/// Raw arrays a table is built from.
#[derive(Clone, Debug)]
pub struct TableParts {
    pub metadata: TableMetadata,
    pub pressure: Vec<f64>,
    pub temperature: Vec<f64>,
    pub mixing_ratio: Option<Vec<f64>>,
    pub grid: SpectralGrid,
    pub quadrature: Option<QuadratureGrid>,
    /// Indexed `[p][t][x][w][g]`.
    pub values: Array5<f64>,
    pub pressure_unit: UnitSpec,
    pub value_unit: UnitSpec,
}

/// A multiplier applied to the values: one number, or one per (p, t) node.
#[derive(Clone, Debug, PartialEq)]
pub enum VmrField {
    Scalar(f64),
    PerNode(Array2<f64>),
}

impl From<f64> for VmrField {
    fn from(value: f64) -> Self {
        VmrField::Scalar(value)
    }
}

/// Options of [`SpectralTable::bin_down`].
#[derive(Clone, Debug, Default)]
pub struct BinDownOptions {
    /// Quadrature of the binned table; the current one if `None`.
    pub quadrature: Option<QuadratureGrid>,
    pub resampling: Resampling,
    pub remove_zeros: bool,
}

/// Points at which to evaluate a table.
///
/// `log_pressure` is log10 of the pressure in the table's pressure unit.
///
/// ```
/// use exok_core::table::TableQuery;
///
/// let query = TableQuery::new(&[5.0, 3.0], &[300.0, 250.0])
///     .gas_fraction(0.1)
///     .window(1000.0, 2000.0);
/// assert_eq!(query.len(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct TableQuery {
    log_pressure: Vec<f64>,
    temperature: Vec<f64>,
    mixing_ratio: Option<Vec<f64>>,
    gas_fraction: Vec<f64>,
    window: Option<(f64, f64)>,
    log_interp: Option<bool>,
}

impl TableQuery {
    pub fn new(log_pressure: &[f64], temperature: &[f64]) -> Self {
        Self {
            log_pressure: log_pressure.to_vec(),
            temperature: temperature.to_vec(),
            gas_fraction: vec![1.0],
            ..Default::default()
        }
    }

    pub fn at(log_pressure: f64, temperature: f64) -> Self {
        Self::new(&[log_pressure], &[temperature])
    }

    /// Mixing ratio coordinate for variable-gas tables.
    pub fn mixing_ratio(mut self, vmr: &[f64]) -> Self {
        self.mixing_ratio = Some(vmr.to_vec());
        self
    }

    pub fn gas_fraction(mut self, fraction: f64) -> Self {
        self.gas_fraction = vec![fraction];
        self
    }

    /// One dilution factor per query point.
    pub fn gas_fractions(mut self, fractions: &[f64]) -> Self {
        self.gas_fraction = fractions.to_vec();
        self
    }

    /// Restricts the output to the bins selected by [`SpectralGrid::window`].
    pub fn window(mut self, lo: f64, hi: f64) -> Self {
        self.window = Some((lo, hi));
        self
    }

    pub fn maybe_window(mut self, window: Option<(f64, f64)>) -> Self {
        self.window = window;
        self
    }

    pub fn log_interp(mut self, log_interp: bool) -> Self {
        self.log_interp = Some(log_interp);
        self
    }

    pub fn len(&self) -> usize {
        self.log_pressure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_pressure.is_empty()
    }

    fn validate(&self) -> ExokResult<()> {
        let n = self.len();
        if self.temperature.len() != n {
            return Err(ExokError::shape_mismatch(
                "query temperatures",
                &[n],
                &[self.temperature.len()],
            ));
        }
        if self.gas_fraction.len() != 1 && self.gas_fraction.len() != n {
            return Err(ExokError::shape_mismatch(
                "query gas fractions",
                &[n],
                &[self.gas_fraction.len()],
            ));
        }
        if let Some(x) = &self.mixing_ratio {
            if x.len() != 1 && x.len() != n {
                return Err(ExokError::shape_mismatch(
                    "query mixing ratios",
                    &[n],
                    &[x.len()],
                ));
            }
        }
        Ok(())
    }

    fn fraction(&self, i: usize) -> f64 {
        broadcast(&self.gas_fraction, i)
    }
}

fn broadcast(values: &[f64], i: usize) -> f64 {
    if values.len() == 1 {
        values[0]
    } else {
        values[i]
    }
}

/// A pressure-temperature(-mixing ratio) grid of opacities.
#[derive(Clone, Debug)]
pub struct SpectralTable {
    metadata: TableMetadata,
    pressure: Vec<f64>,
    log_pressure: Vec<f64>,
    temperature: Vec<f64>,
    mixing_ratio: Option<Vec<f64>>,
    ln_mixing_ratio: Option<Vec<f64>>,
    grid: SpectralGrid,
    quadrature: Option<QuadratureGrid>,
    values: Array5<f64>,
    pressure_unit: UnitSpec,
    value_unit: UnitSpec,
    settings: Settings,
}

fn check_axis(name: &str, values: &[f64]) -> ExokResult<()> {
    if values.is_empty() || !is_strictly_increasing(values) {
        return Err(ExokError::InvalidGrid(format!(
            "the {name} grid must be non-empty and strictly increasing"
        )));
    }
    Ok(())
}

/// Mixing ratios are interpolated in log space, so they must be positive.
fn check_mixing_ratio_axis(values: &[f64]) -> ExokResult<()> {
    check_axis("mixing ratio", values)?;
    if values[0] <= 0.0 {
        return Err(ExokError::InvalidGrid(
            "mixing ratios must be positive".to_string(),
        ));
    }
    Ok(())
}

impl SpectralTable {
    /// Builds a table from its arrays.
    ///
    /// When `settings.mks_units` is set the table is converted to Pa and
    /// m^2/molecule right away, which requires both units to be known.
    ///
    /// # Errors
    ///
    /// `InvalidGrid` for non-monotonic axes, `ShapeMismatch` if the values do
    /// not match the axes, and unit errors from the conversion.
    pub fn from_parts(parts: TableParts, settings: &Settings) -> ExokResult<Self> {
        check_axis("pressure", &parts.pressure)?;
        if parts.pressure[0] <= 0.0 {
            return Err(ExokError::InvalidGrid(
                "pressures must be positive".to_string(),
            ));
        }
        check_axis("temperature", &parts.temperature)?;
        if let Some(x) = &parts.mixing_ratio {
            check_mixing_ratio_axis(x)?;
            if parts.quadrature.is_none() {
                return Err(ExokError::InvalidGrid(
                    "a mixing-ratio axis needs a g-space quadrature".to_string(),
                ));
            }
        }
        let expected = [
            parts.pressure.len(),
            parts.temperature.len(),
            parts.mixing_ratio.as_ref().map_or(1, Vec::len),
            parts.grid.len(),
            parts.quadrature.as_ref().map_or(1, QuadratureGrid::len),
        ];
        if parts.values.shape() != expected {
            return Err(ExokError::shape_mismatch(
                "table values",
                &expected,
                parts.values.shape(),
            ));
        }
        let mut table = Self {
            log_pressure: parts.pressure.iter().map(|p| p.log10()).collect(),
            ln_mixing_ratio: parts
                .mixing_ratio
                .as_ref()
                .map(|x| x.iter().map(|v| v.ln()).collect()),
            metadata: parts.metadata,
            pressure: parts.pressure,
            temperature: parts.temperature,
            mixing_ratio: parts.mixing_ratio,
            grid: parts.grid,
            quadrature: parts.quadrature,
            values: parts.values.as_standard_layout().into_owned(),
            pressure_unit: parts.pressure_unit,
            value_unit: parts.value_unit,
            settings: settings.clone(),
        };
        if settings.mks_units {
            table.convert_to_mks()?;
        }
        Ok(table)
    }

    /// Cross-section table from values indexed `[p][t][w]`.
    #[allow(clippy::too_many_arguments)]
    pub fn cross_section(
        molecule: &str,
        pressure: Vec<f64>,
        temperature: Vec<f64>,
        grid: SpectralGrid,
        values: Array3<f64>,
        pressure_unit: UnitSpec,
        value_unit: UnitSpec,
        settings: &Settings,
    ) -> ExokResult<Self> {
        Self::from_parts(
            TableParts {
                metadata: TableMetadata::new(molecule),
                pressure,
                temperature,
                mixing_ratio: None,
                grid,
                quadrature: None,
                values: values.insert_axis(Axis(2)).insert_axis(Axis(4)),
                pressure_unit,
                value_unit,
            },
            settings,
        )
    }

    pub fn kind(&self) -> TableKind {
        match (&self.mixing_ratio, &self.quadrature) {
            (Some(_), _) => TableKind::VariableGas,
            (None, Some(_)) => TableKind::CorrelatedK,
            (None, None) => TableKind::CrossSection,
        }
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut TableMetadata {
        &mut self.metadata
    }

    pub fn molecule(&self) -> &str {
        &self.metadata.molecule
    }

    pub fn pressure(&self) -> &[f64] {
        &self.pressure
    }

    pub fn log_pressure(&self) -> &[f64] {
        &self.log_pressure
    }

    pub fn temperature(&self) -> &[f64] {
        &self.temperature
    }

    pub fn mixing_ratio(&self) -> Option<&[f64]> {
        self.mixing_ratio.as_deref()
    }

    pub fn grid(&self) -> &SpectralGrid {
        &self.grid
    }

    pub fn quadrature(&self) -> Option<&QuadratureGrid> {
        self.quadrature.as_ref()
    }

    /// Values indexed `[p][t][x][w][g]`.
    pub fn values(&self) -> &Array5<f64> {
        &self.values
    }

    pub fn pressure_unit(&self) -> &UnitSpec {
        &self.pressure_unit
    }

    pub fn value_unit(&self) -> &UnitSpec {
        &self.value_unit
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Sizes of the `[p, t, x, w, g]` axes.
    pub fn shape(&self) -> [usize; 5] {
        let s = self.values.shape();
        [s[0], s[1], s[2], s[3], s[4]]
    }

    pub fn ng(&self) -> usize {
        self.values.shape()[4]
    }

    pub fn nw(&self) -> usize {
        self.grid.len()
    }

    fn ensure_units_resolved(&self) -> ExokResult<()> {
        if self.pressure_unit.is_unspecified() {
            return Err(ExokError::UnresolvedUnit {
                quantity: "pressure unit".to_string(),
            });
        }
        if self.value_unit.is_unspecified() {
            return Err(ExokError::UnresolvedUnit {
                quantity: "cross-section unit".to_string(),
            });
        }
        Ok(())
    }

    /// Interpolates the table at the query points.
    ///
    /// Returns an array `[query, Nw, Ng]` with `Ng = 1` for cross-sections,
    /// `Nw` being the size of the query window. For tables without a mixing
    /// ratio axis the gas fraction dilutes the result; for variable-gas tables
    /// the mixing ratio is an interpolation coordinate and the gas fraction
    /// still multiplies the result.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` for inconsistent query lengths, `Configuration` when a
    /// variable-gas table is queried without a mixing ratio, and
    /// `UnresolvedUnit` if the table units are unknown.
    pub fn interpolate(&self, query: &TableQuery) -> ExokResult<Array3<f64>> {
        query.validate()?;
        self.ensure_units_resolved()?;
        let ln_x = match (&self.ln_mixing_ratio, &query.mixing_ratio) {
            (Some(_), Some(x)) => Some(x.iter().map(|v| v.ln()).collect::<Vec<_>>()),
            (Some(_), None) => {
                return Err(ExokError::Configuration(format!(
                    "the variable-gas table for {} needs a mixing ratio to be interpolated",
                    self.molecule()
                )))
            }
            (None, _) => None,
        };
        let window = match query.window {
            Some((lo, hi)) => {
                let range = self.grid.window(lo, hi);
                if range.is_empty() {
                    log::warn!("the spectral window [{lo}, {hi}] selects no bin");
                }
                range
            }
            None => 0..self.nw(),
        };
        let log_interp = query.log_interp.unwrap_or(self.settings.log_interp);
        let n = query.len();
        let mut out = Array3::<f64>::zeros((n, window.len(), self.ng()));
        for (i, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            let (ip, wp) = interp_ind_weights(query.log_pressure[i], &self.log_pressure);
            let (it, wt) = interp_ind_weights(query.temperature[i], &self.temperature);
            let (ix, wx) = match (&self.ln_mixing_ratio, &ln_x) {
                (Some(grid), Some(x)) => interp_ind_weights(broadcast(x, i), grid),
                _ => (0, 0.0),
            };
            for corner in 0..8u8 {
                let (jp, fp) = corner_node(ip, wp, corner & 1 != 0);
                let (jt, ft) = corner_node(it, wt, corner & 2 != 0);
                let (jx, fx) = corner_node(ix, wx, corner & 4 != 0);
                let weight = fp * ft * fx;
                if weight == 0.0 {
                    continue;
                }
                let block = self.values.slice(s![jp, jt, jx, window.clone(), ..]);
                if log_interp {
                    Zip::from(&mut row)
                        .and(&block)
                        .for_each(|acc, &v| *acc += weight * v.ln());
                } else {
                    Zip::from(&mut row)
                        .and(&block)
                        .for_each(|acc, &v| *acc += weight * v);
                }
            }
            let fraction = query.fraction(i);
            if log_interp {
                row.mapv_inplace(|v| fraction * v.exp());
            } else {
                row.mapv_inplace(|v| fraction * v);
            }
        }
        Ok(out)
    }

    /// Resamples the table on a new wavenumber grid (in place).
    ///
    /// Values are interpolated linearly against the old bin centers, for every
    /// (p, t, x, g). New centers outside the old ones get the boundary value,
    /// or zero when `zero_outside` is set.
    pub fn sample(&mut self, new_grid: &SpectralGrid, zero_outside: bool) {
        let [np, nt, nx, _, ng] = self.shape();
        let old_centers = self.grid.centers();
        let (lo, hi) = (old_centers[0], old_centers[old_centers.len() - 1]);
        let mut values = Array5::<f64>::zeros((np, nt, nx, new_grid.len(), ng));
        let mut lane = Vec::with_capacity(old_centers.len());
        for (old, mut new) in self
            .values
            .lanes(Axis(3))
            .into_iter()
            .zip(values.lanes_mut(Axis(3)))
        {
            lane.clear();
            lane.extend(old.iter().copied());
            for (v, &wn) in new.iter_mut().zip(new_grid.centers()) {
                *v = if zero_outside && (wn < lo || wn > hi) {
                    0.0
                } else {
                    interp(wn, old_centers, &lane)
                };
            }
        }
        log::debug!(
            "sampled {} from {} to {} bins",
            self.molecule(),
            self.nw(),
            new_grid.len()
        );
        self.values = values;
        self.grid = new_grid.clone();
    }

    /// Re-interpolates the table on new pressure and temperature axes (and
    /// mixing ratio axis for variable-gas tables), in place.
    ///
    /// `log_pressure` is log10 of the pressure in the table's unit.
    pub fn remap_grid(
        &mut self,
        log_pressure: &[f64],
        temperature: &[f64],
        mixing_ratio: Option<&[f64]>,
    ) -> ExokResult<()> {
        check_axis("pressure", log_pressure)?;
        check_axis("temperature", temperature)?;
        let new_x = match (&self.mixing_ratio, mixing_ratio) {
            (Some(_), Some(x)) => {
                check_mixing_ratio_axis(x)?;
                Some(x.to_vec())
            }
            (Some(current), None) => Some(current.clone()),
            (None, Some(_)) => {
                return Err(ExokError::Configuration(
                    "only variable-gas tables have a mixing-ratio axis".to_string(),
                ))
            }
            (None, None) => None,
        };
        let nx = new_x.as_ref().map_or(1, Vec::len);
        let (np, nt) = (log_pressure.len(), temperature.len());
        let mut lp = Vec::with_capacity(np * nt * nx);
        let mut t = Vec::with_capacity(np * nt * nx);
        let mut x = Vec::with_capacity(np * nt * nx);
        for &p in log_pressure {
            for &tt in temperature {
                for ix in 0..nx {
                    lp.push(p);
                    t.push(tt);
                    x.push(new_x.as_ref().map_or(1.0, |v| v[ix]));
                }
            }
        }
        let mut query = TableQuery::new(&lp, &t);
        if new_x.is_some() {
            query = query.mixing_ratio(&x);
        }
        let flat = self.interpolate(&query)?;
        let values = flat
            .into_shape((np, nt, nx, self.nw(), self.ng()))
            .map_err(|e| ExokError::Configuration(format!("remapped values: {e}")))?;
        log::debug!(
            "remapped {} onto {np} pressures and {nt} temperatures",
            self.molecule()
        );
        self.values = values;
        self.pressure = log_pressure.iter().map(|l| 10f64.powf(*l)).collect();
        self.log_pressure = log_pressure.to_vec();
        self.temperature = temperature.to_vec();
        self.ln_mixing_ratio = new_x.as_ref().map(|v| v.iter().map(|x| x.ln()).collect());
        self.mixing_ratio = new_x;
        Ok(())
    }

    /// Converts the pressure axis (in place).
    ///
    /// `assumed` overrides the unit recorded on the table; an unspecified
    /// `target` keeps the starting unit.
    pub fn convert_pressure_unit(&mut self, target: &UnitSpec, assumed: &UnitSpec) -> ExokResult<()> {
        let resolved = resolve_unit("pressure unit", &self.pressure_unit, assumed, target)?;
        self.pressure.iter_mut().for_each(|p| *p *= resolved.factor);
        self.log_pressure = self.pressure.iter().map(|p| p.log10()).collect();
        self.pressure_unit = UnitSpec::Known(resolved.unit);
        Ok(())
    }

    /// Converts the values (in place). The `/molecule` suffix is ignored when
    /// converting and always recorded on the result.
    pub fn convert_value_unit(&mut self, target: &UnitSpec, assumed: &UnitSpec) -> ExokResult<()> {
        let strip = |u: &UnitSpec| match u {
            UnitSpec::Known(s) => UnitSpec::known(strip_per_molecule(s)),
            UnitSpec::Unspecified => UnitSpec::Unspecified,
        };
        let resolved = resolve_unit(
            "cross-section unit",
            &strip(&self.value_unit),
            &strip(assumed),
            &strip(target),
        )?;
        if resolved.factor != 1.0 {
            self.values.mapv_inplace(|v| v * resolved.factor);
        }
        self.value_unit = UnitSpec::Known(format!("{}/molecule", resolved.unit));
        Ok(())
    }

    /// Converts to Pa and m^2/molecule (in place).
    pub fn convert_to_mks(&mut self) -> ExokResult<()> {
        let mut converted = self.clone();
        converted.convert_value_unit(&UnitSpec::known(MKS_CROSS_SECTION), &UnitSpec::Unspecified)?;
        converted.convert_pressure_unit(&UnitSpec::known(MKS_PRESSURE), &UnitSpec::Unspecified)?;
        *self = converted;
        Ok(())
    }

    /// Replaces zeros by the smallest positive value divided by `10^decades`,
    /// so that the table can be interpolated in log space.
    pub fn remove_zeros(&mut self, decades: f64) {
        replace_zeros(&mut self.values, decades);
    }

    /// Keeps the bins whose edges lie in `[lo, hi]` (in place).
    pub fn clip_spectral_range(&mut self, lo: f64, hi: f64) -> ExokResult<()> {
        let range = self.grid.clip_range(lo, hi);
        let grid = self.grid.slice(range.clone())?;
        self.values = self.values.slice(s![.., .., .., range, ..]).to_owned();
        self.grid = grid;
        Ok(())
    }

    /// Adds zero-filled bins below and above the current grid (in place).
    pub fn extend_spectral_range(
        &mut self,
        left: &[f64],
        right: &[f64],
        remove_zeros: bool,
    ) -> ExokResult<()> {
        let grid = self.grid.extend(left, right)?;
        let [np, nt, nx, nw, ng] = self.shape();
        let mut values = Array5::<f64>::zeros((np, nt, nx, grid.len(), ng));
        values
            .slice_mut(s![.., .., .., left.len()..left.len() + nw, ..])
            .assign(&self.values);
        self.values = values;
        self.grid = grid;
        if remove_zeros {
            self.remove_zeros(self.settings.remove_zeros_decades);
        }
        Ok(())
    }

    /// Copy of the table with values multiplied by a mixing ratio.
    pub fn scaled(&self, vmr: &VmrField) -> ExokResult<Self> {
        let mut res = self.clone();
        res.values = self.scaled_values(vmr)?;
        Ok(res)
    }

    pub(crate) fn scaled_values(&self, vmr: &VmrField) -> ExokResult<Array5<f64>> {
        match vmr {
            VmrField::Scalar(x) => Ok(&self.values * *x),
            VmrField::PerNode(field) => {
                let [np, nt, ..] = self.shape();
                if field.shape() != [np, nt] {
                    return Err(ExokError::shape_mismatch(
                        "mixing ratio field",
                        &[np, nt],
                        field.shape(),
                    ));
                }
                let mut values = self.values.clone();
                for ((ip, it), &x) in field.indexed_iter() {
                    values
                        .slice_mut(s![ip, it, .., .., ..])
                        .mapv_inplace(|v| v * x);
                }
                Ok(values)
            }
        }
    }

    /// Same axes, grids, units and quadrature.
    pub fn same_structure(&self, other: &SpectralTable) -> bool {
        let close = |a: &[f64], b: &[f64]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| is_close!(*x, *y))
        };
        self.shape() == other.shape()
            && close(&self.pressure, &other.pressure)
            && close(&self.temperature, &other.temperature)
            && match (&self.mixing_ratio, &other.mixing_ratio) {
                (Some(a), Some(b)) => close(a, b),
                (None, None) => true,
                _ => false,
            }
            && self.grid.approx_eq(&other.grid)
            && self.quadrature == other.quadrature
            && self.pressure_unit.same_as(&other.pressure_unit)
            && self.value_unit.same_as(&other.value_unit)
    }

    /// Checks that `other` can be combined with this table value by value.
    pub(crate) fn check_combinable(&self, other: &SpectralTable) -> ExokResult<()> {
        if self.shape() != other.shape() {
            return Err(ExokError::shape_mismatch(
                "combine_with",
                &self.shape(),
                &other.shape(),
            ));
        }
        if !self.pressure_unit.same_as(&other.pressure_unit)
            || !self.value_unit.same_as(&other.value_unit)
        {
            return Err(ExokError::Configuration(format!(
                "cannot combine tables in {} / {} with tables in {} / {}",
                self.pressure_unit, self.value_unit, other.pressure_unit, other.value_unit
            )));
        }
        if self.quadrature != other.quadrature {
            return Err(ExokError::Configuration(
                "tables do not share the same g-space quadrature; remap one of them first"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// New table for the mix of this table and `other`.
    ///
    /// Cross-sections are added; correlated-k tables are mixed by random
    /// overlap. Each table is first multiplied by its mixing ratio.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the tables differ in shape, `Configuration` if their
    /// units or quadratures differ or if one of them is a variable-gas table.
    pub fn combine_with(
        &self,
        other: &SpectralTable,
        x_self: &VmrField,
        x_other: &VmrField,
        resampling: Resampling,
    ) -> ExokResult<SpectralTable> {
        if self.kind() == TableKind::VariableGas || other.kind() == TableKind::VariableGas {
            return Err(ExokError::Configuration(
                "variable-gas tables are combined through VariableGasKTable::combine_with"
                    .to_string(),
            ));
        }
        self.check_combinable(other)?;
        let a = self.scaled_values(x_self)?;
        let b = other.scaled_values(x_other)?;
        let values = match &self.quadrature {
            None => a + b,
            Some(quadrature) => mix_arrays(&a, &b, quadrature, resampling)?,
        };
        let mut res = self.clone();
        res.values = values;
        res.metadata = TableMetadata::new(&format!("{}+{}", self.molecule(), other.molecule()));
        Ok(res)
    }

    /// Bins the table down to coarser wavenumber bins (in place).
    ///
    /// Only new bins inside the current spectral range are filled, the others
    /// are zero. Cross-sections are averaged with the edge-overlap weights.
    /// Correlated-k tables recombine the k-distributions of the contributing
    /// bins in log(k) space and may switch quadrature on the way.
    pub fn bin_down(&mut self, new_edges: &[f64], options: &BinDownOptions) -> ExokResult<()> {
        let new_grid = SpectralGrid::from_edges(new_edges.to_vec())?;
        let (lo, hi) = self.grid.extent();
        let kept: Vec<usize> = (0..new_edges.len())
            .filter(|&i| new_edges[i] >= lo && new_edges[i] <= hi)
            .collect();
        let new_quadrature = match (&self.quadrature, &options.quadrature) {
            (None, Some(_)) => {
                return Err(ExokError::Configuration(
                    "a cross-section table has no quadrature to change".to_string(),
                ))
            }
            (_, Some(q)) => Some(q.clone()),
            (current, None) => current.clone(),
        };
        let [np, nt, nx, _, _] = self.shape();
        let ng = new_quadrature.as_ref().map_or(1, QuadratureGrid::len);
        let values = if kept.len() < 2 {
            log::warn!("the new bins do not overlap {}; the result is zero", self.molecule());
            Array5::<f64>::zeros((np, nt, nx, new_grid.len(), ng))
        } else {
            let kept_edges: Vec<f64> = kept.iter().map(|&i| new_edges[i]).collect();
            let plan = rebin_ind_weights(self.grid.edges(), &kept_edges);
            let first = kept[0];
            match (&self.quadrature, &new_quadrature) {
                (Some(old_q), Some(new_q)) => bin_down_kcoeff(
                    &self.values,
                    old_q,
                    new_q,
                    &plan,
                    first,
                    new_grid.len(),
                    &self.settings,
                    options.resampling,
                ),
                _ => {
                    let mut values = Array5::<f64>::zeros((np, nt, nx, new_grid.len(), 1));
                    for iw in 0..plan.len() {
                        let contributing = plan.contributing(iw);
                        for (j, &w) in contributing.zip(&plan.weights[iw]) {
                            let old = self.values.slice(s![.., .., .., j, ..]);
                            let mut new = values.slice_mut(s![.., .., .., first + iw, ..]);
                            new.zip_mut_with(&old, |n, &o| *n += w * o);
                        }
                    }
                    values
                }
            }
        };
        log::debug!(
            "binned {} down from {} to {} bins",
            self.molecule(),
            self.nw(),
            new_grid.len()
        );
        self.values = values;
        self.grid = new_grid;
        self.quadrature = new_quadrature;
        if options.remove_zeros {
            self.remove_zeros(self.settings.remove_zeros_decades);
        }
        Ok(())
    }

    /// Resamples k(g) on a new quadrature (in place).
    pub fn remap_g(&mut self, quadrature: &QuadratureGrid) -> ExokResult<()> {
        let old = self.quadrature.as_ref().ok_or_else(|| {
            ExokError::Configuration("a cross-section table has no g axis to remap".to_string())
        })?;
        let [np, nt, nx, nw, _] = self.shape();
        let mut values = Array5::<f64>::zeros((np, nt, nx, nw, quadrature.len()));
        let mut lane = Vec::with_capacity(old.len());
        for (old_k, mut new_k) in self
            .values
            .lanes(Axis(4))
            .into_iter()
            .zip(values.lanes_mut(Axis(4)))
        {
            lane.clear();
            lane.extend(old_k.iter().copied());
            for (k, &g) in new_k.iter_mut().zip(quadrature.abscissas()) {
                *k = interp(g, old.abscissas(), &lane);
            }
        }
        self.values = values;
        self.quadrature = Some(quadrature.clone());
        Ok(())
    }

    /// Replaces the values and quadrature, keeping the axes.
    pub(crate) fn with_values(
        &self,
        values: Array5<f64>,
        quadrature: Option<QuadratureGrid>,
    ) -> ExokResult<Self> {
        let parts = TableParts {
            metadata: self.metadata.clone(),
            pressure: self.pressure.clone(),
            temperature: self.temperature.clone(),
            mixing_ratio: self.mixing_ratio.clone(),
            grid: self.grid.clone(),
            quadrature,
            values,
            pressure_unit: self.pressure_unit.clone(),
            value_unit: self.value_unit.clone(),
        };
        let settings = Settings {
            mks_units: false,
            ..self.settings.clone()
        };
        let mut table = Self::from_parts(parts, &settings)?;
        table.settings = self.settings.clone();
        Ok(table)
    }

    /// Splits the table into its arrays.
    pub fn into_parts(self) -> TableParts {
        TableParts {
            metadata: self.metadata,
            pressure: self.pressure,
            temperature: self.temperature,
            mixing_ratio: self.mixing_ratio,
            grid: self.grid,
            quadrature: self.quadrature,
            values: self.values,
            pressure_unit: self.pressure_unit,
            value_unit: self.value_unit,
        }
    }
}

/// Upper or lower node of a bracketing pair, with its tensor weight factor.
fn corner_node(upper: usize, weight: f64, take_upper: bool) -> (usize, f64) {
    if take_upper {
        (upper, weight)
    } else {
        (upper.saturating_sub(1), 1.0 - weight)
    }
}

pub(crate) fn replace_zeros<S, D>(values: &mut ArrayBase<S, D>, decades: f64)
where
    S: DataMut<Elem = f64>,
    D: Dimension,
{
    let min_positive = values
        .iter()
        .filter(|v| **v > 0.0)
        .fold(f64::INFINITY, |acc, v| acc.min(*v));
    if !min_positive.is_finite() {
        return;
    }
    let floor = min_positive / 10f64.powf(decades);
    values.mapv_inplace(|v| if v == 0.0 { floor } else { v });
}

/// Random overlap of two equally shaped `[.., Ng]` arrays.
pub(crate) fn mix_arrays(
    a: &Array5<f64>,
    b: &Array5<f64>,
    quadrature: &QuadratureGrid,
    resampling: Resampling,
) -> ExokResult<Array5<f64>> {
    let flat_a: Vec<f64> = a.iter().copied().collect();
    let flat_b: Vec<f64> = b.iter().copied().collect();
    let mut flat = vec![0.0; flat_a.len()];
    RandomOverlap::new(quadrature, resampling).mix_rows(&flat_a, &flat_b, &mut flat)?;
    Array5::from_shape_vec(a.raw_dim(), flat)
        .map_err(|e| ExokError::Configuration(format!("mixed values: {e}")))
}
