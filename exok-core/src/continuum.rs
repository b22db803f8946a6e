//! Collision-induced absorption tables.
//!
//! A [`ContinuumTable`] gives the binary absorption coefficient of a pair of
//! species as a function of temperature and wavenumber. Multiplied by the
//! number densities of both partners it becomes an absorption coefficient,
//! and divided by the total number density a cross-section per molecule.

use crate::errors::{ExokError, ExokResult};
use crate::interp::{interp, interp_ind_weights, is_strictly_increasing};
use crate::settings::Settings;
use crate::spectral_grid::SpectralGrid;
use crate::table::replace_zeros;
use crate::units::registry::{BOLTZMANN, LOSCHMIDT};
use crate::units::{resolve_unit, ConversionError, Unit, UnitSpec, HITRAN_CONTINUUM, MKS_CONTINUUM};
use ndarray::{s, Array2, Axis, Zip};

#[derive(Clone, Debug)]
pub struct ContinuumTable {
    pair: (String, String),
    temperature: Vec<f64>,
    grid: SpectralGrid,
    /// Indexed `[t][w]`.
    abs_coeff: Array2<f64>,
    unit: UnitSpec,
    settings: Settings,
}

impl ContinuumTable {
    /// Builds a table, converting it to m^5 if `settings.mks_units` is set.
    ///
    /// # Errors
    ///
    /// `InvalidGrid` for a non-monotonic temperature axis, `ShapeMismatch` if
    /// `abs_coeff` is not `[Nt, Nw]`.
    pub fn new(
        pair: (&str, &str),
        temperature: Vec<f64>,
        grid: SpectralGrid,
        abs_coeff: Array2<f64>,
        unit: UnitSpec,
        settings: &Settings,
    ) -> ExokResult<Self> {
        if temperature.is_empty() || !is_strictly_increasing(&temperature) {
            return Err(ExokError::InvalidGrid(
                "the temperature grid must be non-empty and strictly increasing".to_string(),
            ));
        }
        let expected = [temperature.len(), grid.len()];
        if abs_coeff.shape() != expected {
            return Err(ExokError::shape_mismatch(
                "continuum absorption coefficients",
                &expected,
                abs_coeff.shape(),
            ));
        }
        let mut table = Self {
            pair: (pair.0.to_string(), pair.1.to_string()),
            temperature,
            grid,
            abs_coeff,
            unit,
            settings: settings.clone(),
        };
        if settings.mks_units {
            table.convert_to_mks()?;
        }
        Ok(table)
    }

    /// Table in the HITRAN convention (cm^5 per molecule pair).
    pub fn hitran(
        pair: (&str, &str),
        temperature: Vec<f64>,
        grid: SpectralGrid,
        abs_coeff: Array2<f64>,
        settings: &Settings,
    ) -> ExokResult<Self> {
        Self::new(
            pair,
            temperature,
            grid,
            abs_coeff,
            UnitSpec::known(HITRAN_CONTINUUM),
            settings,
        )
    }

    pub fn pair(&self) -> (&str, &str) {
        (&self.pair.0, &self.pair.1)
    }

    /// Name of the pair, e.g. `H2-He`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.pair.0, self.pair.1)
    }

    pub fn temperature(&self) -> &[f64] {
        &self.temperature
    }

    pub fn grid(&self) -> &SpectralGrid {
        &self.grid
    }

    pub fn abs_coeff(&self) -> &Array2<f64> {
        &self.abs_coeff
    }

    pub fn unit(&self) -> &UnitSpec {
        &self.unit
    }

    /// Interpolates in temperature only. Returns `[T, Nw_window]`.
    pub fn interpolate(
        &self,
        temperature: &[f64],
        window: Option<(f64, f64)>,
        log_interp: Option<bool>,
    ) -> ExokResult<Array2<f64>> {
        if self.unit.is_unspecified() {
            return Err(ExokError::UnresolvedUnit {
                quantity: "absorption coefficient unit".to_string(),
            });
        }
        let range = match window {
            Some((lo, hi)) => self.grid.window(lo, hi),
            None => 0..self.grid.len(),
        };
        let log_interp = log_interp.unwrap_or(self.settings.log_interp);
        let mut out = Array2::<f64>::zeros((temperature.len(), range.len()));
        for (mut row, &t) in out.axis_iter_mut(Axis(0)).zip(temperature) {
            let (it, wt) = interp_ind_weights(t, &self.temperature);
            let upper = self.abs_coeff.slice(s![it, range.clone()]);
            let lower = self.abs_coeff.slice(s![it.saturating_sub(1), range.clone()]);
            Zip::from(&mut row)
                .and(&lower)
                .and(&upper)
                .for_each(|r, &k0, &k1| {
                    *r = if wt == 0.0 {
                        k0
                    } else if wt == 1.0 {
                        k1
                    } else if log_interp {
                        ((1.0 - wt) * k0.ln() + wt * k1.ln()).exp()
                    } else {
                        (1.0 - wt) * k0 + wt * k1
                    };
                });
        }
        Ok(out)
    }

    /// Continuum cross-section per molecule of the whole gas, `[layers, Nw]`.
    ///
    /// `log_pressure` is log10 of the pressure in Pa; `x1` and `x2` are the
    /// mixing ratios of the two partners, one value or one per layer.
    ///
    /// # Errors
    ///
    /// `Configuration` if the table is not in m^5, `ShapeMismatch` if the
    /// layer inputs disagree in length.
    pub fn effective_cross_section(
        &self,
        log_pressure: &[f64],
        temperature: &[f64],
        x1: &[f64],
        x2: &[f64],
        window: Option<(f64, f64)>,
    ) -> ExokResult<Array2<f64>> {
        self.ensure_mks()?;
        let n = log_pressure.len();
        if temperature.len() != n {
            return Err(ExokError::shape_mismatch(
                "continuum temperatures",
                &[n],
                &[temperature.len()],
            ));
        }
        for (context, x) in [("first partner", x1), ("second partner", x2)] {
            if x.len() != 1 && x.len() != n {
                return Err(ExokError::shape_mismatch(context, &[n], &[x.len()]));
            }
        }
        let at = |x: &[f64], i: usize| if x.len() == 1 { x[0] } else { x[i] };
        let mut res = self.interpolate(temperature, window, None)?;
        for (i, mut row) in res.axis_iter_mut(Axis(0)).enumerate() {
            let density = 10f64.powf(log_pressure[i]) / (BOLTZMANN * temperature[i]);
            let factor = density * at(x1, i) * at(x2, i);
            row.mapv_inplace(|v| v * factor);
        }
        Ok(res)
    }

    fn ensure_mks(&self) -> ExokResult<()> {
        if self.unit.is_equivalent_to(MKS_CONTINUUM) {
            Ok(())
        } else {
            Err(ExokError::Configuration(format!(
                "the {} continuum is in {} instead of {MKS_CONTINUUM}; convert it to MKS first",
                self.name(),
                self.unit
            )))
        }
    }

    /// Resamples at new wavenumbers (in place); the bins are rebuilt around
    /// them.
    ///
    /// Outside the current wavenumbers the boundary values are used, or zero
    /// when `zero_outside` is set.
    pub fn sample(&mut self, wavenumbers: &[f64], zero_outside: bool) -> ExokResult<()> {
        let grid = SpectralGrid::from_centers(wavenumbers.to_vec())?;
        let old = self.grid.centers();
        let (lo, hi) = (old[0], old[old.len() - 1]);
        let mut abs_coeff = Array2::<f64>::zeros((self.temperature.len(), grid.len()));
        for (mut new, current) in abs_coeff.outer_iter_mut().zip(self.abs_coeff.outer_iter()) {
            let current: Vec<f64> = current.iter().copied().collect();
            for (v, &wn) in new.iter_mut().zip(wavenumbers) {
                *v = if zero_outside && (wn < lo || wn > hi) {
                    0.0
                } else {
                    interp(wn, old, &current)
                };
            }
        }
        log::debug!(
            "sampled continuum {} from {} to {} wavenumbers",
            self.name(),
            self.grid.len(),
            grid.len()
        );
        self.abs_coeff = abs_coeff;
        self.grid = grid;
        Ok(())
    }

    /// Converts the coefficients (in place); see [`crate::units::resolve_unit`].
    pub fn convert_unit(&mut self, target: &UnitSpec, assumed: &UnitSpec) -> ExokResult<()> {
        let resolved = resolve_unit("absorption coefficient unit", &self.unit, assumed, target)?;
        if resolved.factor != 1.0 {
            self.abs_coeff.mapv_inplace(|v| v * resolved.factor);
        }
        self.unit = UnitSpec::Known(resolved.unit);
        Ok(())
    }

    /// Converts to m^5 (in place).
    ///
    /// Besides length^5 units, coefficients per amagat (an area) and per
    /// amagat squared (an inverse length) are recognised.
    pub fn convert_to_mks(&mut self) -> ExokResult<()> {
        let current = match &self.unit {
            UnitSpec::Known(u) => Unit::parse(u).map_err(ConversionError::from)?,
            UnitSpec::Unspecified => {
                return Err(ExokError::UnresolvedUnit {
                    quantity: "absorption coefficient unit".to_string(),
                })
            }
        };
        let (target, per_amagat) = [("m^5", 0), ("m^2", 1), ("m^-1", 2)]
            .into_iter()
            .find(|(u, _)| Unit::parse(u).is_ok_and(|t| t.is_compatible(&current)))
            .ok_or_else(|| {
                ExokError::Configuration(format!(
                    "cannot convert a continuum in {} to {MKS_CONTINUUM}",
                    self.unit
                ))
            })?;
        let factor = current.conversion_factor(&Unit::parse(target).map_err(ConversionError::from)?)?
            / LOSCHMIDT.powi(per_amagat);
        if factor != 1.0 {
            self.abs_coeff.mapv_inplace(|v| v * factor);
        }
        self.unit = UnitSpec::known(MKS_CONTINUUM);
        Ok(())
    }

    pub fn remove_zeros(&mut self, decades: f64) {
        replace_zeros(&mut self.abs_coeff, decades);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn settings() -> Settings {
        Settings {
            mks_units: false,
            ..Default::default()
        }
    }

    fn table() -> ContinuumTable {
        ContinuumTable::new(
            ("H2", "H2"),
            vec![100.0, 200.0],
            SpectralGrid::from_edges(vec![0.0, 10.0, 20.0, 30.0]).unwrap(),
            array![[1e-46, 2e-46, 0.0], [4e-46, 8e-46, 0.0]],
            UnitSpec::known("m^5"),
            &settings(),
        )
        .unwrap()
    }

    #[test]
    fn test_interpolate_in_temperature() {
        let t = table();
        let res = t.interpolate(&[100.0, 150.0, 300.0], None, Some(false)).unwrap();
        assert_eq!(res.shape(), &[3, 3]);
        assert_relative_eq!(res[[0, 0]], 1e-46);
        assert_relative_eq!(res[[1, 0]], 2.5e-46);
        assert_relative_eq!(res[[2, 1]], 8e-46);

        let res = t.interpolate(&[150.0], Some((5.0, 30.0)), Some(true)).unwrap();
        assert_eq!(res.shape(), &[1, 2]);
        assert_relative_eq!(res[[0, 0]], 4e-46, max_relative = 1e-12);
        assert_eq!(res[[0, 1]], 0.0);
    }

    #[test]
    fn test_effective_cross_section() {
        let t = table();
        let res = t
            .effective_cross_section(&[5.0], &[100.0], &[0.5], &[0.5], None)
            .unwrap();
        let density = 1e5 / (BOLTZMANN * 100.0);
        assert_relative_eq!(res[[0, 1]], 2e-46 * density * 0.25, max_relative = 1e-12);

        let bad = t.effective_cross_section(&[5.0, 4.0], &[100.0], &[0.5], &[0.5], None);
        assert!(matches!(bad, Err(ExokError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_effective_cross_section_needs_m5() {
        let mut t = ContinuumTable::hitran(
            ("N2", "N2"),
            vec![300.0],
            SpectralGrid::from_edges(vec![1.0, 2.0]).unwrap(),
            array![[1e-40]],
            &settings(),
        )
        .unwrap();
        let result = t.effective_cross_section(&[5.0], &[300.0], &[1.0], &[1.0], None);
        assert!(matches!(result, Err(ExokError::Configuration(_))));

        t.convert_to_mks().unwrap();
        let res = t
            .effective_cross_section(&[5.0], &[300.0], &[1.0], &[1.0], None)
            .unwrap();
        let density = 1e5 / (BOLTZMANN * 300.0);
        assert_relative_eq!(res[[0, 0]], 1e-50 * density, max_relative = 1e-12);
    }

    #[test]
    fn test_sample_rebuilds_grid() {
        let mut t = table();
        t.sample(&[10.0, 15.0, 40.0], true).unwrap();
        assert_eq!(t.grid().edges(), &[10.0, 12.5, 27.5, 40.0]);
        assert_relative_eq!(t.abs_coeff()[[0, 0]], 1.5e-46);
        assert_relative_eq!(t.abs_coeff()[[0, 1]], 2e-46);
        assert_eq!(t.abs_coeff()[[0, 2]], 0.0);

        let mut t = table();
        t.sample(&[0.0, 40.0], false).unwrap();
        assert_relative_eq!(t.abs_coeff()[[1, 0]], 4e-46);
        assert_eq!(t.abs_coeff()[[1, 1]], 0.0);
    }

    #[test]
    fn test_hitran_convention_converts_to_m5() {
        let t = ContinuumTable::hitran(
            ("N2", "N2"),
            vec![300.0],
            SpectralGrid::from_edges(vec![1.0, 2.0]).unwrap(),
            array![[1e-40]],
            &Settings::default(),
        )
        .unwrap();
        assert_eq!(t.unit(), &UnitSpec::known("m^5"));
        assert_relative_eq!(t.abs_coeff()[[0, 0]], 1e-50, max_relative = 1e-12);
    }

    #[test]
    fn test_per_amagat_units() {
        let mut t = ContinuumTable::new(
            ("H2", "He"),
            vec![300.0],
            SpectralGrid::from_edges(vec![1.0, 2.0]).unwrap(),
            array![[1.0]],
            UnitSpec::known("cm^-1"),
            &settings(),
        )
        .unwrap();
        t.convert_to_mks().unwrap();
        assert_relative_eq!(
            t.abs_coeff()[[0, 0]],
            100.0 / LOSCHMIDT.powi(2),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_remove_zeros() {
        let mut t = table();
        t.remove_zeros(2.0);
        assert_relative_eq!(t.abs_coeff()[[0, 2]], 1e-48, max_relative = 1e-12);
    }

    #[test]
    fn test_unspecified_unit_fails() {
        let result = ContinuumTable::new(
            ("H2", "H2"),
            vec![100.0],
            SpectralGrid::from_edges(vec![1.0, 2.0]).unwrap(),
            array![[1.0]],
            UnitSpec::Unspecified,
            &Settings::default(),
        );
        assert!(matches!(result, Err(ExokError::UnresolvedUnit { .. })));
    }
}
