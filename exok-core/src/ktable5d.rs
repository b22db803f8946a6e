//! Correlated-k tables with a mixing-ratio axis.
//!
//! A [`VariableGasKTable`] tabulates the k-distributions of a mixture whose
//! composition changes with the abundance of one species. The mixing ratio is
//! an interpolation coordinate (in ln x) next to log10 p and T.

use crate::errors::{ExokError, ExokResult};
use crate::ktable::CorrelatedKTable;
use crate::overlap::Resampling;
use crate::settings::Settings;
use crate::table::{
    mix_arrays, SpectralTable, TableKind, TableMetadata, TableParts, TableQuery, VmrField,
};
use ndarray::{s, Array3, Array5, Axis};
use std::ops::{Deref, DerefMut};

#[derive(Clone, Debug)]
pub struct VariableGasKTable(SpectralTable);

impl Deref for VariableGasKTable {
    type Target = SpectralTable;

    fn deref(&self) -> &SpectralTable {
        &self.0
    }
}

impl DerefMut for VariableGasKTable {
    fn deref_mut(&mut self) -> &mut SpectralTable {
        &mut self.0
    }
}

impl TryFrom<SpectralTable> for VariableGasKTable {
    type Error = ExokError;

    fn try_from(table: SpectralTable) -> ExokResult<Self> {
        match table.kind() {
            TableKind::VariableGas => Ok(Self(table)),
            kind => Err(ExokError::Configuration(format!(
                "expected a variable-gas table, found a {kind:?} table"
            ))),
        }
    }
}

impl From<VariableGasKTable> for SpectralTable {
    fn from(table: VariableGasKTable) -> Self {
        table.0
    }
}

impl VariableGasKTable {
    pub fn from_parts(parts: TableParts, settings: &Settings) -> ExokResult<Self> {
        Self::try_from(SpectralTable::from_parts(parts, settings)?)
    }

    pub fn into_table(self) -> SpectralTable {
        self.0
    }

    pub fn mixing_ratios(&self) -> &[f64] {
        self.0.mixing_ratio().unwrap_or_default()
    }

    /// Interpolates at `(log10 p, T, vmr)` points.
    pub fn interpolate_at(
        &self,
        log_pressure: &[f64],
        temperature: &[f64],
        mixing_ratio: &[f64],
    ) -> ExokResult<Array3<f64>> {
        self.0
            .interpolate(&TableQuery::new(log_pressure, temperature).mixing_ratio(mixing_ratio))
    }

    /// Correlated-k table of the slice at mixing-ratio node `ix`.
    pub fn slice_at(&self, ix: usize) -> ExokResult<CorrelatedKTable> {
        let nx = self.mixing_ratios().len();
        if ix >= nx {
            return Err(ExokError::Configuration(format!(
                "mixing ratio node {ix} does not exist, the table has {nx}"
            )));
        }
        let values = self
            .0
            .values()
            .slice(s![.., .., ix..ix + 1, .., ..])
            .to_owned();
        let parts = TableParts {
            mixing_ratio: None,
            values,
            ..self.0.clone().into_parts()
        };
        CorrelatedKTable::from_parts(parts, &no_conversion(self.0.settings()))
    }

    /// Tabulates the mix of `variable` at each mixing ratio with `background`
    /// making up the rest: `overlap(variable·x, background·(1 - x))`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` or `Configuration` if the two tables do not share
    /// their axes, units and quadrature, `InvalidGrid` for a bad mixing ratio
    /// axis.
    pub fn from_mix(
        variable: &CorrelatedKTable,
        background: &CorrelatedKTable,
        mixing_ratio: &[f64],
        resampling: Resampling,
    ) -> ExokResult<Self> {
        variable.check_combinable(background)?;
        let quadrature = variable.g_grid();
        let [np, nt, _, nw, ng] = variable.shape();
        let mut values = Array5::<f64>::zeros((np, nt, mixing_ratio.len(), nw, ng));
        for (ix, &x) in mixing_ratio.iter().enumerate() {
            let a = variable.scaled_values(&VmrField::Scalar(x))?;
            let b = background.scaled_values(&VmrField::Scalar(1.0 - x))?;
            let mixed = mix_arrays(&a, &b, quadrature, resampling)?;
            values
                .slice_mut(s![.., .., ix..ix + 1, .., ..])
                .assign(&mixed);
        }
        log::debug!(
            "tabulated {} in {} over {} mixing ratios",
            variable.molecule(),
            background.molecule(),
            mixing_ratio.len()
        );
        let mut metadata = TableMetadata::new(variable.molecule());
        metadata.method = variable.metadata().method.clone();
        let parts = TableParts {
            metadata,
            mixing_ratio: Some(mixing_ratio.to_vec()),
            values,
            ..variable.as_table().clone().into_parts()
        };
        Self::from_parts(parts, &no_conversion(variable.settings()))
    }

    /// Mixes a fixed-composition table into every mixing-ratio slice.
    ///
    /// Slice `ix` becomes `overlap(self[ix]·x_self, fixed·x_other·(1 - x[ix]))`,
    /// the fixed gas being diluted by the variable species.
    pub fn combine_with(
        &self,
        fixed: &CorrelatedKTable,
        x_self: &VmrField,
        x_other: &VmrField,
        resampling: Resampling,
    ) -> ExokResult<Self> {
        let quadrature = fixed.g_grid();
        let mut values = self.0.values().clone();
        for (ix, &x) in self.mixing_ratios().iter().enumerate() {
            let slice = self.slice_at(ix)?;
            slice.check_combinable(fixed)?;
            let a = slice.scaled_values(x_self)?;
            let mut b = fixed.scaled_values(x_other)?;
            b.mapv_inplace(|v| v * (1.0 - x));
            let mixed = mix_arrays(&a, &b, quadrature, resampling)?;
            values
                .index_axis_mut(Axis(2), ix)
                .assign(&mixed.index_axis(Axis(2), 0));
        }
        let mut res = self.0.with_values(values, Some(quadrature.clone()))?;
        res.metadata_mut().molecule = format!("{}+{}", self.molecule(), fixed.molecule());
        Self::try_from(res)
    }
}

/// Copies settings without the unit conversion on build, for tables derived
/// from already converted ones.
fn no_conversion(settings: &Settings) -> Settings {
    Settings {
        mks_units: false,
        ..settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadrature::QuadratureGrid;
    use crate::spectral_grid::SpectralGrid;
    use crate::units::UnitSpec;
    use approx::assert_relative_eq;
    use ndarray::Array;

    fn settings() -> Settings {
        Settings {
            mks_units: false,
            ..Default::default()
        }
    }

    fn ktable(molecule: &str, scale: f64) -> CorrelatedKTable {
        let quad = QuadratureGrid::gauss_legendre(4).unwrap();
        let g = quad.abscissas().to_vec();
        let values = Array::from_shape_fn((2, 2, 1, 3, 4), |(ip, it, _, iw, ig)| {
            scale * (1.0 + ip as f64) * (1.0 + it as f64) * (1.0 + iw as f64) * 10f64.powf(g[ig])
        });
        CorrelatedKTable::from_parts(
            TableParts {
                metadata: TableMetadata::new(molecule),
                pressure: vec![1e3, 1e5],
                temperature: vec![200.0, 400.0],
                mixing_ratio: None,
                grid: SpectralGrid::from_edges(vec![100.0, 200.0, 300.0, 400.0]).unwrap(),
                quadrature: Some(quad),
                values,
                pressure_unit: UnitSpec::known("Pa"),
                value_unit: UnitSpec::known("m^2/molecule"),
            },
            &settings(),
        )
        .unwrap()
    }

    fn zero_background() -> CorrelatedKTable {
        ktable("N2", 0.0)
    }

    #[test]
    fn test_from_mix_with_transparent_background() {
        let h2o = ktable("H2O", 1e-25);
        let table =
            VariableGasKTable::from_mix(&h2o, &zero_background(), &[1e-4, 1e-2, 1.0], Resampling::Interpolate)
                .unwrap();
        assert_eq!(table.kind(), TableKind::VariableGas);
        assert_eq!(table.shape(), [2, 2, 3, 3, 4]);
        for (ix, x) in [1e-4, 1e-2, 1.0].iter().enumerate() {
            let slice = table.slice_at(ix).unwrap();
            for (a, b) in slice.values().iter().zip(h2o.values().iter()) {
                assert_relative_eq!(*a, x * b, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_interpolation_on_mixing_ratio_nodes() {
        let h2o = ktable("H2O", 1e-25);
        let table =
            VariableGasKTable::from_mix(&h2o, &zero_background(), &[1e-4, 1e-2], Resampling::Interpolate)
                .unwrap();
        let res = table.interpolate_at(&[3.0], &[200.0], &[1e-2]).unwrap();
        assert_eq!(res.shape(), &[1, 3, 4]);
        assert_relative_eq!(
            res[[0, 1, 2]],
            1e-2 * h2o.values()[[0, 0, 0, 1, 2]],
            max_relative = 1e-10
        );

        // log interpolation in ln x of a quantity linear in x is exact
        let mid = (1e-4f64 * 1e-2).sqrt();
        let res = table.interpolate_at(&[3.0], &[200.0], &[mid]).unwrap();
        assert_relative_eq!(
            res[[0, 0, 0]],
            mid * h2o.values()[[0, 0, 0, 0, 0]],
            max_relative = 1e-10
        );
    }

    #[test]
    fn test_remap_rejects_non_positive_mixing_ratios() {
        let h2o = ktable("H2O", 1e-25);
        let mut table =
            VariableGasKTable::from_mix(&h2o, &zero_background(), &[1e-4, 1e-2], Resampling::Interpolate)
                .unwrap();
        let original = table.values().clone();
        let log_p = table.log_pressure().to_vec();
        let t = table.temperature().to_vec();
        for x in [[0.0, 0.1], [-0.1, 0.1]] {
            let result = table.remap_grid(&log_p, &t, Some(&x));
            assert!(matches!(result, Err(ExokError::InvalidGrid(_))));
        }
        assert_eq!(table.mixing_ratios(), &[1e-4, 1e-2]);
        assert_eq!(table.values(), &original);

        table.remap_grid(&log_p, &t, Some(&[1e-3])).unwrap();
        assert_eq!(table.shape(), [2, 2, 1, 3, 4]);
    }

    #[test]
    fn test_query_without_mixing_ratio_fails() {
        let h2o = ktable("H2O", 1e-25);
        let table =
            VariableGasKTable::from_mix(&h2o, &zero_background(), &[0.1, 0.2], Resampling::Interpolate)
                .unwrap();
        let result = table.interpolate(&TableQuery::at(3.0, 300.0));
        assert!(matches!(result, Err(ExokError::Configuration(_))));
    }

    #[test]
    fn test_combine_with_transparent_fixed_gas() {
        let h2o = ktable("H2O", 1e-25);
        let table =
            VariableGasKTable::from_mix(&h2o, &zero_background(), &[0.1, 0.5], Resampling::Interpolate)
                .unwrap();
        let combined = table
            .combine_with(&zero_background(), &VmrField::Scalar(1.0), &VmrField::Scalar(0.3), Resampling::Rebin)
            .unwrap();
        assert_eq!(combined.values(), table.values());
        assert_eq!(combined.molecule(), "H2O+N2");
    }

    #[test]
    fn test_combine_with_dilutes_fixed_gas() {
        let h2o = ktable("H2O", 0.0);
        let table =
            VariableGasKTable::from_mix(&h2o, &zero_background(), &[0.1, 0.5], Resampling::Interpolate)
                .unwrap();
        let co2 = ktable("CO2", 1e-24);
        let combined = table
            .combine_with(&co2, &VmrField::Scalar(1.0), &VmrField::Scalar(1.0), Resampling::Interpolate)
            .unwrap();
        let slice = combined.slice_at(1).unwrap();
        for (a, b) in slice.values().iter().zip(co2.values().iter()) {
            assert_relative_eq!(*a, 0.5 * b, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_from_mix_rejects_different_grids() {
        let h2o = ktable("H2O", 1e-25);
        let mut other = ktable("N2", 1e-27);
        other.clip_spectral_range(100.0, 300.0).unwrap();
        let result = VariableGasKTable::from_mix(&h2o, &other, &[0.5], Resampling::Interpolate);
        assert!(matches!(result, Err(ExokError::ShapeMismatch { .. })));
    }
}
