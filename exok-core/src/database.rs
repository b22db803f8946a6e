//! Collections of opacity tables keyed by species.
//!
//! A [`TableDatabase`] holds tables of one kind sharing one quadrature and
//! tracks whether its members also share their spectral grid, their (p, t)
//! grid and their units. Only a consolidated database can be queried as a
//! whole.

use crate::continuum::ContinuumTable;
use crate::errors::{ExokError, ExokResult};
use crate::ktable::CorrelatedKTable;
use crate::ktable5d::VariableGasKTable;
use crate::overlap::Resampling;
use crate::quadrature::QuadratureGrid;
use crate::spectral_grid::SpectralGrid;
use crate::table::{BinDownOptions, SpectralTable, TableKind, VmrField};
use crate::units::{UnitSpec, MKS_CROSS_SECTION, MKS_PRESSURE};
use is_close::is_close;
use ndarray::Array2;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct TableDatabase {
    tables: BTreeMap<String, SpectralTable>,
    consolidated_wn_grid: bool,
    consolidated_pt_grid: bool,
    consolidated_p_unit: bool,
    consolidated_value_unit: bool,
}

impl TableDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database holding `tables`, keyed by their molecule names.
    pub fn from_tables<T: Into<SpectralTable>>(
        tables: impl IntoIterator<Item = T>,
    ) -> ExokResult<Self> {
        let mut db = Self::new();
        for table in tables {
            db.insert(table.into())?;
        }
        Ok(db)
    }

    /// Adds a table under its molecule name, returning the table it replaces.
    ///
    /// # Errors
    ///
    /// `Configuration` if the table is a variable-gas table, is of another
    /// kind than the members, or does not share their quadrature.
    pub fn insert(&mut self, table: impl Into<SpectralTable>) -> ExokResult<Option<SpectralTable>> {
        let table = table.into();
        if table.kind() == TableKind::VariableGas {
            return Err(ExokError::Configuration(format!(
                "variable-gas table {} cannot be stored in a table database",
                table.molecule()
            )));
        }
        if let Some(first) = self.first() {
            if first.kind() != table.kind() {
                return Err(ExokError::Configuration(format!(
                    "cannot add a {:?} table for {} to a database of {:?} tables",
                    table.kind(),
                    table.molecule(),
                    first.kind()
                )));
            }
            if first.quadrature() != table.quadrature() {
                return Err(ExokError::Configuration(format!(
                    "the g-space quadrature of {} differs from the one of the database",
                    table.molecule()
                )));
            }
        }
        let previous = self.tables.insert(table.molecule().to_string(), table);
        self.check_consolidation();
        Ok(previous)
    }

    pub fn remove(&mut self, molecule: &str) -> Option<SpectralTable> {
        let removed = self.tables.remove(molecule);
        self.check_consolidation();
        removed
    }

    pub fn get(&self, molecule: &str) -> Option<&SpectralTable> {
        self.tables.get(molecule)
    }

    pub fn contains(&self, molecule: &str) -> bool {
        self.tables.contains_key(molecule)
    }

    pub fn molecules(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SpectralTable)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn first(&self) -> Option<&SpectralTable> {
        self.tables.values().next()
    }

    pub fn kind(&self) -> Option<TableKind> {
        self.first().map(SpectralTable::kind)
    }

    /// Quadrature shared by every member.
    pub fn quadrature(&self) -> Option<&QuadratureGrid> {
        self.first().and_then(SpectralTable::quadrature)
    }

    /// Spectral grid shared by every member, if any.
    pub fn grid(&self) -> Option<&SpectralGrid> {
        if self.consolidated_wn_grid {
            self.first().map(SpectralTable::grid)
        } else {
            None
        }
    }

    pub fn pressure_unit(&self) -> Option<&UnitSpec> {
        if self.consolidated_p_unit {
            self.first().map(SpectralTable::pressure_unit)
        } else {
            None
        }
    }

    pub fn is_consolidated_wn_grid(&self) -> bool {
        self.consolidated_wn_grid
    }

    pub fn is_consolidated_pt_grid(&self) -> bool {
        self.consolidated_pt_grid
    }

    pub fn is_consolidated_p_unit(&self) -> bool {
        self.consolidated_p_unit
    }

    pub fn is_consolidated_value_unit(&self) -> bool {
        self.consolidated_value_unit
    }

    fn check_consolidation(&mut self) {
        let same = |a: &[f64], b: &[f64]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| is_close!(*x, *y))
        };
        let mut tables = self.tables.values();
        let (wn, pt, p_unit, value_unit) = match tables.next() {
            None => (true, true, true, true),
            Some(first) => {
                let others: Vec<&SpectralTable> = tables.collect();
                (
                    others.iter().all(|t| t.grid().approx_eq(first.grid())),
                    others.iter().all(|t| {
                        same(t.pressure(), first.pressure())
                            && same(t.temperature(), first.temperature())
                    }),
                    others
                        .iter()
                        .all(|t| t.pressure_unit().same_as(first.pressure_unit())),
                    others
                        .iter()
                        .all(|t| t.value_unit().same_as(first.value_unit())),
                )
            }
        };
        self.consolidated_wn_grid = wn;
        self.consolidated_pt_grid = pt;
        self.consolidated_p_unit = p_unit;
        self.consolidated_value_unit = value_unit;
    }

    /// Checks that members can be queried and combined bin by bin.
    pub fn ensure_queryable(&self) -> ExokResult<()> {
        if self.is_empty() {
            return Err(ExokError::Configuration(
                "the opacity database is empty".to_string(),
            ));
        }
        if !self.consolidated_wn_grid {
            return Err(ExokError::Configuration(
                "the tables of the database do not share one spectral grid; \
                 sample or bin them down first"
                    .to_string(),
            ));
        }
        if !(self.consolidated_p_unit && self.consolidated_value_unit) {
            return Err(ExokError::Configuration(
                "the tables of the database do not share the same units; \
                 convert them first"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Checks that the database is queryable and in Pa and m^2/molecule,
    /// the units radiative transfer works in.
    pub fn ensure_mks(&self) -> ExokResult<()> {
        self.ensure_queryable()?;
        for (molecule, table) in self.iter() {
            let in_pa = table.pressure_unit().is_equivalent_to(MKS_PRESSURE);
            let in_m2 = table.value_unit().is_equivalent_to(MKS_CROSS_SECTION);
            if !(in_pa && in_m2) {
                return Err(ExokError::Configuration(format!(
                    "the {molecule} table is in {} and {} instead of {MKS_PRESSURE} and \
                     {MKS_CROSS_SECTION}; convert the database to MKS first",
                    table.pressure_unit(),
                    table.value_unit()
                )));
            }
        }
        Ok(())
    }

    /// Applies `op` to a copy of every member, then swaps the copies in.
    fn apply(&mut self, mut op: impl FnMut(&mut SpectralTable) -> ExokResult<()>) -> ExokResult<()> {
        let mut tables = self.tables.clone();
        for table in tables.values_mut() {
            op(table)?;
        }
        self.tables = tables;
        self.check_consolidation();
        Ok(())
    }

    pub fn sample(&mut self, grid: &SpectralGrid, zero_outside: bool) -> ExokResult<()> {
        self.apply(|t| {
            t.sample(grid, zero_outside);
            Ok(())
        })
    }

    pub fn bin_down(&mut self, new_edges: &[f64], options: &BinDownOptions) -> ExokResult<()> {
        self.apply(|t| t.bin_down(new_edges, options))
    }

    pub fn remap_grid(&mut self, log_pressure: &[f64], temperature: &[f64]) -> ExokResult<()> {
        self.apply(|t| t.remap_grid(log_pressure, temperature, None))
    }

    pub fn remap_g(&mut self, quadrature: &QuadratureGrid) -> ExokResult<()> {
        self.apply(|t| t.remap_g(quadrature))
    }

    pub fn convert_pressure_unit(&mut self, target: &UnitSpec, assumed: &UnitSpec) -> ExokResult<()> {
        self.apply(|t| t.convert_pressure_unit(target, assumed))
    }

    pub fn convert_value_unit(&mut self, target: &UnitSpec, assumed: &UnitSpec) -> ExokResult<()> {
        self.apply(|t| t.convert_value_unit(target, assumed))
    }

    pub fn convert_to_mks(&mut self) -> ExokResult<()> {
        self.apply(SpectralTable::convert_to_mks)
    }

    pub fn clip_spectral_range(&mut self, lo: f64, hi: f64) -> ExokResult<()> {
        self.apply(|t| t.clip_spectral_range(lo, hi))
    }

    /// Correlated-k table of a gas mixture, built by random overlap.
    ///
    /// The first species found in the database is scaled by its mixing
    /// ratio; each following one is mixed in with its own. Species that are
    /// not in the database are skipped with a warning, and `inactive` ones
    /// are ignored.
    ///
    /// # Errors
    ///
    /// `Configuration` for a cross-section database, an unconsolidated (p, t)
    /// grid or a composition without any tabulated species.
    pub fn create_mix(
        &self,
        composition: &[(&str, VmrField)],
        inactive: &[&str],
        resampling: Resampling,
    ) -> ExokResult<CorrelatedKTable> {
        self.ensure_queryable()?;
        if self.kind() != Some(TableKind::CorrelatedK) {
            return Err(ExokError::Configuration(
                "mixes are built from correlated-k tables".to_string(),
            ));
        }
        if !self.consolidated_pt_grid {
            return Err(ExokError::Configuration(
                "the tables of the database do not share one (p, t) grid; remap them first"
                    .to_string(),
            ));
        }
        let mut mix: Option<SpectralTable> = None;
        for (molecule, vmr) in composition {
            if inactive.contains(molecule) {
                continue;
            }
            let Some(table) = self.get(molecule) else {
                log::warn!("{molecule} is not in the opacity database and is left out of the mix");
                continue;
            };
            mix = Some(match mix {
                None => table.scaled(vmr)?,
                Some(current) => {
                    current.combine_with(table, &VmrField::Scalar(1.0), vmr, resampling)?
                }
            });
        }
        let mix = mix.ok_or_else(|| {
            ExokError::Configuration(
                "none of the species of the composition is in the database".to_string(),
            )
        })?;
        CorrelatedKTable::try_from(mix)
    }

    /// Variable-gas table of `variable` diluted in the mix of `background`.
    pub fn create_mix_variable(
        &self,
        variable: &str,
        background: &[(&str, VmrField)],
        mixing_ratio: &[f64],
        resampling: Resampling,
    ) -> ExokResult<VariableGasKTable> {
        let background = self.create_mix(background, &[variable], resampling)?;
        let variable_table = self.get(variable).ok_or_else(|| {
            ExokError::Configuration(format!("{variable} is not in the opacity database"))
        })?;
        let variable_table = CorrelatedKTable::try_from(variable_table.clone())?;
        VariableGasKTable::from_mix(&variable_table, &background, mixing_ratio, resampling)
    }
}

/// Continuum tables keyed by species pair.
#[derive(Clone, Debug, Default)]
pub struct ContinuumDatabase {
    tables: BTreeMap<(String, String), ContinuumTable>,
}

impl ContinuumDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: impl IntoIterator<Item = ContinuumTable>) -> Self {
        let mut db = Self::new();
        for table in tables {
            db.insert(table);
        }
        db
    }

    pub fn insert(&mut self, table: ContinuumTable) -> Option<ContinuumTable> {
        let (a, b) = table.pair();
        let key = (a.to_string(), b.to_string());
        self.tables.insert(key, table)
    }

    pub fn get(&self, mol1: &str, mol2: &str) -> Option<&ContinuumTable> {
        self.tables.get(&(mol1.to_string(), mol2.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContinuumTable> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Spectral grid shared by every member, if any.
    pub fn grid(&self) -> Option<&SpectralGrid> {
        let mut grids = self.tables.values().map(ContinuumTable::grid);
        let first = grids.next()?;
        grids.all(|g| g.same_centers(first)).then_some(first)
    }

    /// Samples every member at the centers of `grid`.
    pub fn sample(&mut self, grid: &SpectralGrid, zero_outside: bool) -> ExokResult<()> {
        let mut tables = self.tables.clone();
        for table in tables.values_mut() {
            table.sample(grid.centers(), zero_outside)?;
        }
        self.tables = tables;
        Ok(())
    }

    pub fn convert_to_mks(&mut self) -> ExokResult<()> {
        let mut tables = self.tables.clone();
        for table in tables.values_mut() {
            table.convert_to_mks()?;
        }
        self.tables = tables;
        Ok(())
    }

    /// Sum of the continuum cross-sections `[layers, Nw]` of every pair whose
    /// partners both appear in `vmr`, or `None` when no pair does.
    ///
    /// `vmr` maps species to one mixing ratio or one per layer.
    pub fn cross_section(
        &self,
        vmr: &BTreeMap<String, Vec<f64>>,
        log_pressure: &[f64],
        temperature: &[f64],
        window: Option<(f64, f64)>,
    ) -> ExokResult<Option<Array2<f64>>> {
        if !self.is_empty() && self.grid().is_none() {
            return Err(ExokError::Configuration(
                "the continuum tables do not share one spectral grid; sample them first"
                    .to_string(),
            ));
        }
        let mut total: Option<Array2<f64>> = None;
        for table in self.tables.values() {
            let (a, b) = table.pair();
            let (Some(x1), Some(x2)) = (vmr.get(a), vmr.get(b)) else {
                continue;
            };
            let sigma = table.effective_cross_section(log_pressure, temperature, x1, x2, window)?;
            total = Some(match total {
                None => sigma,
                Some(acc) => acc + sigma,
            });
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::table::{TableMetadata, TableParts};
    use approx::assert_relative_eq;
    use ndarray::{array, Array};

    fn settings() -> Settings {
        Settings {
            mks_units: false,
            ..Default::default()
        }
    }

    fn ktable(molecule: &str, scale: f64, order: usize, edges: Vec<f64>) -> CorrelatedKTable {
        let quad = QuadratureGrid::gauss_legendre(order).unwrap();
        let nw = edges.len() - 1;
        let values = Array::from_shape_fn((2, 2, 1, nw, order), |(_, _, _, _, ig)| {
            scale * (1.0 + ig as f64)
        });
        CorrelatedKTable::from_parts(
            TableParts {
                metadata: TableMetadata::new(molecule),
                pressure: vec![1e3, 1e5],
                temperature: vec![200.0, 300.0],
                mixing_ratio: None,
                grid: SpectralGrid::from_edges(edges).unwrap(),
                quadrature: Some(quad),
                values,
                pressure_unit: UnitSpec::known("Pa"),
                value_unit: UnitSpec::known("m^2/molecule"),
            },
            &settings(),
        )
        .unwrap()
    }

    fn database() -> TableDatabase {
        TableDatabase::from_tables([
            ktable("H2O", 1e-24, 4, vec![100.0, 200.0, 300.0]),
            ktable("CO2", 1e-26, 4, vec![100.0, 200.0, 300.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_consolidation_flags() {
        let mut db = database();
        assert_eq!(db.len(), 2);
        assert!(db.is_consolidated_wn_grid());
        assert!(db.is_consolidated_pt_grid());
        assert!(db.ensure_queryable().is_ok());

        db.insert(ktable("CH4", 1e-25, 4, vec![100.0, 150.0, 300.0]))
            .unwrap();
        assert!(!db.is_consolidated_wn_grid());
        assert!(db.grid().is_none());
        assert!(matches!(db.ensure_queryable(), Err(ExokError::Configuration(_))));

        db.remove("CH4");
        assert!(db.is_consolidated_wn_grid());
    }

    #[test]
    fn test_mixed_quadratures_rejected() {
        let mut db = database();
        let result = db.insert(ktable("CH4", 1e-25, 6, vec![100.0, 200.0, 300.0]));
        assert!(matches!(result, Err(ExokError::Configuration(_))));
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn test_unit_conversion_applies_to_all() {
        let mut db = database();
        db.convert_pressure_unit(&UnitSpec::known("bar"), &UnitSpec::Unspecified)
            .unwrap();
        for (_, table) in db.iter() {
            assert_eq!(table.pressure_unit(), &UnitSpec::known("bar"));
            assert_relative_eq!(table.pressure()[1], 1.0, max_relative = 1e-12);
        }
        assert!(db.is_consolidated_p_unit());
    }

    #[test]
    fn test_non_mks_database_is_rejected() {
        let mut db = database();
        assert!(db.ensure_mks().is_ok());
        db.convert_pressure_unit(&UnitSpec::known("bar"), &UnitSpec::Unspecified)
            .unwrap();
        db.convert_value_unit(&UnitSpec::known("cm^2/molecule"), &UnitSpec::Unspecified)
            .unwrap();
        assert!(db.ensure_queryable().is_ok());
        assert!(matches!(db.ensure_mks(), Err(ExokError::Configuration(_))));

        db.convert_to_mks().unwrap();
        assert!(db.ensure_mks().is_ok());
    }

    #[test]
    fn test_failed_operation_leaves_database_untouched() {
        let mut db = database();
        let result = db.convert_pressure_unit(&UnitSpec::known("m^2"), &UnitSpec::Unspecified);
        assert!(result.is_err());
        assert_eq!(db.get("H2O").unwrap().pressure_unit(), &UnitSpec::known("Pa"));
    }

    #[test]
    fn test_create_mix_scales_single_species() {
        let db = database();
        let mix = db
            .create_mix(&[("H2O", VmrField::Scalar(0.1))], &[], Resampling::Interpolate)
            .unwrap();
        let h2o = db.get("H2O").unwrap();
        for (m, k) in mix.values().iter().zip(h2o.values().iter()) {
            assert_relative_eq!(*m, 0.1 * k, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_create_mix_skips_missing_and_inactive() {
        let db = database();
        let mix = db
            .create_mix(
                &[
                    ("H2O", VmrField::Scalar(0.5)),
                    ("NH3", VmrField::Scalar(0.2)),
                    ("CO2", VmrField::Scalar(0.3)),
                ],
                &["CO2"],
                Resampling::Interpolate,
            )
            .unwrap();
        assert_eq!(mix.molecule(), "H2O");

        let none = db.create_mix(&[("NH3", VmrField::Scalar(1.0))], &[], Resampling::Interpolate);
        assert!(matches!(none, Err(ExokError::Configuration(_))));
    }

    #[test]
    fn test_create_mix_variable() {
        let db = database();
        let table = db
            .create_mix_variable(
                "H2O",
                &[("CO2", VmrField::Scalar(1.0))],
                &[1e-3, 1e-1],
                Resampling::Interpolate,
            )
            .unwrap();
        assert_eq!(table.shape(), [2, 2, 2, 2, 4]);
    }

    #[test]
    fn test_continuum_database() {
        let grid = SpectralGrid::from_edges(vec![100.0, 200.0, 300.0]).unwrap();
        let cia = |a: &str, b: &str, k: f64| {
            ContinuumTable::new(
                (a, b),
                vec![100.0, 300.0],
                grid.clone(),
                array![[k, k], [k, k]],
                UnitSpec::known("m^5"),
                &settings(),
            )
            .unwrap()
        };
        let db = ContinuumDatabase::from_tables([cia("H2", "H2", 1e-50), cia("H2", "He", 2e-50)]);
        assert_eq!(db.len(), 2);
        assert!(db.get("H2", "He").is_some());

        let mut vmr = BTreeMap::new();
        vmr.insert("H2".to_string(), vec![0.9]);
        let sigma = db
            .cross_section(&vmr, &[5.0], &[200.0], None)
            .unwrap()
            .unwrap();
        let n = 1e5 / (crate::units::registry::BOLTZMANN * 200.0);
        assert_relative_eq!(sigma[[0, 0]], 1e-50 * n * 0.81, max_relative = 1e-12);

        vmr.insert("He".to_string(), vec![0.1]);
        let sigma = db
            .cross_section(&vmr, &[5.0], &[200.0], None)
            .unwrap()
            .unwrap();
        assert_relative_eq!(
            sigma[[0, 1]],
            (1e-50 * 0.81 + 2e-50 * 0.09) * n,
            max_relative = 1e-12
        );

        let empty = BTreeMap::new();
        assert!(db.cross_section(&empty, &[5.0], &[200.0], None).unwrap().is_none());
    }
}
