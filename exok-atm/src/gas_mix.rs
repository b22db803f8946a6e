//! Opacity of a gas mixture.
//!
//! A [`GasMixture`] ties a [`GasComposition`] to the databases its opacities
//! come from. The databases are borrowed: one set of tables can serve any
//! number of mixtures.

use crate::composition::GasComposition;
use crate::rayleigh::mixture_cross_section;
use exok_core::database::{ContinuumDatabase, TableDatabase};
use exok_core::errors::{ExokError, ExokResult};
use exok_core::overlap::{mix_profiles, Resampling};
use exok_core::quadrature::QuadratureGrid;
use exok_core::spectral_grid::SpectralGrid;
use exok_core::table::{TableKind, TableQuery};
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossSectionOptions {
    /// Wavenumber window (cm^-1); the whole grid if `None`.
    pub window: Option<(f64, f64)>,
    /// Combine correlated-k tables by random overlap rather than summing them.
    pub random_overlap: bool,
    pub rayleigh: bool,
    #[serde(skip)]
    pub resampling: Resampling,
    /// Overrides the interpolation mode of the tables.
    pub log_interp: Option<bool>,
}

impl Default for CrossSectionOptions {
    fn default() -> Self {
        Self {
            window: None,
            random_overlap: true,
            rayleigh: false,
            resampling: Resampling::default(),
            log_interp: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GasMixture<'a> {
    composition: GasComposition,
    opacities: Option<&'a TableDatabase>,
    continua: Option<&'a ContinuumDatabase>,
}

impl<'a> GasMixture<'a> {
    pub fn new(composition: GasComposition) -> Self {
        Self {
            composition,
            opacities: None,
            continua: None,
        }
    }

    pub fn with_opacities(mut self, database: &'a TableDatabase) -> Self {
        self.opacities = Some(database);
        self
    }

    pub fn with_continua(mut self, database: &'a ContinuumDatabase) -> Self {
        self.continua = Some(database);
        self
    }

    pub fn composition(&self) -> &GasComposition {
        &self.composition
    }

    pub fn composition_mut(&mut self) -> &mut GasComposition {
        &mut self.composition
    }

    pub fn set_composition(&mut self, composition: GasComposition) {
        self.composition = composition;
    }

    pub fn opacities(&self) -> Option<&'a TableDatabase> {
        self.opacities
    }

    pub fn continua(&self) -> Option<&'a ContinuumDatabase> {
        self.continua
    }

    fn database(&self) -> ExokResult<&'a TableDatabase> {
        let database = self.opacities.ok_or_else(|| {
            ExokError::Configuration("the gas mixture has no opacity database".to_string())
        })?;
        database.ensure_mks()?;
        Ok(database)
    }

    /// Bin range of the opacity grid selected by `window`.
    pub fn bin_range(&self, window: Option<(f64, f64)>) -> ExokResult<Range<usize>> {
        let grid = self.spectral_grid()?;
        Ok(match window {
            Some((lo, hi)) => grid.window(lo, hi),
            None => 0..grid.len(),
        })
    }

    pub fn spectral_grid(&self) -> ExokResult<&'a SpectralGrid> {
        self.database()?.grid().ok_or_else(|| {
            ExokError::Configuration("the opacity database has no common grid".to_string())
        })
    }

    /// Quadrature of the correlated-k tables; `None` for cross-sections.
    pub fn quadrature(&self) -> ExokResult<Option<&'a QuadratureGrid>> {
        Ok(self.database()?.quadrature())
    }

    /// Weights over the last axis of [`GasMixture::cross_section`].
    pub fn g_weights(&self) -> ExokResult<Vec<f64>> {
        Ok(self
            .quadrature()?
            .map_or_else(|| vec![1.0], |q| q.weights().to_vec()))
    }

    /// Cross-section per molecule of gas, `[layers, Nw, Ng]` in m^2.
    ///
    /// `log_pressure` is log10 of the pressure in Pa. Species of the
    /// composition without a table are skipped.
    ///
    /// # Errors
    ///
    /// `Configuration` if the opacity database is missing, not consolidated
    /// or not in Pa and m^2/molecule, if a continuum is not in m^5, or if the
    /// continuum grid differs from the opacity grid.
    pub fn cross_section(
        &self,
        log_pressure: &[f64],
        temperature: &[f64],
        options: &CrossSectionOptions,
    ) -> ExokResult<Array3<f64>> {
        let database = self.database()?;
        let grid = self.spectral_grid()?;
        let n = log_pressure.len();
        if temperature.len() != n {
            return Err(ExokError::shape_mismatch(
                "layer temperatures",
                &[n],
                &[temperature.len()],
            ));
        }
        self.composition.check_layers(n)?;
        if let Some(continua) = self.continua.filter(|c| !c.is_empty()) {
            let same = continua.grid().is_some_and(|g| g.same_centers(grid));
            if !same {
                return Err(ExokError::Configuration(
                    "the continuum tables are not on the grid of the opacity database; \
                     sample them first"
                        .to_string(),
                ));
            }
        }

        let range = self.bin_range(options.window)?;
        let quadrature = database.quadrature();
        let ng = quadrature.map_or(1, QuadratureGrid::len);
        let overlap = options.random_overlap && database.kind() == Some(TableKind::CorrelatedK);

        let mut total: Option<Array3<f64>> = None;
        for (name, ratio) in self.composition.iter() {
            let Some(table) = database.get(name) else {
                log::warn!("{name} has no opacity table and is skipped");
                continue;
            };
            let fractions = ratio.to_profile(n);
            let mut query = TableQuery::new(log_pressure, temperature)
                .gas_fractions(&fractions)
                .maybe_window(options.window);
            if let Some(log_interp) = options.log_interp {
                query = query.log_interp(log_interp);
            }
            let sigma = table.interpolate(&query)?;
            total = Some(match (total, quadrature) {
                (None, _) => sigma,
                (Some(acc), Some(q)) if overlap => {
                    mix_profiles(acc.view(), sigma.view(), q, options.resampling)?
                }
                (Some(acc), _) => acc + sigma,
            });
        }
        let mut total = total.unwrap_or_else(|| Array3::zeros((n, range.len(), ng)));

        if let Some(continua) = self.continua {
            let vmr: BTreeMap<String, Vec<f64>> = self
                .composition
                .iter()
                .map(|(name, ratio)| (name.to_string(), ratio.to_profile(n)))
                .collect();
            if let Some(cia) = continua.cross_section(&vmr, log_pressure, temperature, options.window)? {
                total += &cia.insert_axis(Axis(2));
            }
        }
        if options.rayleigh {
            let centers = &grid.centers()[range];
            let rayleigh = mixture_cross_section(&self.composition, n, centers);
            total += &rayleigh.insert_axis(Axis(2));
        }
        Ok(total)
    }
}
