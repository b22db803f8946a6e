//! Atmospheric columns.
//!
//! Levels run from the top of the atmosphere (low pressure) to the bottom.
//! Layer `i` lies between levels `i` and `i + 1`, at the midpoint of its
//! levels in log10 p and in T.
//!
//! ```text
//!   level 0      ---------------  plev[0], tlev[0]     (top)
//!   layer 0           play[0], tlay[0]
//!   level 1      ---------------
//!   ...
//!   level Nlay   ---------------  plev[Nlay]           (surface, z = 0)
//! ```
//!
//! Densities, altitudes and column amounts are derived from the profile, the
//! composition and the parameters, and are recomputed whenever one of those
//! changes.

use crate::composition::GasComposition;
use crate::constants::{AVOGADRO, BOLTZMANN, DEFAULT_RCP, GAS_CONSTANT};
use crate::gas_mix::GasMixture;
use crate::molar_mass::{MolarMassLookup, StandardMolarMasses};
use exok_core::errors::{ExokError, ExokResult};
use exok_core::interp::{is_strictly_increasing, linspace};
use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_10, PI};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnParameters {
    /// Surface gravity
    /// unit: m/s^2
    pub gravity: Option<f64>,
    /// unit: m
    pub planet_radius: Option<f64>,
    /// unit: m
    pub star_radius: Option<f64>,
    /// R/cp
    pub rcp: f64,
    /// Mean molar mass of the gas, used instead of the composition's
    /// unit: kg/mol
    pub molar_mass: Option<f64>,
}

impl Default for ColumnParameters {
    fn default() -> Self {
        Self {
            gravity: None,
            planet_radius: None,
            star_radius: None,
            rcp: DEFAULT_RCP,
            molar_mass: None,
        }
    }
}

/// Dry adiabat capped by an isothermal stratosphere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdiabaticProfile {
    /// unit: Pa
    pub surface_pressure: f64,
    /// unit: Pa
    pub top_pressure: f64,
    pub n_levels: usize,
    /// unit: K
    pub surface_temperature: f64,
    /// Floor of the temperature; the surface temperature if `None`.
    /// unit: K
    pub stratosphere_temperature: Option<f64>,
    pub rcp: f64,
}

impl AdiabaticProfile {
    /// Levels `(log10 p, T)`, top first.
    pub fn levels(&self) -> (Vec<f64>, Vec<f64>) {
        let logplev = linspace(
            self.top_pressure.log10(),
            self.surface_pressure.log10(),
            self.n_levels,
        );
        let floor = self
            .stratosphere_temperature
            .unwrap_or(self.surface_temperature);
        let tlev = logplev
            .iter()
            .map(|logp| {
                let p = 10f64.powf(*logp);
                (self.surface_temperature * (p / self.surface_pressure).powf(self.rcp)).max(floor)
            })
            .collect();
        (logplev, tlev)
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Profile {
    logplev: Vec<f64>,
    plev: Vec<f64>,
    tlev: Vec<f64>,
    logplay: Vec<f64>,
    play: Vec<f64>,
    tlay: Vec<f64>,
}

impl Profile {
    fn new(logplev: Vec<f64>, tlev: Vec<f64>) -> ExokResult<Self> {
        if logplev.len() != tlev.len() {
            return Err(ExokError::shape_mismatch(
                "level temperatures",
                &[logplev.len()],
                &[tlev.len()],
            ));
        }
        if logplev.len() < 2 {
            return Err(ExokError::InvalidGrid(
                "a column needs at least two levels".to_string(),
            ));
        }
        if !is_strictly_increasing(&logplev) {
            return Err(ExokError::InvalidGrid(
                "level pressures must increase from the top of the column down".to_string(),
            ));
        }
        if tlev.iter().any(|t| !(*t > 0.0)) {
            return Err(ExokError::InvalidGrid(
                "level temperatures must be positive".to_string(),
            ));
        }
        let logplay: Vec<f64> = logplev.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let tlay = tlev.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        Ok(Self {
            plev: logplev.iter().map(|l| 10f64.powf(*l)).collect(),
            play: logplay.iter().map(|l| 10f64.powf(*l)).collect(),
            logplev,
            tlev,
            logplay,
            tlay,
        })
    }

    fn n_layers(&self) -> usize {
        self.tlay.len()
    }
}

/// Altitudes and column amounts; they need the gravity.
#[derive(Clone, Debug, PartialEq)]
struct Geometry {
    zlev: Vec<f64>,
    zlay: Vec<f64>,
    dmass: Vec<f64>,
    dcol: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
struct Derived {
    molar_mass: Vec<f64>,
    density: Vec<f64>,
    geometry: Option<Geometry>,
}

impl Derived {
    fn compute(
        profile: &Profile,
        composition: &GasComposition,
        params: &ColumnParameters,
        lookup: &dyn LookupFn,
    ) -> ExokResult<Self> {
        let n = profile.n_layers();
        composition.check_layers(n)?;
        let molar_mass = match params.molar_mass {
            Some(m) => vec![m; n],
            None => lookup.mean_molar_mass(composition, n)?,
        };
        if molar_mass.iter().any(|m| !(*m > 0.0)) {
            return Err(ExokError::Configuration(
                "the mean molar mass must be positive".to_string(),
            ));
        }
        let density = profile
            .play
            .iter()
            .zip(&profile.tlay)
            .map(|(p, t)| p / (BOLTZMANN * t))
            .collect();
        let geometry = match params.gravity {
            None => None,
            Some(g) if g > 0.0 => Some(Geometry::compute(profile, &molar_mass, g, params.planet_radius)),
            Some(g) => {
                return Err(ExokError::Configuration(format!(
                    "the gravity must be positive, got {g}"
                )))
            }
        };
        Ok(Self {
            molar_mass,
            density,
            geometry,
        })
    }
}

impl Geometry {
    fn compute(profile: &Profile, molar_mass: &[f64], gravity: f64, radius: Option<f64>) -> Self {
        let n = profile.n_layers();
        let mut zlev = vec![0.0; n + 1];
        for i in (0..n).rev() {
            let h = GAS_CONSTANT * profile.tlay[i] / (gravity * molar_mass[i]);
            let dlnp = (profile.logplev[i + 1] - profile.logplev[i]) * LN_10;
            let z = zlev[i + 1];
            zlev[i] = match radius {
                None => z + h * dlnp,
                Some(rp) => {
                    z + h * (rp + z).powi(2) * dlnp / (rp * rp + h * rp * dlnp + h * z * dlnp)
                }
            };
        }
        let zlay: Vec<f64> = zlev.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let dmass: Vec<f64> = profile
            .plev
            .windows(2)
            .zip(&zlay)
            .map(|(p, z)| {
                let flat = (p[1] - p[0]) / gravity;
                radius.map_or(flat, |rp| flat * (1.0 + z / rp).powi(2))
            })
            .collect();
        let dcol = dmass
            .iter()
            .zip(molar_mass)
            .map(|(dm, m)| dm * AVOGADRO / m)
            .collect();
        Self {
            zlev,
            zlay,
            dmass,
            dcol,
        }
    }
}

/// Object-safe view of a molar mass lookup.
trait LookupFn: Sync {
    fn mean_molar_mass(&self, composition: &GasComposition, n: usize) -> ExokResult<Vec<f64>>;
}

impl<T: MolarMassLookup + Sync> LookupFn for T {
    fn mean_molar_mass(&self, composition: &GasComposition, n: usize) -> ExokResult<Vec<f64>> {
        composition.mean_molar_mass(self, n)
    }
}

/// A column of gas over a planet, ready for radiative transfer.
#[derive(Clone)]
pub struct AtmosphericColumn<'a> {
    gas: GasMixture<'a>,
    params: ColumnParameters,
    lookup: &'a dyn LookupFn,
    profile: Profile,
    derived: Derived,
}

impl fmt::Debug for AtmosphericColumn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtmosphericColumn")
            .field("gas", &self.gas)
            .field("params", &self.params)
            .field("logplev", &self.profile.logplev)
            .field("tlev", &self.profile.tlev)
            .finish_non_exhaustive()
    }
}

impl<'a> AtmosphericColumn<'a> {
    /// Column on levels given by log10 of their pressure in Pa and their
    /// temperature, top first.
    ///
    /// Molar masses come from [`StandardMolarMasses`] unless
    /// `params.molar_mass` is set.
    ///
    /// # Errors
    ///
    /// `InvalidGrid` or `ShapeMismatch` for a bad profile, `Configuration`
    /// when the mean molar mass cannot be found or is zero.
    pub fn from_log_pt(
        logplev: Vec<f64>,
        tlev: Vec<f64>,
        gas: GasMixture<'a>,
        params: ColumnParameters,
    ) -> ExokResult<Self> {
        Self::with_lookup(logplev, tlev, gas, params, &StandardMolarMasses)
    }

    /// Like [`AtmosphericColumn::from_log_pt`] with another molar mass lookup.
    pub fn with_lookup(
        logplev: Vec<f64>,
        tlev: Vec<f64>,
        gas: GasMixture<'a>,
        params: ColumnParameters,
        lookup: &'a (impl MolarMassLookup + Sync),
    ) -> ExokResult<Self> {
        let profile = Profile::new(logplev, tlev)?;
        let derived = Derived::compute(&profile, gas.composition(), &params, lookup)?;
        Ok(Self {
            gas,
            params,
            lookup,
            profile,
            derived,
        })
    }

    pub fn adiabatic(
        profile: &AdiabaticProfile,
        gas: GasMixture<'a>,
        params: ColumnParameters,
    ) -> ExokResult<Self> {
        let (logplev, tlev) = profile.levels();
        Self::from_log_pt(logplev, tlev, gas, params)
    }

    /// Replaces the pressure-temperature profile.
    pub fn set_log_pt(&mut self, logplev: Vec<f64>, tlev: Vec<f64>) -> ExokResult<()> {
        let profile = Profile::new(logplev, tlev)?;
        self.derived = Derived::compute(&profile, self.gas.composition(), &self.params, self.lookup)?;
        self.profile = profile;
        log::debug!("column profile set on {} levels", self.n_levels());
        Ok(())
    }

    pub fn set_composition(&mut self, composition: GasComposition) -> ExokResult<()> {
        self.derived = Derived::compute(&self.profile, &composition, &self.params, self.lookup)?;
        self.gas.set_composition(composition);
        Ok(())
    }

    pub fn set_parameters(&mut self, params: ColumnParameters) -> ExokResult<()> {
        self.derived = Derived::compute(&self.profile, self.gas.composition(), &params, self.lookup)?;
        self.params = params;
        Ok(())
    }

    pub fn gas(&self) -> &GasMixture<'a> {
        &self.gas
    }

    pub fn parameters(&self) -> &ColumnParameters {
        &self.params
    }

    pub fn n_levels(&self) -> usize {
        self.profile.plev.len()
    }

    pub fn n_layers(&self) -> usize {
        self.profile.n_layers()
    }

    pub fn logplev(&self) -> &[f64] {
        &self.profile.logplev
    }

    pub fn plev(&self) -> &[f64] {
        &self.profile.plev
    }

    pub fn tlev(&self) -> &[f64] {
        &self.profile.tlev
    }

    pub fn logplay(&self) -> &[f64] {
        &self.profile.logplay
    }

    pub fn play(&self) -> &[f64] {
        &self.profile.play
    }

    pub fn tlay(&self) -> &[f64] {
        &self.profile.tlay
    }

    /// Mean molar mass of each layer, kg/mol.
    pub fn molar_mass(&self) -> &[f64] {
        &self.derived.molar_mass
    }

    /// Number density of each layer, m^-3.
    pub fn density(&self) -> &[f64] {
        &self.derived.density
    }

    fn geometry(&self) -> ExokResult<&Geometry> {
        self.derived.geometry.as_ref().ok_or_else(|| {
            ExokError::Configuration("the gravity of the column is not set".to_string())
        })
    }

    pub(crate) fn planet_radius(&self) -> ExokResult<f64> {
        self.params.planet_radius.ok_or_else(|| {
            ExokError::Configuration("the planet radius is not set".to_string())
        })
    }

    /// Altitude of the levels above the bottom one, m.
    pub fn zlev(&self) -> ExokResult<&[f64]> {
        Ok(&self.geometry()?.zlev)
    }

    pub fn zlay(&self) -> ExokResult<&[f64]> {
        Ok(&self.geometry()?.zlay)
    }

    /// Mass of gas per unit area in each layer, kg/m^2.
    pub fn dmass(&self) -> ExokResult<&[f64]> {
        Ok(&self.geometry()?.dmass)
    }

    /// Molecules per unit area in each layer, m^-2.
    pub fn dcol(&self) -> ExokResult<&[f64]> {
        Ok(&self.geometry()?.dcol)
    }

    /// Area of the annulus of each layer seen from afar, m^2.
    pub fn areas(&self) -> ExokResult<Vec<f64>> {
        let rp = self.planet_radius()?;
        let zlev = self.zlev()?;
        Ok(zlev
            .windows(2)
            .map(|z| PI * (rp + z[0]).powi(2) - PI * (rp + z[1]).powi(2))
            .collect())
    }

    /// Path lengths of the ray tangent to each layer.
    ///
    /// Entry `[i][j]` is the length the ray grazing layer `i` travels in layer
    /// `j <= i`, both ways.
    pub fn tangent_paths(&self) -> ExokResult<Vec<Vec<f64>>> {
        let rp = self.planet_radius()?;
        let geometry = self.geometry()?;
        Ok(geometry
            .zlay
            .iter()
            .enumerate()
            .map(|(i, zi)| {
                let r_tangent = (rp + zi).powi(2);
                let mut dl: Vec<f64> = geometry.zlev[..=i]
                    .iter()
                    .map(|zj| ((rp + zj).powi(2) - r_tangent).max(0.0).sqrt())
                    .collect();
                dl.push(0.0);
                dl.windows(2).map(|d| 2.0 * (d[0] - d[1])).collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn gas() -> GasMixture<'static> {
        GasMixture::new(GasComposition::from_ratios([("N2", 1.0)], None).unwrap())
    }

    fn params() -> ColumnParameters {
        ColumnParameters {
            gravity: Some(9.81),
            ..Default::default()
        }
    }

    #[test]
    fn test_layers_are_midpoints() {
        let col = AtmosphericColumn::from_log_pt(vec![2.0, 4.0, 5.0], vec![200.0, 250.0, 300.0], gas(), params())
            .unwrap();
        assert_eq!(col.n_layers(), 2);
        assert_eq!(col.logplay(), &[3.0, 4.5]);
        assert_eq!(col.tlay(), &[225.0, 275.0]);
        assert_relative_eq!(col.play()[0], 1e3, max_relative = 1e-12);
        assert_relative_eq!(
            col.density()[0],
            1e3 / (BOLTZMANN * 225.0),
            max_relative = 1e-12
        );
        assert_relative_eq!(col.molar_mass()[0], 28.014e-3, max_relative = 1e-10);
    }

    #[test]
    fn test_bad_profiles() {
        let bad = [
            (vec![5.0, 2.0], vec![300.0, 200.0]),
            (vec![2.0], vec![300.0]),
            (vec![2.0, 3.0], vec![300.0]),
        ];
        for (logp, t) in bad {
            assert!(AtmosphericColumn::from_log_pt(logp, t, gas(), params()).is_err());
        }
    }

    #[test]
    fn test_zero_molar_mass_rejected() {
        let lookup = HashMap::from([("N2".to_string(), 0.0)]);
        let result =
            AtmosphericColumn::with_lookup(vec![2.0, 5.0], vec![300.0, 300.0], gas(), params(), &lookup);
        assert!(matches!(result, Err(ExokError::Configuration(_))));
    }

    #[test]
    fn test_column_amounts() {
        let params = ColumnParameters {
            molar_mass: Some(0.028),
            ..params()
        };
        let col = AtmosphericColumn::from_log_pt(vec![3.0, 5.0], vec![300.0, 300.0], gas(), params).unwrap();
        let dmass = (1e5 - 1e3) / 9.81;
        assert_relative_eq!(col.dmass().unwrap()[0], dmass, max_relative = 1e-12);
        assert_relative_eq!(col.dcol().unwrap()[0], dmass * AVOGADRO / 0.028, max_relative = 1e-12);
    }

    #[test]
    fn test_isothermal_altitudes() {
        let params = ColumnParameters {
            molar_mass: Some(0.028),
            ..params()
        };
        let col = AtmosphericColumn::from_log_pt(
            linspace(1.0, 5.0, 9),
            vec![250.0; 9],
            gas(),
            params,
        )
        .unwrap();
        let h = GAS_CONSTANT * 250.0 / (9.81 * 0.028);
        let zlev = col.zlev().unwrap();
        assert_eq!(zlev[8], 0.0);
        assert_relative_eq!(zlev[0], h * 4.0 * LN_10, max_relative = 1e-12);
        assert_relative_eq!(col.zlay().unwrap()[7], 0.5 * zlev[7], max_relative = 1e-12);
    }

    #[test]
    fn test_flat_and_spherical_agree_for_large_radius() {
        let flat = AtmosphericColumn::from_log_pt(linspace(1.0, 5.0, 5), vec![300.0; 5], gas(), params()).unwrap();
        let params = ColumnParameters {
            planet_radius: Some(1e12),
            ..params()
        };
        let round = AtmosphericColumn::from_log_pt(linspace(1.0, 5.0, 5), vec![300.0; 5], gas(), params).unwrap();
        for (a, b) in flat.zlev().unwrap().iter().zip(round.zlev().unwrap()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_missing_gravity_and_radius() {
        let col = AtmosphericColumn::from_log_pt(vec![2.0, 5.0], vec![300.0, 300.0], gas(), ColumnParameters::default())
            .unwrap();
        assert!(matches!(col.dcol(), Err(ExokError::Configuration(_))));
        let col = AtmosphericColumn::from_log_pt(vec![2.0, 5.0], vec![300.0, 300.0], gas(), params()).unwrap();
        assert!(matches!(col.areas(), Err(ExokError::Configuration(_))));
        assert!(matches!(col.tangent_paths(), Err(ExokError::Configuration(_))));
    }

    #[test]
    fn test_areas_and_paths() {
        let rp = 7e7;
        let params = ColumnParameters {
            planet_radius: Some(rp),
            ..params()
        };
        let col = AtmosphericColumn::from_log_pt(linspace(1.0, 5.0, 4), vec![1000.0; 4], gas(), params).unwrap();
        let zlev = col.zlev().unwrap().to_vec();
        let areas = col.areas().unwrap();
        let total: f64 = areas.iter().sum();
        assert_relative_eq!(total, PI * (rp + zlev[0]).powi(2) - PI * rp * rp, max_relative = 1e-9);

        let paths = col.tangent_paths().unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[1].len(), 2);
        let zlay = col.zlay().unwrap();
        // the whole chord from the top level to the tangent point
        let chord: f64 = paths[2].iter().sum();
        let expected = 2.0 * ((rp + zlev[0]).powi(2) - (rp + zlay[2]).powi(2)).sqrt();
        assert_relative_eq!(chord, expected, max_relative = 1e-12);
        assert!(paths[2].iter().all(|l| *l > 0.0));
    }

    #[test]
    fn test_updates_recompute_everything() {
        let mut col =
            AtmosphericColumn::from_log_pt(vec![3.0, 5.0], vec![300.0, 300.0], gas(), params()).unwrap();
        let before = col.dcol().unwrap()[0];
        col.set_composition(GasComposition::from_ratios([("H2", 1.0)], None).unwrap())
            .unwrap();
        assert_relative_eq!(col.dcol().unwrap()[0] / before, 28.014 / 2.016, max_relative = 1e-10);

        col.set_log_pt(vec![4.0, 5.0], vec![300.0, 300.0]).unwrap();
        assert_relative_eq!(col.dmass().unwrap()[0], 9e4 / 9.81, max_relative = 1e-12);

        // a failed update leaves the column untouched
        assert!(col.set_log_pt(vec![5.0, 4.0], vec![300.0, 300.0]).is_err());
        assert_eq!(col.logplev(), &[4.0, 5.0]);
    }

    #[test]
    fn test_adiabatic_profile() {
        let profile = AdiabaticProfile {
            surface_pressure: 1e5,
            top_pressure: 1e1,
            n_levels: 5,
            surface_temperature: 300.0,
            stratosphere_temperature: Some(100.0),
            rcp: 0.28,
        };
        let (logp, t) = profile.levels();
        assert_eq!(logp, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_relative_eq!(t[4], 300.0, max_relative = 1e-12);
        assert_relative_eq!(t[3], 300.0 * 0.1f64.powf(0.28), max_relative = 1e-12);
        assert_eq!(t[0], 100.0);
        let col = AtmosphericColumn::adiabatic(&profile, gas(), params()).unwrap();
        assert_eq!(col.n_levels(), 5);
    }
}
