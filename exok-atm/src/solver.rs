//! Radiative transfer through an [`AtmosphericColumn`].
//!
//! Optical depths are accumulated from the top of the column down. Thermal
//! emission uses the analytic solution for a source function linear in
//! optical depth inside each layer:
//!
//! ```text
//!   r(dτ) = (e^-dτ - 1) / dτ
//!   I_top = Σ_layers e^-τ_top · [ B_top·(-e^-dτ - r) + B_bottom·(1 + r) ] + B_surf·e^-τ_N
//! ```
//!
//! Transit spectra follow rays tangent to each layer through the layers
//! above it.

use crate::column::AtmosphericColumn;
use crate::constants::{AVOGADRO, GAS_CONSTANT, STEFAN_BOLTZMANN};
use crate::gas_mix::CrossSectionOptions;
use crate::planck::{band_radiance, planck, planck_band_mean};
use exok_core::errors::{ExokError, ExokResult};
use exok_core::quadrature::QuadratureGrid;
use exok_core::spectral_grid::SpectralGrid;
use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Below this layer optical depth `r(dτ)` is replaced by its limit.
pub const DTAU_TAYLOR_LIMIT: f64 = 1e-14;

/// Values on the bins of a spectral grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub values: Array1<f64>,
    pub grid: SpectralGrid,
}

impl Spectrum {
    pub fn new(values: Array1<f64>, grid: SpectralGrid) -> ExokResult<Self> {
        if values.len() != grid.len() {
            return Err(ExokError::shape_mismatch(
                "spectrum values",
                &[grid.len()],
                &[values.len()],
            ));
        }
        Ok(Self { values, grid })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn wavenumbers(&self) -> &[f64] {
        self.grid.centers()
    }

    /// Sum of the values times the bin widths.
    pub fn integral(&self) -> f64 {
        self.values
            .iter()
            .zip(self.grid.widths())
            .map(|(v, w)| v * w)
            .sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionOptions {
    /// Cosine of the viewing angle.
    pub mu0: f64,
    /// Use the band-averaged Planck function rather than its value at the bin
    /// centers.
    pub band_integrated: bool,
    /// Integrate the flux over this many Gauss-Legendre angles instead of
    /// following the single direction `mu0`.
    pub n_angles: Option<usize>,
    pub opacity: CrossSectionOptions,
}

impl Default for EmissionOptions {
    fn default() -> Self {
        Self {
            mu0: 1.0,
            band_integrated: true,
            n_angles: None,
            opacity: CrossSectionOptions::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionOptions {
    /// Return `A/(πRp²) + 1` when no star radius is set.
    pub normalized: bool,
    pub opacity: CrossSectionOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatingOptions {
    /// Incoming stellar flux at the top of the column
    /// unit: W/m^2
    pub stellar_flux: f64,
    /// unit: K
    pub stellar_temperature: f64,
    /// Angle between the star and the local vertical, in radians (not
    /// degrees). It must be below π/2.
    /// unit: rad
    pub zenith_angle: f64,
    pub opacity: CrossSectionOptions,
}

impl Default for HeatingOptions {
    fn default() -> Self {
        Self {
            stellar_flux: 1361.0,
            stellar_temperature: 5778.0,
            zenith_angle: 0.0,
            opacity: CrossSectionOptions::default(),
        }
    }
}

/// Optical depth of each layer, `dcol·σ/μ0`, for σ of shape `[layers, Nw, Ng]`.
pub fn layer_optical_depth(dcol: &[f64], sigma: ArrayView3<f64>, mu0: f64) -> Array3<f64> {
    let mut dtau = sigma.to_owned();
    for (mut layer, dc) in dtau.outer_iter_mut().zip(dcol) {
        let factor = dc / mu0;
        layer.mapv_inplace(|v| v * factor);
    }
    dtau
}

/// Optical depth at the levels, zero at the top, `[layers + 1, Nw, Ng]`.
pub fn level_optical_depth(dtau: ArrayView3<f64>) -> Array3<f64> {
    let (n, nw, ng) = dtau.dim();
    let mut tau = Array3::<f64>::zeros((n + 1, nw, ng));
    for i in 0..n {
        let (above, mut below) = tau.multi_slice_mut((s![i, .., ..], s![i + 1, .., ..]));
        Zip::from(&mut below)
            .and(&above)
            .and(dtau.index_axis(Axis(0), i))
            .for_each(|b, &a, &d| *b = a + d);
    }
    tau
}

/// Weights of the source at the top and at the bottom of a layer of optical
/// depth `dtau`, before attenuation by the layers above.
pub fn source_weights(dtau: f64) -> (f64, f64) {
    let exp_dtau = (-dtau).exp();
    let r = if dtau < DTAU_TAYLOR_LIMIT {
        -1.0
    } else {
        (exp_dtau - 1.0) / dtau
    };
    (-exp_dtau - r, 1.0 + r)
}

/// Intensity emerging at the top for the level optical depths `tau`
/// `[levels, Nw, Ng]` and the level sources `[levels, Nw]`, weighted over g.
pub fn emerging_intensity(
    tau: ArrayView3<f64>,
    source: ArrayView2<f64>,
    g_weights: &[f64],
) -> Array1<f64> {
    let (nlev, nw, ng) = tau.dim();
    let mut out = Array1::<f64>::zeros(nw);
    for iw in 0..nw {
        let mut total = 0.0;
        for (ig, wg) in g_weights.iter().enumerate().take(ng) {
            let mut intensity = 0.0;
            for l in 0..nlev - 1 {
                let attenuation = (-tau[[l, iw, ig]]).exp();
                let (top, bottom) = source_weights(tau[[l + 1, iw, ig]] - tau[[l, iw, ig]]);
                intensity +=
                    attenuation * (top * source[[l, iw]] + bottom * source[[l + 1, iw]]);
            }
            intensity += (-tau[[nlev - 1, iw, ig]]).exp() * source[[nlev - 1, iw]];
            total += wg * intensity;
        }
        out[iw] = total;
    }
    out
}

impl AtmosphericColumn<'_> {
    /// Cross-section of the gas in each layer, `[layers, Nw, Ng]`.
    pub fn cross_section(&self, options: &CrossSectionOptions) -> ExokResult<Array3<f64>> {
        self.gas().cross_section(self.logplay(), self.tlay(), options)
    }

    /// Optical depth at each level for the direction `mu0`.
    pub fn optical_depth(&self, options: &CrossSectionOptions, mu0: f64) -> ExokResult<Array3<f64>> {
        let sigma = self.cross_section(options)?;
        let dtau = layer_optical_depth(self.dcol()?, sigma.view(), mu0);
        Ok(level_optical_depth(dtau.view()))
    }

    fn output_grid(&self, options: &CrossSectionOptions) -> ExokResult<SpectralGrid> {
        let range = self.gas().bin_range(options.window)?;
        self.gas().spectral_grid()?.slice(range)
    }

    fn g_weights(&self) -> ExokResult<Vec<f64>> {
        self.gas().g_weights()
    }

    /// πB at each level, `[levels, Nw]`, in W/m^2/cm^-1.
    fn level_sources(&self, grid: &SpectralGrid, band_integrated: bool) -> Array2<f64> {
        let tlev = self.tlev();
        let mut source = Array2::<f64>::zeros((tlev.len(), grid.len()));
        for (mut row, &t) in source.outer_iter_mut().zip(tlev) {
            let values = if band_integrated {
                planck_band_mean(grid.edges(), t)
            } else {
                grid.centers().iter().map(|&wn| planck(wn, t)).collect()
            };
            row.iter_mut()
                .zip(values)
                .for_each(|(r, b)| *r = PI * b);
        }
        source
    }

    fn blackbody(&self, temperature: f64, band_integrated: bool, window: Option<(f64, f64)>) -> ExokResult<Spectrum> {
        let grid = self.output_grid(&CrossSectionOptions {
            window,
            ..Default::default()
        })?;
        let values = if band_integrated {
            planck_band_mean(grid.edges(), temperature)
        } else {
            grid.centers().iter().map(|&wn| planck(wn, temperature)).collect()
        };
        Spectrum::new(Array1::from_vec(values).mapv(|b| PI * b), grid)
    }

    /// πB at the temperature of the bottom level.
    pub fn surface_blackbody(&self, band_integrated: bool, window: Option<(f64, f64)>) -> ExokResult<Spectrum> {
        let t = self.tlev()[self.n_levels() - 1];
        self.blackbody(t, band_integrated, window)
    }

    /// πB at the temperature of the top level.
    pub fn top_blackbody(&self, band_integrated: bool, window: Option<(f64, f64)>) -> ExokResult<Spectrum> {
        self.blackbody(self.tlev()[0], band_integrated, window)
    }

    /// Flux emitted at the top of the column, W/m^2/cm^-1.
    ///
    /// # Errors
    ///
    /// `Configuration` without gravity or a usable opacity database.
    pub fn emission_spectrum(&self, options: &EmissionOptions) -> ExokResult<Spectrum> {
        let grid = self.output_grid(&options.opacity)?;
        let sigma = self.cross_section(&options.opacity)?;
        let dcol = self.dcol()?;
        let g_weights = self.g_weights()?;
        let source = self.level_sources(&grid, options.band_integrated);

        let values = match options.n_angles {
            None => {
                if !(options.mu0 > 0.0 && options.mu0 <= 1.0) {
                    return Err(ExokError::Configuration(format!(
                        "mu0 must be in (0, 1], got {}",
                        options.mu0
                    )));
                }
                let dtau = layer_optical_depth(dcol, sigma.view(), options.mu0);
                let tau = level_optical_depth(dtau.view());
                emerging_intensity(tau.view(), source.view(), &g_weights)
            }
            Some(n) => {
                let angles = QuadratureGrid::gauss_legendre(n)?;
                let source = source.mapv(|b| 2.0 * b);
                let mut flux = Array1::<f64>::zeros(grid.len());
                for (&mu, &w) in angles.abscissas().iter().zip(angles.weights()) {
                    let dtau = layer_optical_depth(dcol, sigma.view(), mu);
                    let tau = level_optical_depth(dtau.view());
                    flux.scaled_add(w * mu, &emerging_intensity(tau.view(), source.view(), &g_weights));
                }
                flux
            }
        };
        log::debug!("emission over {} bins and {} layers", grid.len(), self.n_layers());
        Spectrum::new(values, grid)
    }

    /// Transmittance of the ray tangent to each layer, `[layers, Nw]`.
    pub fn tangent_transmittance(&self, options: &CrossSectionOptions) -> ExokResult<Array2<f64>> {
        let paths = self.tangent_paths()?;
        let sigma = self.cross_section(options)?;
        let g_weights = self.g_weights()?;
        let density = self.density();
        let (n, nw, ng) = sigma.dim();
        let mut transmittance = Array2::<f64>::zeros((n, nw));
        let mut tau = Array2::<f64>::zeros((nw, ng));
        for (i, path) in paths.iter().enumerate() {
            tau.fill(0.0);
            for (j, dl) in path.iter().enumerate() {
                tau.scaled_add(dl * density[j], &sigma.index_axis(Axis(0), j));
            }
            for (t, row) in transmittance.row_mut(i).iter_mut().zip(tau.outer_iter()) {
                *t = row
                    .iter()
                    .zip(&g_weights)
                    .map(|(tau, w)| w * (-tau).exp())
                    .sum();
            }
        }
        Ok(transmittance)
    }

    /// Transit depth or effective area, by bin.
    ///
    /// With a star radius the result is `(A + πRp²)/(πRs²)`, else
    /// `A/(πRp²) + 1` when normalised, else `A + πRp²`, where
    /// `A = Σ area·(1 - T)` is the absorbing area of the atmosphere.
    pub fn transmission_spectrum(&self, options: &TransmissionOptions) -> ExokResult<Spectrum> {
        let grid = self.output_grid(&options.opacity)?;
        let transmittance = self.tangent_transmittance(&options.opacity)?;
        let areas = self.areas()?;
        let rp = self.planet_radius()?;
        let mut absorbing = Array1::<f64>::zeros(grid.len());
        for (area, t) in areas.iter().zip(transmittance.outer_iter()) {
            Zip::from(&mut absorbing)
                .and(&t)
                .for_each(|a, &t| *a += area * (1.0 - t));
        }
        let disk = PI * rp * rp;
        let values = match (self.parameters().star_radius, options.normalized) {
            (Some(rs), _) => absorbing.mapv(|a| (a + disk) / (PI * rs * rs)),
            (None, true) => absorbing.mapv(|a| a / disk + 1.0),
            (None, false) => absorbing.mapv(|a| a + disk),
        };
        Spectrum::new(values, grid)
    }

    /// Heating rate of each layer by the absorbed stellar flux, K/s.
    pub fn heating_rate(&self, options: &HeatingOptions) -> ExokResult<Vec<f64>> {
        let mu0 = options.zenith_angle.cos();
        if !(mu0 > 0.0) {
            return Err(ExokError::Configuration(format!(
                "the star is below the horizon at a zenith angle of {} rad",
                options.zenith_angle
            )));
        }
        let grid = self.output_grid(&options.opacity)?;
        let t_star = options.stellar_temperature;
        let normalisation = options.stellar_flux * PI / (STEFAN_BOLTZMANN * t_star.powi(4));
        let incoming: Vec<f64> = grid
            .edges()
            .windows(2)
            .map(|e| normalisation * band_radiance(e[0], e[1], t_star))
            .collect();

        let tau = self.optical_depth(&options.opacity, mu0)?;
        let g_weights = self.g_weights()?;
        let dcol = self.dcol()?;
        let rcp = self.parameters().rcp;
        let (nlev, _, _) = tau.dim();
        let level_flux: Vec<f64> = (0..nlev)
            .map(|l| {
                tau.index_axis(Axis(0), l)
                    .outer_iter()
                    .zip(&incoming)
                    .map(|(row, f)| {
                        f * row
                            .iter()
                            .zip(&g_weights)
                            .map(|(t, w)| w * (-t).exp())
                            .sum::<f64>()
                    })
                    .sum()
            })
            .collect();
        Ok(level_flux
            .windows(2)
            .zip(dcol)
            .map(|(f, dc)| (f[0] - f[1]) * AVOGADRO * rcp / (dc * GAS_CONSTANT))
            .collect())
    }
}
