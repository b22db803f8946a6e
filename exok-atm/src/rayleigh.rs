//! Rayleigh scattering cross-sections.
//!
//! `σ = 24π³ν⁴/N_ref² · ((n²-1)/(n²+2))² · F_king`, with the refractivity of
//! each species from a Cauchy fit `n - 1 = A (1 + B/λ²)`, λ in µm, measured
//! at the Loschmidt density.

use crate::composition::GasComposition;
use crate::constants::LOSCHMIDT;
use ndarray::Array2;
use std::f64::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CauchyRefractivity {
    pub a: f64,
    /// µm^2
    pub b: f64,
    pub king_factor: f64,
}

const REFRACTIVITIES: &[(&str, CauchyRefractivity)] = &[
    ("H2", CauchyRefractivity { a: 13.58e-5, b: 7.52e-3, king_factor: 1.0 }),
    ("He", CauchyRefractivity { a: 3.48e-5, b: 2.3e-3, king_factor: 1.0 }),
    ("N2", CauchyRefractivity { a: 29.06e-5, b: 7.7e-3, king_factor: 1.034 }),
    ("O2", CauchyRefractivity { a: 26.63e-5, b: 5.07e-3, king_factor: 1.096 }),
    ("Ar", CauchyRefractivity { a: 27.92e-5, b: 5.6e-3, king_factor: 1.0 }),
    ("CO2", CauchyRefractivity { a: 43.9e-5, b: 6.4e-3, king_factor: 1.15 }),
];

pub fn refractivity(species: &str) -> Option<CauchyRefractivity> {
    REFRACTIVITIES
        .iter()
        .find(|(name, _)| *name == species)
        .map(|(_, fit)| *fit)
}

impl CauchyRefractivity {
    /// Cross-section in m^2 at `wavenumber` (cm^-1).
    pub fn cross_section(&self, wavenumber: f64) -> f64 {
        let lambda_um = 1e4 / wavenumber;
        let n = 1.0 + self.a * (1.0 + self.b / (lambda_um * lambda_um));
        let n2 = n * n;
        let polarizability = (n2 - 1.0) / (n2 + 2.0);
        let nu = 100.0 * wavenumber;
        24.0 * PI.powi(3) * nu.powi(4) / (LOSCHMIDT * LOSCHMIDT)
            * polarizability
            * polarizability
            * self.king_factor
    }
}

/// Cross-sections of `species` at the given wavenumbers, `None` if the
/// species has no refractivity fit.
pub fn species_cross_section(species: &str, wavenumbers: &[f64]) -> Option<Vec<f64>> {
    let fit = refractivity(species)?;
    Some(wavenumbers.iter().map(|&wn| fit.cross_section(wn)).collect())
}

/// Mixing-ratio weighted cross-section of the gas, `[layers, Nw]`, in m^2
/// per molecule of gas.
pub fn mixture_cross_section(
    composition: &GasComposition,
    n_layers: usize,
    wavenumbers: &[f64],
) -> Array2<f64> {
    let mut total = Array2::<f64>::zeros((n_layers, wavenumbers.len()));
    for (name, ratio) in composition.iter() {
        let Some(sigma) = species_cross_section(name, wavenumbers) else {
            log::debug!("no Rayleigh scattering data for {name}");
            continue;
        };
        for (i, mut row) in total.outer_iter_mut().enumerate() {
            let x = ratio.at(i);
            row.iter_mut().zip(&sigma).for_each(|(r, s)| *r += x * s);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_n2_at_500nm() {
        let sigma = species_cross_section("N2", &[2e4]).unwrap();
        assert_relative_eq!(sigma[0], 6.7e-31, max_relative = 0.1);
    }

    #[test]
    fn test_steep_wavenumber_dependence() {
        let sigma = species_cross_section("H2", &[1e4, 2e4]).unwrap();
        let ratio = sigma[1] / sigma[0];
        assert!(ratio > 16.0 && ratio < 17.0, "ratio {ratio}");
    }

    #[test]
    fn test_unknown_species_contribute_nothing() {
        assert!(species_cross_section("CH4x", &[1e4]).is_none());
        let comp = GasComposition::from_ratios([("XX", 1.0)], None).unwrap();
        let total = mixture_cross_section(&comp, 2, &[1e4, 2e4]);
        assert!(total.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_mixture_is_weighted() {
        let comp =
            GasComposition::from_ratios([("H2", vec![0.5, 1.0]), ("He", vec![0.5, 0.0])], None)
                .unwrap();
        let wns = [5000.0];
        let total = mixture_cross_section(&comp, 2, &wns);
        let h2 = species_cross_section("H2", &wns).unwrap()[0];
        let he = species_cross_section("He", &wns).unwrap()[0];
        assert_relative_eq!(total[[0, 0]], 0.5 * h2 + 0.5 * he, max_relative = 1e-12);
        assert_relative_eq!(total[[1, 0]], h2, max_relative = 1e-12);
    }
}
