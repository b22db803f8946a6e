//! Blackbody radiance per wavenumber.
//!
//! Wavenumbers are in cm^-1. Spectral radiances are in W/m^2/sr/cm^-1 and
//! band radiances in W/m^2/sr.

use crate::constants::{C1_RADIANCE, C2};
use std::f64::consts::PI;

/// Spectral radiance at `wavenumber` (cm^-1).
pub fn planck(wavenumber: f64, temperature: f64) -> f64 {
    if temperature <= 0.0 || wavenumber <= 0.0 {
        return 0.0;
    }
    let nu = 100.0 * wavenumber;
    let x = C2 * nu / temperature;
    // per m^-1 to per cm^-1
    100.0 * C1_RADIANCE * nu.powi(3) / x.exp_m1()
}

pub fn planck_spectrum(wavenumbers: &[f64], temperature: f64) -> Vec<f64> {
    wavenumbers
        .iter()
        .map(|&wn| planck(wn, temperature))
        .collect()
}

/// Radiance integrated between two wavenumbers (cm^-1).
pub fn band_radiance(lo: f64, hi: f64, temperature: f64) -> f64 {
    if temperature <= 0.0 {
        return 0.0;
    }
    let scale = C1_RADIANCE * (temperature / C2).powi(4);
    let x_lo = C2 * 100.0 * lo.max(0.0) / temperature;
    let x_hi = C2 * 100.0 * hi.max(0.0) / temperature;
    scale * (upper_tail(x_lo) - upper_tail(x_hi))
}

/// Band radiances for consecutive `edges`, one per band.
pub fn planck_band(edges: &[f64], temperature: f64) -> Vec<f64> {
    edges
        .windows(2)
        .map(|e| band_radiance(e[0], e[1], temperature))
        .collect()
}

/// Band radiances divided by the band widths: the mean spectral radiance.
pub fn planck_band_mean(edges: &[f64], temperature: f64) -> Vec<f64> {
    edges
        .windows(2)
        .map(|e| band_radiance(e[0], e[1], temperature) / (e[1] - e[0]))
        .collect()
}

/// `∫_x^∞ t³/(e^t - 1) dt`.
fn upper_tail(x: f64) -> f64 {
    const TOTAL: f64 = PI * PI * PI * PI / 15.0;
    if x <= 0.0 {
        return TOTAL;
    }
    if x < 1.0 {
        return TOTAL - lower_part(x);
    }
    if x > 700.0 {
        return 0.0;
    }
    let (x2, x3) = (x * x, x * x * x);
    let mut sum = 0.0;
    let mut n = 1.0;
    loop {
        let term =
            (-n * x).exp() * (x3 / n + 3.0 * x2 / (n * n) + 6.0 * x / (n * n * n) + 6.0 / (n * n * n * n));
        sum += term;
        if term <= 1e-16 * sum || n > 1000.0 {
            break;
        }
        n += 1.0;
    }
    sum
}

/// `∫_0^x t³/(e^t - 1) dt` from the Bernoulli expansion, for small x.
fn lower_part(x: f64) -> f64 {
    let x2 = x * x;
    x2 * x
        * (1.0 / 3.0 - x / 8.0
            + x2 / 60.0
            + x2 * x2
                * (-1.0 / 5040.0
                    + x2 / 272_160.0
                    + x2 * x2 * (-1.0 / 13_305_600.0 + x2 / 622_702_080.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::STEFAN_BOLTZMANN;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_temperature() {
        assert_eq!(planck(1000.0, 0.0), 0.0);
        assert_eq!(band_radiance(10.0, 1000.0, -5.0), 0.0);
    }

    #[test]
    fn test_wide_band_matches_stefan_boltzmann() {
        for t in [100.0, 300.0, 1500.0] {
            let total = band_radiance(0.0, 1e6, t);
            assert_relative_eq!(total, STEFAN_BOLTZMANN * t.powi(4) / PI, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_tail_is_continuous_at_switch() {
        let below = upper_tail(1.0 - 1e-12);
        let above = upper_tail(1.0 + 1e-12);
        assert_relative_eq!(below, above, max_relative = 1e-9);
    }

    #[test]
    fn test_narrow_band_matches_spectral_radiance() {
        let t = 288.0;
        let (lo, hi) = (999.5, 1000.5);
        let band = band_radiance(lo, hi, t);
        assert_relative_eq!(band, planck(1000.0, t) * (hi - lo), max_relative = 1e-5);
    }

    #[test]
    fn test_bands_add_up() {
        let t = 500.0;
        let bands = planck_band(&[100.0, 500.0, 2000.0, 5000.0], t);
        let total: f64 = bands.iter().sum();
        assert_relative_eq!(total, band_radiance(100.0, 5000.0, t), max_relative = 1e-10);
        let means = planck_band_mean(&[100.0, 500.0], t);
        assert_relative_eq!(means[0], bands[0] / 400.0, max_relative = 1e-12);
    }

    #[test]
    fn test_known_value() {
        // Earth-like peak region, about 0.15 W/m^2/sr/cm^-1 at 300 K and 600 cm^-1
        let b = planck(600.0, 300.0);
        assert_relative_eq!(b, 0.1534, max_relative = 5e-3);
    }
}
