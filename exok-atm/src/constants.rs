//! Physical constants (SI, CODATA 2018).

pub use exok_core::units::{BOLTZMANN, LOSCHMIDT};

/// Avogadro constant, mol^-1
pub const AVOGADRO: f64 = 6.022_140_76e23;
/// Molar gas constant, J/mol/K
pub const GAS_CONSTANT: f64 = BOLTZMANN * AVOGADRO;
/// Stefan-Boltzmann constant, W/m^2/K^4
pub const STEFAN_BOLTZMANN: f64 = 5.670_374_419e-8;
/// Speed of light in vacuum, m/s
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
/// Planck constant, J s
pub const PLANCK: f64 = 6.626_070_15e-34;

/// First radiation constant for radiance per wavenumber, 2hc^2 in W m^2/sr
pub const C1_RADIANCE: f64 = 2.0 * PLANCK * SPEED_OF_LIGHT * SPEED_OF_LIGHT;
/// Second radiation constant hc/k in m K
pub const C2: f64 = PLANCK * SPEED_OF_LIGHT / BOLTZMANN;

/// Default R/cp of a diatomic ideal gas.
pub const DEFAULT_RCP: f64 = 0.28;
