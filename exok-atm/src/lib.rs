//! Radiative transfer through planetary atmospheres.
//!
//! A [`gas_mix::GasMixture`] turns the tables of `exok-core` into the opacity
//! of a gas of known composition. An [`column::AtmosphericColumn`] layers that
//! gas over a planet and computes emission and transmission spectra and
//! heating rates from it.

pub mod column;
pub mod composition;
pub mod constants;
pub mod gas_mix;
pub mod molar_mass;
pub mod planck;
pub mod rayleigh;
pub mod solver;
