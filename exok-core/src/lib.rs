//! Opacity data for correlated-k radiative transfer.
//!
//! Tables of cross-sections and k-coefficients are tabulated on
//! (pressure, temperature, [mixing ratio], spectral bin, [g-point]) grids and
//! interpolated at atmospheric conditions. Continuum tables are interpolated in
//! temperature only. Tables of several species can be gathered in a database,
//! brought onto common grids and mixed under the random overlap assumption.

pub mod continuum;
pub mod database;
pub mod document;
pub mod interp;
pub mod ktable;
pub mod ktable5d;
pub mod overlap;
pub mod quadrature;
pub mod settings;
pub mod spectral_grid;
pub mod table;
pub mod units;

pub mod errors;

pub use errors::{ExokError, ExokResult};
