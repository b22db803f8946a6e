//! Unit parsing, normalization and conversion for opacity data.
//!
//! Opacity tables carry two unit tags: one for their pressure axis and one
//! for their values (cross-sections or k-coefficients per molecule,
//! or binary absorption coefficients for continua). Files spell these in
//! many ways, and sometimes do not spell them at all.
//!
//! # Quick Start
//!
//! ```
//! use exok_core::units::{conversion_factor, Unit};
//!
//! let a = Unit::parse("cm^2/molecule").unwrap();
//! let b = Unit::parse("cm2 molecule^-1").unwrap();
//! assert_eq!(a, b);
//!
//! let factor = conversion_factor("mbar", "Pa").unwrap();
//! assert!((factor - 100.0).abs() < 1e-10);
//! ```
//!
//! # Supported Syntax
//!
//! | Notation | Meaning |
//! |----------|---------|
//! | `cm^2`, `cm**2`, `cm2` | Square centimetres |
//! | `cm^-1`, `cm-1`, `1/cm` | Inverse centimetres |
//! | `cm^2/molecule`, `cm^2 per molecule` | Cross-section per molecule |
//! | `cm^5/molecule^2`, `cm^-1 amagat^-2` | Binary absorption coefficient |
//!
//! # Unresolved units
//!
//! A table whose unit is [`UnitSpec::Unspecified`] cannot be used
//! numerically. [`resolve_unit`] either finds out what the data is in or
//! fails with [`crate::errors::ExokError::UnresolvedUnit`].

pub mod conversion;
pub mod dimension;
pub mod parser;
pub mod registry;

pub use conversion::{
    conversion_factor, resolve_unit, strip_per_molecule, ConversionError, ResolvedUnit, Unit,
    UnitSpec,
};
pub use dimension::Dimension;
pub use parser::{ParseError, ParsedUnit};
pub use registry::{BOLTZMANN, LOSCHMIDT};

/// Pressure unit used by MKS tables.
pub const MKS_PRESSURE: &str = "Pa";
/// Cross-section unit used by MKS tables.
pub const MKS_CROSS_SECTION: &str = "m^2/molecule";
/// Binary absorption coefficient unit used by MKS continuum tables.
pub const MKS_CONTINUUM: &str = "m^5";
/// Default unit for continuum tables read from HITRAN-style data.
pub const HITRAN_CONTINUUM: &str = "cm^5";
