//! Unit conversion calculations.
//!
//! [`Unit`] combines parsing, normalization and conversion. [`UnitSpec`] and
//! [`resolve_unit`] implement the rule deciding which unit a table is really
//! in when a file and a caller may disagree, or when neither knows.
//!
//! ```
//! use exok_core::units::Unit;
//!
//! let cgs = Unit::parse("cm^2/molecule").unwrap();
//! let mks = Unit::parse("m^2").unwrap();
//! let factor = cgs.conversion_factor(&mks).unwrap();
//! assert!((factor - 1e-4).abs() < 1e-18);
//! ```

use super::dimension::Dimension;
use super::parser::{ParseError, ParsedUnit};
use is_close::is_close;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error type for unit conversion failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    IncompatibleDimensions {
        from: Dimension,
        to: Dimension,
        from_unit: String,
        to_unit: String,
    },
    ParseError(ParseError),
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompatibleDimensions {
                from,
                to,
                from_unit,
                to_unit,
            } => write!(
                f,
                "cannot convert from '{from_unit}' to '{to_unit}': \
                 incompatible dimensions ({from} vs {to})"
            ),
            Self::ParseError(e) => write!(f, "unit parse error: {e}"),
        }
    }
}

impl std::error::Error for ConversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ParseError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for ConversionError {
    fn from(e: ParseError) -> Self {
        Self::ParseError(e)
    }
}

/// A parsed and validated unit.
///
/// Two units are equal if they have the same normalized representation, so
/// `cm^2/molecule` equals `cm2 molecule^-1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    original: String,
    parsed: ParsedUnit,
}

impl Unit {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Ok(Self {
            original: input.to_string(),
            parsed: ParsedUnit::parse(input)?,
        })
    }

    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    #[must_use]
    pub fn normalized(&self) -> String {
        self.parsed.normalized()
    }

    pub fn dimension(&self) -> Result<Dimension, ParseError> {
        self.parsed.dimension()
    }

    /// Units are compatible if they have the same physical dimension.
    pub fn is_compatible(&self, other: &Self) -> bool {
        matches!((self.dimension(), other.dimension()), (Ok(a), Ok(b)) if a == b)
    }

    /// Multiplier converting a value in `self` to a value in `other`.
    ///
    /// # Errors
    ///
    /// Returns an error if either unit is unknown or the dimensions differ.
    pub fn conversion_factor(&self, other: &Self) -> Result<f64, ConversionError> {
        let dim_self = self.dimension()?;
        let dim_other = other.dimension()?;
        if dim_self != dim_other {
            return Err(ConversionError::IncompatibleDimensions {
                from: dim_self,
                to: dim_other,
                from_unit: self.original.clone(),
                to_unit: other.original.clone(),
            });
        }
        Ok(self.parsed.to_si_factor()? / other.parsed.to_si_factor()?)
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.parsed == other.parsed
    }
}

impl Eq for Unit {}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}

/// Calculates the conversion factor between two unit strings.
pub fn conversion_factor(from: &str, to: &str) -> Result<f64, ConversionError> {
    Unit::parse(from)?.conversion_factor(&Unit::parse(to)?)
}

/// A unit tag as carried by a table: either known or not (yet) known.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnitSpec {
    #[default]
    Unspecified,
    Known(String),
}

impl UnitSpec {
    pub fn known(unit: &str) -> Self {
        UnitSpec::Known(unit.to_string())
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            UnitSpec::Known(u) => Some(u),
            UnitSpec::Unspecified => None,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, UnitSpec::Unspecified)
    }

    /// Same tag once the per-molecule suffix is ignored.
    pub fn same_as(&self, other: &UnitSpec) -> bool {
        match (self, other) {
            (UnitSpec::Known(a), UnitSpec::Known(b)) => {
                let a = strip_per_molecule(a);
                let b = strip_per_molecule(b);
                a == b || matches!((Unit::parse(a), Unit::parse(b)), (Ok(x), Ok(y)) if x == y)
            }
            (UnitSpec::Unspecified, UnitSpec::Unspecified) => true,
            _ => false,
        }
    }

    /// Whether the tag is a known unit that converts to `unit` with a factor of one,
    /// the per-molecule suffix aside.
    pub fn is_equivalent_to(&self, unit: &str) -> bool {
        let Some(own) = self.as_known() else {
            return false;
        };
        conversion_factor(strip_per_molecule(own), strip_per_molecule(unit))
            .is_ok_and(|factor| is_close!(factor, 1.0))
    }
}

impl From<String> for UnitSpec {
    fn from(value: String) -> Self {
        if value.is_empty() || value == "unspecified" {
            UnitSpec::Unspecified
        } else {
            UnitSpec::Known(value)
        }
    }
}

impl From<UnitSpec> for String {
    fn from(value: UnitSpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for UnitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSpec::Unspecified => write!(f, "unspecified"),
            UnitSpec::Known(u) => write!(f, "{u}"),
        }
    }
}

/// Removes a trailing `/molecule` or `/molec` from a unit string.
pub fn strip_per_molecule(unit: &str) -> &str {
    let trimmed = unit.trim_end();
    trimmed
        .strip_suffix("/molecule")
        .or_else(|| trimmed.strip_suffix("/molec"))
        .unwrap_or(trimmed)
        .trim_end()
}

/// Outcome of [`resolve_unit`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUnit {
    /// Unit the data is in after applying `factor`.
    pub unit: String,
    pub factor: f64,
}

/// Chooses the unit to record and the factor to apply to the data.
///
/// * `file_unit`: what the data says it is in.
/// * `assumed_unit`: what the caller says it is in; overrides `file_unit`.
/// * `target_unit`: what to convert to; unspecified means no conversion.
///
/// # Errors
///
/// `UnresolvedUnit` when neither `file_unit` nor `assumed_unit` is known,
/// and unit errors when the conversion is impossible.
pub fn resolve_unit(
    quantity: &str,
    file_unit: &UnitSpec,
    assumed_unit: &UnitSpec,
    target_unit: &UnitSpec,
) -> crate::errors::ExokResult<ResolvedUnit> {
    let starting = match (assumed_unit, file_unit) {
        (UnitSpec::Known(assumed), UnitSpec::Known(file)) => {
            if assumed != file {
                log::warn!(
                    "assuming {quantity} is '{assumed}' although the data says '{file}'; \
                     the former will be used"
                );
            }
            assumed.clone()
        }
        (UnitSpec::Known(assumed), UnitSpec::Unspecified) => assumed.clone(),
        (UnitSpec::Unspecified, UnitSpec::Known(file)) => file.clone(),
        (UnitSpec::Unspecified, UnitSpec::Unspecified) => {
            return Err(crate::errors::ExokError::UnresolvedUnit {
                quantity: quantity.to_string(),
            })
        }
    };
    let unit = target_unit.as_known().unwrap_or(&starting).to_string();
    let factor = if unit == starting {
        1.0
    } else {
        conversion_factor(&starting, &unit)?
    };
    Ok(ResolvedUnit { unit, factor })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExokError;

    #[test]
    fn test_unit_equality() {
        let a = Unit::parse("cm^2/molecule").unwrap();
        let b = Unit::parse("cm2 molecule^-1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Unit::parse("m^2").unwrap());
    }

    #[test]
    fn test_pressure_factors() {
        assert!((conversion_factor("bar", "Pa").unwrap() - 1e5).abs() < 1e-8);
        assert!((conversion_factor("mbar", "Pa").unwrap() - 100.0).abs() < 1e-10);
        assert!((conversion_factor("atm", "bar").unwrap() - 1.01325).abs() < 1e-12);
    }

    #[test]
    fn test_cross_section_per_molecule_is_area() {
        let factor = conversion_factor("cm^2/molecule", "m^2").unwrap();
        assert!((factor - 1e-4).abs() < 1e-18);
    }

    #[test]
    fn test_amagat_to_si() {
        let factor = conversion_factor("cm^-1 amagat^-2", "m^5").unwrap();
        let expected = 1e2 / (2.686_781_1e25_f64 * 2.686_781_1e25);
        assert!((factor / expected - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_incompatible_dimensions() {
        let result = conversion_factor("bar", "m^2");
        assert!(matches!(
            result,
            Err(ConversionError::IncompatibleDimensions { .. })
        ));
    }

    #[test]
    fn test_strip_per_molecule() {
        assert_eq!(strip_per_molecule("cm^2/molecule"), "cm^2");
        assert_eq!(strip_per_molecule("m^2/molec"), "m^2");
        assert_eq!(strip_per_molecule("m^2"), "m^2");
    }

    #[test]
    fn test_unit_spec_serde_roundtrip() {
        let json = serde_json::to_string(&UnitSpec::Unspecified).unwrap();
        assert_eq!(json, "\"unspecified\"");
        let spec: UnitSpec = serde_json::from_str("\"bar\"").unwrap();
        assert_eq!(spec, UnitSpec::known("bar"));
    }

    #[test]
    fn test_same_as_ignores_molecule_suffix() {
        assert!(UnitSpec::known("m^2/molecule").same_as(&UnitSpec::known("m^2")));
        assert!(!UnitSpec::known("cm^2").same_as(&UnitSpec::known("m^2")));
    }

    #[test]
    fn test_equivalent_units() {
        assert!(UnitSpec::known("m2 molecule^-1").is_equivalent_to("m^2/molecule"));
        assert!(UnitSpec::known("Pa").is_equivalent_to("Pa"));
        assert!(!UnitSpec::known("bar").is_equivalent_to("Pa"));
        assert!(!UnitSpec::known("cm^2/molecule").is_equivalent_to("m^2/molecule"));
        assert!(!UnitSpec::known("cm^5").is_equivalent_to("m^5"));
        assert!(!UnitSpec::Unspecified.is_equivalent_to("Pa"));
    }

    #[test]
    fn test_resolve_prefers_assumed_unit() {
        let resolved = resolve_unit(
            "pressure unit",
            &UnitSpec::known("Pa"),
            &UnitSpec::known("bar"),
            &UnitSpec::Unspecified,
        )
        .unwrap();
        assert_eq!(resolved.unit, "bar");
        assert_eq!(resolved.factor, 1.0);
    }

    #[test]
    fn test_resolve_converts_to_target() {
        let resolved = resolve_unit(
            "pressure unit",
            &UnitSpec::known("bar"),
            &UnitSpec::Unspecified,
            &UnitSpec::known("Pa"),
        )
        .unwrap();
        assert_eq!(resolved.unit, "Pa");
        assert!((resolved.factor - 1e5).abs() < 1e-8);
    }

    #[test]
    fn test_resolve_fails_when_nothing_known() {
        let result = resolve_unit(
            "pressure unit",
            &UnitSpec::Unspecified,
            &UnitSpec::Unspecified,
            &UnitSpec::known("Pa"),
        );
        assert!(matches!(result, Err(ExokError::UnresolvedUnit { .. })));
    }
}
