//! Physical dimensions for unit validation.
//!
//! Dimensions are integer exponents of the base quantities that appear in
//! opacity data: mass, length, time, temperature and amount of substance.
//! Molecule counts are treated as pure numbers, so a cross-section in
//! `cm^2/molecule` has the dimension of an area.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

/// Represents the physical dimension of a quantity.
///
/// For example a pressure has dimensions M·L⁻¹·T⁻² and a binary
/// collision-induced absorption coefficient in `cm^5/molecule^2` has L⁵.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Dimension {
    pub mass: i8,
    pub length: i8,
    pub time: i8,
    pub temperature: i8,
    pub amount: i8,
}

impl Dimension {
    /// Creates a dimension with the specified exponents.
    #[must_use]
    pub const fn new(mass: i8, length: i8, time: i8, temperature: i8, amount: i8) -> Self {
        Self {
            mass,
            length,
            time,
            temperature,
            amount,
        }
    }

    #[must_use]
    pub const fn dimensionless() -> Self {
        Self::new(0, 0, 0, 0, 0)
    }

    pub const MASS: Self = Self::new(1, 0, 0, 0, 0);
    pub const LENGTH: Self = Self::new(0, 1, 0, 0, 0);
    pub const TIME: Self = Self::new(0, 0, 1, 0, 0);
    pub const TEMPERATURE: Self = Self::new(0, 0, 0, 1, 0);
    pub const AMOUNT: Self = Self::new(0, 0, 0, 0, 1);

    /// Area (L²), the dimension of a cross-section per molecule.
    pub const AREA: Self = Self::new(0, 2, 0, 0, 0);

    /// Number density (L⁻³).
    pub const NUMBER_DENSITY: Self = Self::new(0, -3, 0, 0, 0);

    /// Pressure (M·L⁻¹·T⁻²).
    pub const PRESSURE: Self = Self::new(1, -1, -2, 0, 0);

    /// Force (M·L·T⁻²).
    pub const FORCE: Self = Self::new(1, 1, -2, 0, 0);

    /// Energy (M·L²·T⁻²).
    pub const ENERGY: Self = Self::new(1, 2, -2, 0, 0);

    /// Power (M·L²·T⁻³).
    pub const POWER: Self = Self::new(1, 2, -3, 0, 0);

    #[must_use]
    pub const fn is_dimensionless(&self) -> bool {
        self.mass == 0
            && self.length == 0
            && self.time == 0
            && self.temperature == 0
            && self.amount == 0
    }

    /// Raises this dimension to an integer power.
    #[must_use]
    pub const fn pow(&self, exp: i8) -> Self {
        Self::new(
            self.mass * exp,
            self.length * exp,
            self.time * exp,
            self.temperature * exp,
            self.amount * exp,
        )
    }
}

impl Mul for Dimension {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::new(
            self.mass + rhs.mass,
            self.length + rhs.length,
            self.time + rhs.time,
            self.temperature + rhs.temperature,
            self.amount + rhs.amount,
        )
    }
}

impl Div for Dimension {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        self * rhs.pow(-1)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let parts: Vec<String> = [
            ("M", self.mass),
            ("L", self.length),
            ("T", self.time),
            ("Θ", self.temperature),
            ("N", self.amount),
        ]
        .iter()
        .filter(|(_, e)| *e != 0)
        .map(|(s, e)| {
            if *e == 1 {
                s.to_string()
            } else {
                format!("{s}^{e}")
            }
        })
        .collect();
        write!(f, "{}", parts.join("·"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_composition() {
        let dim = Dimension::FORCE / Dimension::AREA;
        assert_eq!(dim, Dimension::PRESSURE);
    }

    #[test]
    fn test_display() {
        assert_eq!(Dimension::AREA.to_string(), "L^2");
        assert_eq!(Dimension::dimensionless().to_string(), "1");
        assert_eq!(Dimension::PRESSURE.to_string(), "M·L^-1·T^-2");
    }
}
