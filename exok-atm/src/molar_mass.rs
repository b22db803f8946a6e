//! Molar masses of gas species, in kg/mol.

use std::collections::{BTreeMap, HashMap};

pub trait MolarMassLookup {
    /// Molar mass of `species` in kg/mol, if known.
    fn molar_mass(&self, species: &str) -> Option<f64>;
}

/// Molar masses computed from chemical formulas such as `H2O`, `CO2` or
/// `C2H6`. `air` is also known.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardMolarMasses;

/// Standard atomic weights in g/mol.
const ELEMENTS: &[(&str, f64)] = &[
    ("H", 1.008),
    ("D", 2.014),
    ("He", 4.0026),
    ("Li", 6.94),
    ("C", 12.011),
    ("N", 14.007),
    ("O", 15.999),
    ("F", 18.998),
    ("Ne", 20.180),
    ("Na", 22.990),
    ("Mg", 24.305),
    ("Al", 26.982),
    ("Si", 28.085),
    ("P", 30.974),
    ("S", 32.06),
    ("Cl", 35.45),
    ("Ar", 39.948),
    ("K", 39.098),
    ("Ca", 40.078),
    ("Ti", 47.867),
    ("V", 50.942),
    ("Cr", 51.996),
    ("Fe", 55.845),
    ("Kr", 83.798),
    ("Xe", 131.293),
];

/// Mean molar mass of dry air, kg/mol
pub const AIR_MOLAR_MASS: f64 = 28.9647e-3;

fn element_mass(symbol: &str) -> Option<f64> {
    ELEMENTS
        .iter()
        .find(|(name, _)| *name == symbol)
        .map(|(_, mass)| *mass)
}

/// Molar mass in g/mol of a formula made of element symbols and counts.
pub fn formula_mass(formula: &str) -> Option<f64> {
    let chars: Vec<char> = formula.chars().collect();
    if chars.is_empty() {
        return None;
    }
    let mut total = 0.0;
    let mut i = 0;
    while i < chars.len() {
        if !chars[i].is_ascii_uppercase() {
            return None;
        }
        let mut symbol = chars[i].to_string();
        i += 1;
        while i < chars.len() && chars[i].is_ascii_lowercase() {
            symbol.push(chars[i]);
            i += 1;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let count = if start == i {
            1
        } else {
            chars[start..i].iter().collect::<String>().parse::<u32>().ok()?
        };
        total += element_mass(&symbol)? * f64::from(count);
    }
    Some(total)
}

impl MolarMassLookup for StandardMolarMasses {
    fn molar_mass(&self, species: &str) -> Option<f64> {
        if species.eq_ignore_ascii_case("air") {
            return Some(AIR_MOLAR_MASS);
        }
        formula_mass(species).map(|grams| grams * 1e-3)
    }
}

impl MolarMassLookup for HashMap<String, f64> {
    fn molar_mass(&self, species: &str) -> Option<f64> {
        self.get(species).copied()
    }
}

impl MolarMassLookup for BTreeMap<String, f64> {
    fn molar_mass(&self, species: &str) -> Option<f64> {
        self.get(species).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_formulas() {
        assert_relative_eq!(formula_mass("H2O").unwrap(), 18.015, max_relative = 1e-4);
        assert_relative_eq!(formula_mass("CO2").unwrap(), 44.009, max_relative = 1e-4);
        assert_relative_eq!(formula_mass("C2H6").unwrap(), 30.07, max_relative = 1e-3);
        assert_relative_eq!(formula_mass("TiO").unwrap(), 63.866, max_relative = 1e-4);
        assert_relative_eq!(formula_mass("He").unwrap(), 4.0026, max_relative = 1e-6);
    }

    #[test]
    fn test_bad_formulas() {
        assert!(formula_mass("").is_none());
        assert!(formula_mass("h2o").is_none());
        assert!(formula_mass("Xx2").is_none());
    }

    #[test]
    fn test_standard_lookup_is_in_kg() {
        let lookup = StandardMolarMasses;
        assert_relative_eq!(lookup.molar_mass("N2").unwrap(), 28.014e-3, max_relative = 1e-4);
        assert_eq!(lookup.molar_mass("air"), Some(AIR_MOLAR_MASS));
        assert!(lookup.molar_mass("unobtainium").is_none());
    }

    #[test]
    fn test_map_lookup() {
        let lookup = HashMap::from([("X".to_string(), 0.05)]);
        assert_eq!(lookup.molar_mass("X"), Some(0.05));
        assert_eq!(lookup.molar_mass("Y"), None);
    }
}
