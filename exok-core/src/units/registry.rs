//! Registry of the units found in opacity and atmosphere data.
//!
//! Conversion factors are multipliers from the registered unit to SI:
//! - `bar` has factor 1e5 (1 bar = 1e5 Pa)
//! - `amagat` has factor 2.6867811e25 (molecules per m³ at 0 °C and 1 atm)
//!
//! Molecule counts (`molecule`, `molec`) are pure numbers so that
//! `cm^2/molecule` converts to `m^2` like any area.

use super::dimension::Dimension;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Loschmidt number: molecules per m³ in one amagat.
pub const LOSCHMIDT: f64 = 2.686_781_1e25;

/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380_649e-23;

/// Information about a known unit.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    pub name: String,
    pub dimension: Dimension,
    /// Multiplier to SI base units.
    pub to_si_factor: f64,
}

impl UnitInfo {
    fn new(name: &str, dimension: Dimension, to_si_factor: f64) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            to_si_factor,
        }
    }
}

/// SI prefix multipliers.
#[derive(Debug, Clone, Copy)]
pub struct SiPrefix {
    pub symbol: &'static str,
    pub factor: f64,
}

/// SI prefixes accepted in front of prefixable units, longest symbol first.
pub static SI_PREFIXES: &[SiPrefix] = &[
    SiPrefix { symbol: "da", factor: 1e1 },
    SiPrefix { symbol: "G", factor: 1e9 },
    SiPrefix { symbol: "M", factor: 1e6 },
    SiPrefix { symbol: "k", factor: 1e3 },
    SiPrefix { symbol: "h", factor: 1e2 },
    SiPrefix { symbol: "d", factor: 1e-1 },
    SiPrefix { symbol: "c", factor: 1e-2 },
    SiPrefix { symbol: "m", factor: 1e-3 },
    SiPrefix { symbol: "u", factor: 1e-6 },
    SiPrefix { symbol: "n", factor: 1e-9 },
    SiPrefix { symbol: "p", factor: 1e-12 },
];

/// Units that accept an SI prefix.
const PREFIXABLE: &[&str] = &["m", "g", "s", "Pa", "bar", "J", "W", "N"];

/// The global unit registry.
pub static UNIT_REGISTRY: LazyLock<UnitRegistry> = LazyLock::new(UnitRegistry::new);

#[derive(Debug)]
pub struct UnitRegistry {
    units: HashMap<&'static str, UnitInfo>,
    aliases: HashMap<&'static str, &'static str>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            units: HashMap::new(),
            aliases: HashMap::new(),
        };
        registry.register_base_units();
        registry.register_pressure_units();
        registry.register_count_units();
        registry.register_derived_units();
        registry
    }

    /// Looks up a unit by symbol, handling aliases and SI prefixes.
    pub fn lookup(&self, symbol: &str) -> Option<UnitInfo> {
        if let Some(info) = self.units.get(symbol) {
            return Some(info.clone());
        }
        if let Some(info) = self.aliases.get(symbol).and_then(|c| self.units.get(c)) {
            return Some(info.clone());
        }
        self.lookup_prefixed(symbol)
    }

    fn lookup_prefixed(&self, symbol: &str) -> Option<UnitInfo> {
        SI_PREFIXES.iter().find_map(|prefix| {
            let base = symbol.strip_prefix(prefix.symbol)?;
            if !PREFIXABLE.contains(&base) {
                return None;
            }
            let info = self.units.get(base)?;
            Some(UnitInfo::new(
                symbol,
                info.dimension,
                info.to_si_factor * prefix.factor,
            ))
        })
    }

    fn insert(&mut self, name: &'static str, dimension: Dimension, factor: f64) {
        self.units.insert(name, UnitInfo::new(name, dimension, factor));
    }

    fn register_base_units(&mut self) {
        self.insert("g", Dimension::MASS, 1e-3);
        self.insert("m", Dimension::LENGTH, 1.0);
        self.insert("s", Dimension::TIME, 1.0);
        self.insert("K", Dimension::TEMPERATURE, 1.0);
        self.insert("mol", Dimension::AMOUNT, 1.0);
        self.insert("1", Dimension::dimensionless(), 1.0);
        self.aliases.insert("dimensionless", "1");
        self.insert("micron", Dimension::LENGTH, 1e-6);
        self.aliases.insert("um", "micron");
    }

    fn register_pressure_units(&mut self) {
        self.insert("Pa", Dimension::PRESSURE, 1.0);
        self.insert("bar", Dimension::PRESSURE, 1e5);
        self.insert("atm", Dimension::PRESSURE, 101_325.0);
        self.insert("torr", Dimension::PRESSURE, 101_325.0 / 760.0);
        self.insert("mmHg", Dimension::PRESSURE, 133.322_387_415);
        self.aliases.insert("Torr", "torr");
    }

    fn register_count_units(&mut self) {
        self.insert("molecule", Dimension::dimensionless(), 1.0);
        self.aliases.insert("molec", "molecule");
        self.aliases.insert("molecules", "molecule");
        self.insert("amagat", Dimension::NUMBER_DENSITY, LOSCHMIDT);
    }

    fn register_derived_units(&mut self) {
        self.insert("N", Dimension::FORCE, 1.0);
        self.insert("J", Dimension::ENERGY, 1.0);
        self.insert("W", Dimension::POWER, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_lookup() {
        let mbar = UNIT_REGISTRY.lookup("mbar").unwrap();
        assert_eq!(mbar.dimension, Dimension::PRESSURE);
        assert!((mbar.to_si_factor - 100.0).abs() < 1e-10);

        let cm = UNIT_REGISTRY.lookup("cm").unwrap();
        assert!((cm.to_si_factor - 1e-2).abs() < 1e-16);

        let kg = UNIT_REGISTRY.lookup("kg").unwrap();
        assert!((kg.to_si_factor - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_alias_lookup() {
        let molec = UNIT_REGISTRY.lookup("molec").unwrap();
        assert!(molec.dimension.is_dimensionless());
    }

    #[test]
    fn test_unprefixable_units() {
        assert!(UNIT_REGISTRY.lookup("katm").is_none());
        assert!(UNIT_REGISTRY.lookup("xyz").is_none());
    }
}
