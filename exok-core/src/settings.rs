//! Explicit configuration passed to tables and operations.
//!
//! Settings are plain values: every table keeps its own copy, so callers
//! working on different tables never observe each other's changes.
//!
//! # Examples
//!
//! ```
//! use exok_core::settings::Settings;
//!
//! let settings = Settings::from_toml_str(
//!     r#"
//!     log_interp = false
//!
//!     [bin_down]
//!     log_k_points = 500
//!     "#,
//! )
//! .unwrap();
//! assert!(!settings.log_interp);
//! assert!(settings.mks_units);
//! assert_eq!(settings.bin_down.log_k_points, 500);
//! ```

use crate::errors::{ExokError, ExokResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameters of the fine log(k) grid used when binning correlated-k tables down.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BinDownSettings {
    /// Number of points of the fine log(k) grid.
    pub log_k_points: usize,
    /// The fine grid extends past the true log(k) range on each side by
    /// `range / (log_k_points - log_k_margin_cells)`.
    pub log_k_margin_cells: f64,
}

impl Default for BinDownSettings {
    fn default() -> Self {
        Self {
            log_k_points: 300,
            log_k_margin_cells: 3.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Interpolate tables in ln(value) rather than value.
    pub log_interp: bool,
    /// Convert tables to Pa and m^2/molecule when they are built.
    pub mks_units: bool,
    /// Directories searched for table documents.
    pub search_paths: Vec<PathBuf>,
    /// Zeros are replaced by the smallest positive value divided by 10^this.
    pub remove_zeros_decades: f64,
    pub bin_down: BinDownSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_interp: true,
            mks_units: true,
            search_paths: Vec::new(),
            remove_zeros_decades: 10.0,
            bin_down: BinDownSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> ExokResult<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| ExokError::Serialization(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ExokResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> ExokResult<()> {
        let cells = self.bin_down.log_k_margin_cells;
        if self.bin_down.log_k_points < 2 || (self.bin_down.log_k_points as f64) <= cells {
            return Err(ExokError::Configuration(format!(
                "bin_down.log_k_points must be at least 2 and exceed log_k_margin_cells ({cells})"
            )));
        }
        Ok(())
    }

    /// Finds `file_name` in the configured search paths, first match wins.
    pub fn locate(&self, file_name: &str) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .map(|dir| dir.join(file_name))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.log_interp);
        assert!(settings.mks_units);
        assert_eq!(settings.bin_down.log_k_points, 300);
        assert_eq!(settings.bin_down.log_k_margin_cells, 3.0);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result = Settings::from_toml_str("log_interpolation = true");
        assert!(matches!(result, Err(ExokError::Serialization(_))));
    }

    #[test]
    fn test_invalid_bin_down_rejected() {
        let result = Settings::from_toml_str("[bin_down]\nlog_k_points = 3\n");
        assert!(matches!(result, Err(ExokError::Configuration(_))));
    }

    #[test]
    fn test_search_paths_roundtrip() {
        let settings = Settings {
            search_paths: vec![PathBuf::from("/data/ktables")],
            ..Default::default()
        };
        let serialised = toml::to_string(&settings).unwrap();
        let deserialised = Settings::from_toml_str(&serialised).unwrap();
        assert_eq!(settings, deserialised);
    }

    #[test]
    fn test_locate_missing_file() {
        let settings = Settings::default();
        assert!(settings.locate("H2O.ktable.json").is_none());
    }
}
