//! Table documents: a self-describing file format for tables.
//!
//! A document is a set of named arrays, each with its shape, optional unit
//! and row-major data, plus a few metadata fields:
//!
//! ```text
//!   mol_name, DOI, Date_ID, method, key_iso_ll
//!   p, t, [x], bin_centers, bin_edges, [weights, samples], kcoeff | xsecarr
//! ```
//!
//! Files ending in `.json` are JSON, anything else is TOML.

use crate::continuum::ContinuumTable;
use crate::errors::{ExokError, ExokResult};
use crate::quadrature::QuadratureGrid;
use crate::settings::Settings;
use crate::spectral_grid::SpectralGrid;
use crate::table::{SpectralTable, TableKind, TableMetadata, TableParts};
use crate::units::UnitSpec;
use ndarray::{Array, Array2, Array5, ArrayBase, Data, Dimension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One array of a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedArray {
    pub shape: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    pub data: Vec<f64>,
}

impl NamedArray {
    fn vector(data: &[f64], units: Option<&str>) -> Self {
        Self {
            shape: vec![data.len()],
            units: units.map(str::to_string),
            data: data.to_vec(),
        }
    }

    fn array<S, D>(values: &ArrayBase<S, D>, shape: Vec<usize>, unit: &UnitSpec) -> Self
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        Self {
            shape,
            units: unit.as_known().map(str::to_string),
            data: values.iter().copied().collect(),
        }
    }

    fn unit(&self) -> UnitSpec {
        self.units
            .clone()
            .map_or(UnitSpec::Unspecified, UnitSpec::from)
    }

    fn check_len(&self, name: &str) -> ExokResult<()> {
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(ExokError::shape_mismatch(
                name,
                &[expected],
                &[self.data.len()],
            ));
        }
        Ok(())
    }
}

/// Document of a cross-section or correlated-k table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableDocument {
    pub mol_name: String,
    #[serde(rename = "DOI")]
    pub doi: String,
    #[serde(rename = "Date_ID")]
    pub date_id: String,
    pub method: String,
    /// Whether the table is meant to be interpolated in log space.
    pub key_iso_ll: bool,
    pub p: NamedArray,
    pub t: NamedArray,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<NamedArray>,
    pub bin_centers: NamedArray,
    pub bin_edges: NamedArray,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<NamedArray>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<NamedArray>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kcoeff: Option<NamedArray>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xsecarr: Option<NamedArray>,
}

impl TableDocument {
    pub fn from_table(table: &SpectralTable) -> Self {
        let [np, nt, nx, nw, ng] = table.shape();
        let shape = match table.kind() {
            TableKind::CrossSection => vec![np, nt, nw],
            TableKind::CorrelatedK => vec![np, nt, nw, ng],
            TableKind::VariableGas => vec![np, nt, nx, nw, ng],
        };
        let values = NamedArray::array(table.values(), shape, table.value_unit());
        let (kcoeff, xsecarr) = match table.kind() {
            TableKind::CrossSection => (None, Some(values)),
            _ => (Some(values), None),
        };
        let metadata = table.metadata();
        Self {
            mol_name: metadata.molecule.clone(),
            doi: metadata.doi.clone(),
            date_id: metadata.date_id.clone(),
            method: metadata.method.clone(),
            key_iso_ll: table.settings().log_interp,
            p: NamedArray::vector(table.pressure(), table.pressure_unit().as_known()),
            t: NamedArray::vector(table.temperature(), Some("K")),
            x: table.mixing_ratio().map(|x| NamedArray::vector(x, None)),
            bin_centers: NamedArray::vector(table.grid().centers(), Some("cm^-1")),
            bin_edges: NamedArray::vector(table.grid().edges(), Some("cm^-1")),
            weights: table.quadrature().map(|q| NamedArray::vector(q.weights(), None)),
            samples: table.quadrature().map(|q| NamedArray::vector(q.abscissas(), None)),
            kcoeff,
            xsecarr,
        }
    }

    /// Rebuilds the table. Units are taken from the document and converted
    /// according to `settings`.
    pub fn into_table(self, settings: &Settings) -> ExokResult<SpectralTable> {
        let quadrature = match (self.weights, self.samples) {
            (Some(w), Some(g)) => Some(QuadratureGrid::custom(w.data, Some(g.data))?),
            (Some(w), None) => Some(QuadratureGrid::custom(w.data, None)?),
            (None, _) => None,
        };
        let values = match (self.kcoeff, self.xsecarr) {
            (Some(v), None) if quadrature.is_some() => v,
            (None, Some(v)) if quadrature.is_none() => v,
            _ => {
                return Err(ExokError::Serialization(
                    "a document holds either kcoeff with weights or xsecarr without".to_string(),
                ))
            }
        };
        values.check_len("document values")?;
        let grid = SpectralGrid::new(self.bin_centers.data, self.bin_edges.data)?;
        let nx = self.x.as_ref().map_or(1, |x| x.data.len());
        let ng = quadrature.as_ref().map_or(1, QuadratureGrid::len);
        let shape = (self.p.data.len(), self.t.data.len(), nx, grid.len(), ng);
        let value_unit = values.unit();
        let array = Array5::from_shape_vec(shape, values.data).map_err(|_| {
            ExokError::shape_mismatch(
                "document values",
                &[shape.0, shape.1, shape.2, shape.3, shape.4],
                &values.shape,
            )
        })?;
        let mut metadata = TableMetadata::new(&self.mol_name);
        metadata.doi = self.doi;
        metadata.date_id = self.date_id;
        metadata.method = self.method;
        let settings = Settings {
            log_interp: self.key_iso_ll,
            ..settings.clone()
        };
        SpectralTable::from_parts(
            TableParts {
                metadata,
                pressure_unit: self.p.unit(),
                pressure: self.p.data,
                temperature: self.t.data,
                mixing_ratio: self.x.map(|x| x.data),
                grid,
                quadrature,
                values: array,
                value_unit,
            },
            &settings,
        )
    }
}

/// Document of a continuum table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContinuumDocument {
    pub cia_pair: String,
    pub t: NamedArray,
    pub bin_centers: NamedArray,
    pub bin_edges: NamedArray,
    pub abs_coeff: NamedArray,
}

impl ContinuumDocument {
    pub fn from_table(table: &ContinuumTable) -> Self {
        Self {
            cia_pair: table.name(),
            t: NamedArray::vector(table.temperature(), Some("K")),
            bin_centers: NamedArray::vector(table.grid().centers(), Some("cm^-1")),
            bin_edges: NamedArray::vector(table.grid().edges(), Some("cm^-1")),
            abs_coeff: NamedArray::array(
                table.abs_coeff(),
                table.abs_coeff().shape().to_vec(),
                table.unit(),
            ),
        }
    }

    pub fn into_table(self, settings: &Settings) -> ExokResult<ContinuumTable> {
        let (mol1, mol2) = self.cia_pair.split_once('-').ok_or_else(|| {
            ExokError::Serialization(format!("'{}' is not a pair like H2-He", self.cia_pair))
        })?;
        self.abs_coeff.check_len("continuum coefficients")?;
        let grid = SpectralGrid::new(self.bin_centers.data, self.bin_edges.data)?;
        let shape = (self.t.data.len(), grid.len());
        let unit = self.abs_coeff.unit();
        let abs_coeff: Array2<f64> = Array::from_shape_vec(shape, self.abs_coeff.data)
            .map_err(|_| {
                ExokError::shape_mismatch(
                    "continuum coefficients",
                    &[shape.0, shape.1],
                    &self.abs_coeff.shape,
                )
            })?;
        ContinuumTable::new((mol1, mol2), self.t.data, grid, abs_coeff, unit, settings)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn write_document<T: Serialize>(document: &T, path: &Path) -> ExokResult<()> {
    let content = if is_json(path) {
        serde_json::to_string_pretty(document).map_err(|e| ExokError::Serialization(e.to_string()))?
    } else {
        toml::to_string(document).map_err(|e| ExokError::Serialization(e.to_string()))?
    };
    std::fs::write(path, content)?;
    log::info!("wrote {}", path.display());
    Ok(())
}

fn read_document<T: DeserializeOwned>(path: &Path) -> ExokResult<T> {
    let content = std::fs::read_to_string(path)?;
    if is_json(path) {
        serde_json::from_str(&content).map_err(|e| ExokError::Serialization(e.to_string()))
    } else {
        toml::from_str(&content).map_err(|e| ExokError::Serialization(e.to_string()))
    }
}

/// Writes `table` to `path`, in the given units if they are specified.
///
/// The conversion is done on a copy: `table` itself is left as it is.
pub fn write_table(
    table: &SpectralTable,
    path: impl AsRef<Path>,
    pressure_unit: &UnitSpec,
    value_unit: &UnitSpec,
) -> ExokResult<()> {
    let document = if pressure_unit.is_unspecified() && value_unit.is_unspecified() {
        TableDocument::from_table(table)
    } else {
        let mut converted = table.clone();
        converted.convert_pressure_unit(pressure_unit, &UnitSpec::Unspecified)?;
        converted.convert_value_unit(value_unit, &UnitSpec::Unspecified)?;
        TableDocument::from_table(&converted)
    };
    write_document(&document, path.as_ref())
}

pub fn read_table(path: impl AsRef<Path>, settings: &Settings) -> ExokResult<SpectralTable> {
    let document: TableDocument = read_document(path.as_ref())?;
    log::debug!("read table of {} from {}", document.mol_name, path.as_ref().display());
    document.into_table(settings)
}

/// Reads `file_name` from the first of `settings.search_paths` holding it.
pub fn find_table(file_name: &str, settings: &Settings) -> ExokResult<SpectralTable> {
    let path = settings.locate(file_name).ok_or_else(|| {
        ExokError::Configuration(format!(
            "{file_name} was not found in the search paths {:?}",
            settings.search_paths
        ))
    })?;
    read_table(path, settings)
}

pub fn write_continuum(table: &ContinuumTable, path: impl AsRef<Path>) -> ExokResult<()> {
    write_document(&ContinuumDocument::from_table(table), path.as_ref())
}

pub fn read_continuum(path: impl AsRef<Path>, settings: &Settings) -> ExokResult<ContinuumTable> {
    let document: ContinuumDocument = read_document(path.as_ref())?;
    document.into_table(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn settings() -> Settings {
        Settings {
            mks_units: false,
            ..Default::default()
        }
    }

    fn xsec() -> SpectralTable {
        SpectralTable::cross_section(
            "H2O",
            vec![1.0, 10.0],
            vec![300.0],
            SpectralGrid::from_edges(vec![1.0, 2.0, 4.0]).unwrap(),
            array![[[1e-20, 2e-20]], [[3e-20, 4e-20]]],
            UnitSpec::known("bar"),
            UnitSpec::known("cm^2/molecule"),
            &settings(),
        )
        .unwrap()
    }

    #[test]
    fn test_document_layout() {
        let doc = TableDocument::from_table(&xsec());
        assert_eq!(doc.mol_name, "H2O");
        assert_eq!(doc.doi, "unknown");
        assert!(doc.date_id.starts_with("exok-v"));
        assert!(doc.kcoeff.is_none());
        let xsecarr = doc.xsecarr.as_ref().unwrap();
        assert_eq!(xsecarr.shape, vec![2, 1, 2]);
        assert_eq!(xsecarr.units.as_deref(), Some("cm^2/molecule"));
        assert_eq!(doc.p.units.as_deref(), Some("bar"));

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("DOI").is_some());
        assert!(json.get("Date_ID").is_some());
        assert!(json.get("weights").is_none());
    }

    #[test]
    fn test_document_back_to_table() {
        let table = xsec();
        let restored = TableDocument::from_table(&table)
            .into_table(&settings())
            .unwrap();
        assert!(restored.same_structure(&table));
        assert_eq!(restored.values(), table.values());
        assert_eq!(restored.metadata(), table.metadata());
    }

    #[test]
    fn test_inconsistent_document_rejected() {
        let mut doc = TableDocument::from_table(&xsec());
        doc.xsecarr.as_mut().unwrap().data.pop();
        assert!(matches!(
            doc.into_table(&settings()),
            Err(ExokError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_continuum_document_pair() {
        let table = ContinuumTable::new(
            ("H2", "He"),
            vec![100.0],
            SpectralGrid::from_edges(vec![1.0, 2.0]).unwrap(),
            array![[1e-50]],
            UnitSpec::known("m^5"),
            &settings(),
        )
        .unwrap();
        let doc = ContinuumDocument::from_table(&table);
        assert_eq!(doc.cia_pair, "H2-He");
        let restored = doc.into_table(&settings()).unwrap();
        assert_eq!(restored.pair(), ("H2", "He"));
        assert_eq!(restored.abs_coeff(), table.abs_coeff());
    }
}
