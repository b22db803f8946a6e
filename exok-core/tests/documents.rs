use approx::assert_relative_eq;
use exok_core::continuum::ContinuumTable;
use exok_core::document::{find_table, read_continuum, read_table, write_continuum, write_table};
use exok_core::errors::ExokError;
use exok_core::ktable::CorrelatedKTable;
use exok_core::quadrature::QuadratureGrid;
use exok_core::settings::Settings;
use exok_core::spectral_grid::SpectralGrid;
use exok_core::table::{TableKind, TableMetadata, TableParts};
use exok_core::units::UnitSpec;
use ndarray::{array, Array5};

fn raw() -> Settings {
    Settings {
        mks_units: false,
        ..Default::default()
    }
}

fn ktable() -> CorrelatedKTable {
    let quadrature = QuadratureGrid::gauss_legendre(3).unwrap();
    let values = Array5::from_shape_fn((2, 3, 1, 2, 3), |(ip, it, _, iw, ig)| {
        1e-22 * (1 + ip + 2 * it + 3 * iw) as f64 * (1 + ig) as f64
    });
    let mut metadata = TableMetadata::new("CO2");
    metadata.doi = "10.0000/example".to_string();
    CorrelatedKTable::from_parts(
        TableParts {
            metadata,
            pressure: vec![1e-2, 1.0],
            temperature: vec![100.0, 200.0, 400.0],
            mixing_ratio: None,
            grid: SpectralGrid::from_edges(vec![500.0, 600.0, 800.0]).unwrap(),
            quadrature: Some(quadrature),
            values,
            pressure_unit: UnitSpec::known("bar"),
            value_unit: UnitSpec::known("cm^2/molecule"),
        },
        &raw(),
    )
    .unwrap()
}

#[test]
fn ktable_survives_a_toml_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("co2.ktable.toml");
    let table = ktable();
    write_table(&table, &path, &UnitSpec::Unspecified, &UnitSpec::Unspecified).unwrap();

    let restored = read_table(&path, &raw()).unwrap();
    assert_eq!(restored.kind(), TableKind::CorrelatedK);
    assert_eq!(restored.metadata().doi, "10.0000/example");
    assert_eq!(restored.pressure_unit(), &UnitSpec::known("bar"));
    assert_eq!(restored.value_unit(), &UnitSpec::known("cm^2/molecule"));
    for (a, b) in restored.values().iter().zip(table.values().iter()) {
        assert_relative_eq!(*a, *b, max_relative = 1e-15);
    }
    let q = restored.quadrature().unwrap();
    for (a, b) in q.weights().iter().zip(table.g_grid().weights()) {
        assert_relative_eq!(*a, *b, max_relative = 1e-15);
    }
}

#[test]
fn writing_in_other_units_leaves_the_table_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("co2.json");
    let table = ktable();
    write_table(&table, &path, &UnitSpec::known("Pa"), &UnitSpec::known("m^2/molecule")).unwrap();
    assert_eq!(table.pressure_unit(), &UnitSpec::known("bar"));
    assert_eq!(table.values()[[0, 0, 0, 0, 0]], 1e-22);

    let restored = read_table(&path, &raw()).unwrap();
    assert_eq!(restored.pressure_unit(), &UnitSpec::known("Pa"));
    assert_relative_eq!(restored.pressure()[1], 1e5, max_relative = 1e-12);
    assert_relative_eq!(
        restored.values()[[0, 0, 0, 0, 0]],
        1e-26,
        max_relative = 1e-12
    );

    // converted to mks on reading
    let mks = read_table(&path, &Settings::default()).unwrap();
    assert_relative_eq!(mks.values()[[1, 2, 0, 1, 2]], table.values()[[1, 2, 0, 1, 2]] * 1e-4, max_relative = 1e-12);
}

#[test]
fn tables_are_found_in_search_paths() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    write_table(
        &ktable(),
        second.path().join("co2.toml"),
        &UnitSpec::Unspecified,
        &UnitSpec::Unspecified,
    )
    .unwrap();
    let settings = Settings {
        search_paths: vec![first.path().to_path_buf(), second.path().to_path_buf()],
        ..raw()
    };
    let table = find_table("co2.toml", &settings).unwrap();
    assert_eq!(table.molecule(), "CO2");
    assert!(matches!(
        find_table("h2o.toml", &settings),
        Err(ExokError::Configuration(_))
    ));
}

#[test]
fn garbage_documents_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"mol_name\": 3}").unwrap();
    assert!(matches!(
        read_table(&path, &raw()),
        Err(ExokError::Serialization(_))
    ));
    assert!(matches!(
        read_table(dir.path().join("missing.toml"), &raw()),
        Err(ExokError::Io(_))
    ));
}

#[test]
fn continuum_survives_a_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("h2-he.cia.toml");
    let table = ContinuumTable::hitran(
        ("H2", "He"),
        vec![100.0, 300.0],
        SpectralGrid::from_edges(vec![10.0, 20.0, 30.0]).unwrap(),
        array![[1e-45, 2e-45], [3e-45, 4e-45]],
        &raw(),
    )
    .unwrap();
    write_continuum(&table, &path).unwrap();
    let restored = read_continuum(&path, &raw()).unwrap();
    assert_eq!(restored.pair(), ("H2", "He"));
    assert_eq!(restored.unit(), &UnitSpec::known("cm^5"));
    assert_eq!(restored.abs_coeff(), table.abs_coeff());

    let mks = read_continuum(&path, &Settings::default()).unwrap();
    assert_relative_eq!(mks.abs_coeff()[[1, 1]], 4e-55, max_relative = 1e-12);
}
