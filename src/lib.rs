//! Correlated-k opacities and radiative transfer.
//!
//! `exok` gathers the opacity tables of [`tables`] and the atmospheric radiative
//! transfer of [`atm`]:
//!
//! ```text
//!   SpectralTable / CorrelatedKTable / ContinuumTable
//!        -> TableDatabase / ContinuumDatabase
//!        -> GasMixture -> AtmosphericColumn -> Spectrum
//! ```

pub use exok_atm as atm;
pub use exok_core as tables;

pub use exok_core::errors::{ExokError, ExokResult};
pub use exok_core::settings::Settings;

/// The types most programs need.
pub mod prelude {
    pub use exok_atm::column::{AdiabaticProfile, AtmosphericColumn, ColumnParameters};
    pub use exok_atm::composition::{GasComposition, MixingRatio};
    pub use exok_atm::gas_mix::{CrossSectionOptions, GasMixture};
    pub use exok_atm::solver::{EmissionOptions, HeatingOptions, Spectrum, TransmissionOptions};
    pub use exok_core::continuum::ContinuumTable;
    pub use exok_core::database::{ContinuumDatabase, TableDatabase};
    pub use exok_core::errors::{ExokError, ExokResult};
    pub use exok_core::ktable::CorrelatedKTable;
    pub use exok_core::ktable5d::VariableGasKTable;
    pub use exok_core::overlap::Resampling;
    pub use exok_core::quadrature::QuadratureGrid;
    pub use exok_core::settings::Settings;
    pub use exok_core::spectral_grid::SpectralGrid;
    pub use exok_core::table::{SpectralTable, TableParts, TableQuery, VmrField};
    pub use exok_core::units::UnitSpec;
}
