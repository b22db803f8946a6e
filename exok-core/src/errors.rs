use crate::units::ConversionError;
use thiserror::Error;

/// Error type for invalid table and radiative-transfer operations.
///
/// Degenerate numeric cases (zero dynamic range, empty bins) and out-of-range
/// queries are never reported through this type: they are handled locally.
#[derive(Error, Debug)]
pub enum ExokError {
    /// Missing database or profile, incompatible units, mismatched grids.
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),
    /// A unit was still unspecified when a numeric operation needed it.
    #[error(
        "The {quantity} is unspecified. Give the unit the data is in before converting or using it"
    )]
    UnresolvedUnit { quantity: String },
    #[error(transparent)]
    Unit(#[from] ConversionError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ExokError {
    pub fn shape_mismatch(context: &str, expected: &[usize], found: &[usize]) -> Self {
        ExokError::ShapeMismatch {
            context: context.to_string(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

/// Convenience type for `Result<T, ExokError>`.
pub type ExokResult<T> = Result<T, ExokError>;
