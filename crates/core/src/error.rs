//! Error types for Verdure

use thiserror::Error;

/// Main error type for Verdure operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Band '{band}' is not co-registered with image '{image}': {reason}")]
    GridMismatch {
        image: String,
        band: String,
        reason: String,
    },

    #[error("Image '{image}' has no band named '{band}'")]
    MissingBand { image: String, band: String },

    #[error("Reprojection failed: {0}")]
    Reprojection(String),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Image collection is empty: {0}")]
    EmptyCollection(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::MissingBand`]
    pub fn missing_band(image: impl Into<String>, band: impl Into<String>) -> Self {
        Error::MissingBand {
            image: image.into(),
            band: band.into(),
        }
    }
}

/// Result type alias for Verdure operations
pub type Result<T> = std::result::Result<T, Error>;
