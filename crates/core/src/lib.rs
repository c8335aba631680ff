//! # Verdure Core
//!
//! Core types, traits and I/O for the Verdure compositing pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic raster grid type
//! - `PixelMask` / `MaskedRaster`: explicit per-sample validity
//! - `RasterImage` / `ImageCollection`: timestamped multi-band scenes
//! - `GeoTransform`, `CRS`, `BBox` and map projections
//! - Calendar month windows for temporal grouping
//! - I/O for GeoTIFF bands and scene manifests

pub mod bbox;
pub mod crs;
pub mod error;
pub mod image;
pub mod io;
pub mod raster;
pub mod time;

pub use bbox::BBox;
pub use crs::{Projection, CRS};
pub use error::{Error, Result};
pub use image::{Band, ImageCollection, ImageSource, RasterImage};
pub use raster::{GeoTransform, MaskedRaster, PixelMask, Raster, RasterElement};
pub use time::MonthWindow;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bbox::BBox;
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::image::{ImageCollection, ImageSource, RasterImage};
    pub use crate::raster::{GeoTransform, MaskedRaster, PixelMask, Raster, RasterElement};
    pub use crate::time::MonthWindow;
    pub use crate::Algorithm;
}

/// Core trait for the pipeline stages.
///
/// Stages are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
