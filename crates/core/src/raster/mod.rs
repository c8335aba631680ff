//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
mod mask;
mod masked;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use mask::PixelMask;
pub use masked::{MaskedRaster, MaskedStatistics, NODATA};
