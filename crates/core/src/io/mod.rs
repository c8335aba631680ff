//! I/O for GeoTIFF bands and scene manifests

mod manifest;
mod native;

pub use manifest::{ManifestSource, SceneEntry, SceneManifest};
pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
    write_masked_geotiff, GeoTiffOptions,
};
