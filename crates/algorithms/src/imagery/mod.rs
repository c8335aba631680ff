//! Imagery analysis algorithms
//!
//! Normalized-difference spectral indices (NDVI, NDWI, MNDWI, NBR, NDRE,
//! GNDVI) computed on masked bands.

mod indices;

pub use indices::{
    compute_index, index_band, normalized_difference, IndexCompute, IndexParams, SpectralIndex,
};
