//! Normalized-difference spectral indices on masked bands
//!
//! Every index here has the form `(A - B) / (A + B)`. A pixel is no-data
//! when either input is no-data or when `A + B` is exactly zero; the output
//! never holds NaN or infinity.

use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use verdure_core::image::RasterImage;
use verdure_core::raster::MaskedRaster;
use verdure_core::{Algorithm, Error, Result};

/// Enumeration of supported spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index
    NDVI,
    /// Normalized Difference Water Index (McFeeters)
    NDWI,
    /// Modified NDWI (Xu, uses SWIR)
    MNDWI,
    /// Normalized Burn Ratio
    NBR,
    /// Normalized Difference Red Edge Index
    NDRE,
    /// Green Normalized Difference Vegetation Index
    GNDVI,
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 6] = [
        SpectralIndex::NDVI,
        SpectralIndex::NDWI,
        SpectralIndex::MNDWI,
        SpectralIndex::NBR,
        SpectralIndex::NDRE,
        SpectralIndex::GNDVI,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::NDVI => "NDVI",
            SpectralIndex::NDWI => "NDWI",
            SpectralIndex::MNDWI => "MNDWI",
            SpectralIndex::NBR => "NBR",
            SpectralIndex::NDRE => "NDRE",
            SpectralIndex::GNDVI => "GNDVI",
        }
    }

    /// Sentinel-2 band names `(A, B)` of `(A - B) / (A + B)`
    pub fn bands(&self) -> (&'static str, &'static str) {
        match self {
            SpectralIndex::NDVI => ("B8", "B4"),
            SpectralIndex::NDWI => ("B3", "B8"),
            SpectralIndex::MNDWI => ("B3", "B11"),
            SpectralIndex::NBR => ("B8", "B12"),
            SpectralIndex::NDRE => ("B8", "B5"),
            SpectralIndex::GNDVI => ("B8", "B3"),
        }
    }
}

impl fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpectralIndex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SpectralIndex::ALL
            .into_iter()
            .find(|idx| idx.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidParameter {
                name: "index",
                value: s.to_string(),
                reason: "expected one of NDVI, NDWI, MNDWI, NBR, NDRE, GNDVI".into(),
            })
    }
}

// ---------------------------------------------------------------------------
// Generic normalized difference
// ---------------------------------------------------------------------------

/// Compute the normalized difference between two masked bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// For non-negative reflectance the result lies in [-1, 1].
pub fn normalized_difference(band_a: &MaskedRaster, band_b: &MaskedRaster) -> Result<MaskedRaster> {
    if band_a.shape() != band_b.shape() {
        return Err(Error::SizeMismatch {
            er: band_a.rows(),
            ec: band_a.cols(),
            ar: band_b.rows(),
            ac: band_b.cols(),
        });
    }

    let (rows, cols) = band_a.shape();
    let samples: Vec<Option<f64>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![None; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let (Some(a), Some(b)) = (band_a.get(row, col), band_b.get(row, col)) else {
                    continue;
                };
                let sum = a + b;
                if sum == 0.0 {
                    continue;
                }
                let nd = (a - b) / sum;
                if nd.is_finite() {
                    *out = Some(nd);
                }
            }
            row_data
        })
        .collect();

    MaskedRaster::from_options(band_a.values(), samples)
}

// ---------------------------------------------------------------------------
// Index on an image
// ---------------------------------------------------------------------------

/// Parameters for index computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Band `A` of `(A - B) / (A + B)` (NIR for NDVI)
    pub positive_band: String,
    /// Band `B` of `(A - B) / (A + B)` (Red for NDVI)
    pub negative_band: String,
    /// Name of the appended band
    pub output_band: String,
}

impl IndexParams {
    pub fn for_index(index: SpectralIndex) -> Self {
        let (a, b) = index.bands();
        Self {
            positive_band: a.to_string(),
            negative_band: b.to_string(),
            output_band: index.name().to_string(),
        }
    }
}

impl Default for IndexParams {
    fn default() -> Self {
        Self::for_index(SpectralIndex::NDVI)
    }
}

/// Index computation algorithm
#[derive(Debug, Clone, Default)]
pub struct IndexCompute;

impl Algorithm for IndexCompute {
    type Input = RasterImage;
    type Output = RasterImage;
    type Params = IndexParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "IndexCompute"
    }

    fn description(&self) -> &'static str {
        "Append a normalized-difference index band to an image"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let index = index_band(&input, &params)?;
        input.with_band(params.output_band, index)
    }
}

/// Return a copy of `image` with the index band appended; other bands pass
/// through unchanged
pub fn compute_index(image: &RasterImage, params: &IndexParams) -> Result<RasterImage> {
    let index = index_band(image, params)?;
    image.clone().with_band(params.output_band.clone(), index)
}

/// The index band alone
///
/// # Errors
/// `MissingBand` when either input band is absent.
pub fn index_band(image: &RasterImage, params: &IndexParams) -> Result<MaskedRaster> {
    let a = image.require_band(&params.positive_band)?;
    let b = image.require_band(&params.negative_band)?;
    normalized_difference(a, b)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use verdure_core::raster::{GeoTransform, PixelMask, Raster};

    fn make_band(rows: usize, cols: usize, value: f64) -> MaskedRaster {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        MaskedRaster::from_values(r)
    }

    fn make_gradient(rows: usize, cols: usize, start: f64, step: f64) -> MaskedRaster {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        for row in 0..rows {
            for col in 0..cols {
                r.set(row, col, start + (row * cols + col) as f64 * step).unwrap();
            }
        }
        MaskedRaster::from_values(r)
    }

    #[test]
    fn test_normalized_difference_basic() {
        let a = make_band(5, 5, 0.8);
        let b = make_band(5, 5, 0.2);

        let result = normalized_difference(&a, &b).unwrap();
        assert_relative_eq!(result.get(2, 2).unwrap(), 0.6, epsilon = 1e-12);
        assert_eq!(result.valid_count(), 25);
    }

    #[test]
    fn test_normalized_difference_range() {
        let a = make_gradient(10, 10, 0.0, 0.01);
        let b = make_gradient(10, 10, 0.5, -0.005);

        let result = normalized_difference(&a, &b).unwrap();
        for row in 0..10 {
            for col in 0..10 {
                if let Some(val) = result.get(row, col) {
                    assert!((-1.0..=1.0).contains(&val), "ND out of range: {val} at ({row}, {col})");
                }
            }
        }
    }

    #[test]
    fn zero_denominator_is_nodata() {
        let a = make_gradient(1, 3, 0.0, 0.1); // 0.0, 0.1, 0.2
        let b = make_band(1, 3, 0.0);
        let result = normalized_difference(&a, &b).unwrap();
        assert_eq!(result.get(0, 0), None);
        assert_eq!(result.get(0, 1), Some(1.0));
        assert!(result.values().data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn nodata_input_propagates() {
        let a = make_band(2, 2, 0.5)
            .with_mask(&PixelMask::from_fn(2, 2, |r, _| r == 0))
            .unwrap();
        let b = make_band(2, 2, 0.1)
            .with_mask(&PixelMask::from_fn(2, 2, |_, c| c == 0))
            .unwrap();
        let result = normalized_difference(&a, &b).unwrap();
        assert!(result.is_valid(0, 0));
        assert!(!result.is_valid(0, 1));
        assert!(!result.is_valid(1, 0));
        assert!(!result.is_valid(1, 1));
    }

    #[test]
    fn size_mismatch_is_error() {
        let a = make_band(2, 2, 0.5);
        let b = make_band(2, 3, 0.5);
        assert!(matches!(
            normalized_difference(&a, &b),
            Err(Error::SizeMismatch { .. })
        ));
    }

    fn scene() -> RasterImage {
        RasterImage::new("s", Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
            .with_band("B4", make_band(3, 3, 0.1))
            .unwrap()
            .with_band("B8", make_band(3, 3, 0.5))
            .unwrap()
    }

    #[test]
    fn ndvi_appended_to_image() {
        let out = IndexCompute.execute_default(scene()).unwrap();
        assert_eq!(out.band_names(), vec!["B4", "B8", "NDVI"]);
        let expected = (0.5 - 0.1) / (0.5 + 0.1);
        assert_relative_eq!(out.band("NDVI").unwrap().get(1, 1).unwrap(), expected, epsilon = 1e-12);
        assert_eq!(out.band("B4").unwrap().get(1, 1), Some(0.1));
    }

    #[test]
    fn missing_band_is_error() {
        let params = IndexParams::for_index(SpectralIndex::NBR);
        let err = compute_index(&scene(), &params).unwrap_err();
        assert!(matches!(err, Error::MissingBand { ref band, .. } if band == "B12"));
    }

    #[test]
    fn index_names_parse() {
        assert_eq!("ndvi".parse::<SpectralIndex>().unwrap(), SpectralIndex::NDVI);
        assert_eq!("GNDVI".parse::<SpectralIndex>().unwrap(), SpectralIndex::GNDVI);
        assert!("savi".parse::<SpectralIndex>().is_err());
        for idx in SpectralIndex::ALL {
            assert_eq!(idx.to_string().parse::<SpectralIndex>().unwrap(), idx);
        }
    }

    #[test]
    fn water_index_bands() {
        assert_eq!(SpectralIndex::NDWI.bands(), ("B3", "B8"));
        assert_eq!(SpectralIndex::MNDWI.bands(), ("B3", "B11"));
        assert_eq!(SpectralIndex::NDRE.bands(), ("B8", "B5"));
    }
}
