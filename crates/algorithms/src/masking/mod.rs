//! Cloud and quality masking of optical scenes
//!
//! Each scene is masked with exactly one of two strategies, picked by band
//! presence:
//! - **Bitmask**: the scene carries a QA band (`QA60`); a pixel is valid
//!   when the cloud and cirrus bits are clear
//! - **Classification**: otherwise the scene-classification band (`SCL`)
//!   is used; a pixel is valid when its class is in the accepted set
//!
//! The mask is applied uniformly to every retained optical band, which is
//! also rescaled from digital numbers to reflectance.

mod strategy;

pub use strategy::{select_strategy, MaskStrategy};

use crate::maybe_rayon::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use verdure_core::image::RasterImage;
use verdure_core::raster::{MaskedRaster, PixelMask};
use verdure_core::{Algorithm, Error, Result};

/// Parameters for cloud masking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudMaskParams {
    /// Name of the QA bitmask band
    pub qa_band: String,
    /// Bit positions that flag an unusable pixel (cloud = 10, cirrus = 11)
    pub qa_bits: Vec<u32>,
    /// Name of the scene-classification band
    pub classification_band: String,
    /// Classes accepted as clear (vegetation, bare soil, water, unclassified)
    pub valid_classes: BTreeSet<u16>,
    /// Digital numbers are divided by this to give reflectance
    pub scale_factor: f64,
    /// Optical bands are named with this prefix followed by a band number
    pub optical_prefix: String,
}

impl Default for CloudMaskParams {
    fn default() -> Self {
        Self {
            qa_band: "QA60".to_string(),
            qa_bits: vec![10, 11],
            classification_band: "SCL".to_string(),
            valid_classes: [4, 5, 6, 7].into_iter().collect(),
            scale_factor: 10_000.0,
            optical_prefix: "B".to_string(),
        }
    }
}

impl CloudMaskParams {
    pub fn validate(&self) -> Result<()> {
        if let Some(&bit) = self.qa_bits.iter().find(|&&b| b >= 16) {
            return Err(Error::InvalidParameter {
                name: "qa_bits",
                value: bit.to_string(),
                reason: "QA bands are 16-bit; positions must be below 16".into(),
            });
        }
        if self.valid_classes.is_empty() {
            return Err(Error::InvalidParameter {
                name: "valid_classes",
                value: "[]".into(),
                reason: "at least one class must be accepted".into(),
            });
        }
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "scale_factor",
                value: self.scale_factor.to_string(),
                reason: "must be a positive number".into(),
            });
        }
        Ok(())
    }
}

/// Cloud masking algorithm
#[derive(Debug, Clone, Default)]
pub struct CloudMask;

impl Algorithm for CloudMask {
    type Input = RasterImage;
    type Output = RasterImage;
    type Params = CloudMaskParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "CloudMask"
    }

    fn description(&self) -> &'static str {
        "QA bitmask or scene-classification cloud masking with reflectance scaling"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        mask_clouds(&input, &params)
    }
}

/// Mask a scene with the strategy its bands call for
pub fn mask_clouds(image: &RasterImage, params: &CloudMaskParams) -> Result<RasterImage> {
    let strategy = select_strategy(image, params);
    mask_with_strategy(image, &strategy, params)
}

/// Mask a scene with an explicit strategy.
///
/// Returns a new image holding only the optical bands, rescaled to
/// reflectance, with every pixel the strategy rejects marked invalid. The
/// timestamp and id are carried over unchanged.
///
/// # Errors
/// `MissingBand` when the strategy's band is absent from the image.
pub fn mask_with_strategy(
    image: &RasterImage,
    strategy: &MaskStrategy,
    params: &CloudMaskParams,
) -> Result<RasterImage> {
    let quality = image
        .band(strategy.band_name())
        .ok_or_else(|| Error::missing_band(image.id(), strategy.band_name()))?;
    let mask = clear_sky_mask(quality, strategy)?;
    let factor = params.scale_factor;

    let mut out = RasterImage::new(image.id(), image.timestamp());
    for band in image.bands() {
        if !is_optical_band(band.name(), &params.optical_prefix) {
            continue;
        }
        let scaled = band.data().with_mask(&mask)?.map_valid(|dn| dn / factor);
        out = out.with_band(band.name(), scaled)?;
    }

    tracing::debug!(
        image = image.id(),
        strategy = strategy.label(),
        clear = mask.count_valid(),
        bands = out.band_count(),
        "masked scene"
    );
    Ok(out)
}

/// Per-pixel clear-sky mask from the strategy's quality band. A pixel whose
/// quality sample is itself invalid is rejected.
pub fn clear_sky_mask(quality: &MaskedRaster, strategy: &MaskStrategy) -> Result<PixelMask> {
    let (rows, cols) = quality.shape();
    let values = quality.values();
    let valid = quality.mask();

    let flags: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_flags = vec![false; cols];
            for (col, flag) in row_flags.iter_mut().enumerate() {
                if !valid.is_valid(row, col) {
                    continue;
                }
                let q = unsafe { values.get_unchecked(row, col) };
                *flag = strategy.accepts(q);
            }
            row_flags
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), flags).map_err(|e| Error::Other(e.to_string()))?;
    Ok(PixelMask::from_array(array))
}

/// Whether `name` follows the optical band convention: `prefix` followed by
/// a band number and an optional letter suffix (`B4`, `B8A`, `B11`)
pub fn is_optical_band(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && rest[digits..].chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use verdure_core::raster::{GeoTransform, Raster};

    fn band(values: Vec<f64>) -> MaskedRaster {
        let n = values.len();
        let mut r = Raster::from_vec(values, 1, n).unwrap();
        r.set_transform(GeoTransform::new(48.2, 31.0, 0.0001, -0.0001));
        MaskedRaster::from_values(r)
    }

    fn scene() -> RasterImage {
        RasterImage::new("s", Utc.with_ymd_and_hms(2024, 3, 5, 7, 0, 0).unwrap())
    }

    #[test]
    fn optical_band_names() {
        assert!(is_optical_band("B4", "B"));
        assert!(is_optical_band("B8A", "B"));
        assert!(is_optical_band("B11", "B"));
        assert!(!is_optical_band("B", "B"));
        assert!(!is_optical_band("Blue", "B"));
        assert!(!is_optical_band("QA60", "B"));
        assert!(!is_optical_band("SCL", "B"));
        assert!(!is_optical_band("NDVI", "B"));
    }

    #[test]
    fn bitmask_rejects_cloud_and_cirrus() {
        let qa = (1 << 10) as f64;
        let cirrus = (1 << 11) as f64;
        let other_bit = (1 << 3) as f64;
        let img = scene()
            .with_band("B4", band(vec![1000.0, 1000.0, 1000.0, 1000.0]))
            .unwrap()
            .with_band("QA60", band(vec![0.0, qa, cirrus, other_bit]))
            .unwrap()
            .with_band("SCL", band(vec![4.0, 4.0, 4.0, 9.0]))
            .unwrap();

        let out = mask_clouds(&img, &CloudMaskParams::default()).unwrap();
        let red = out.band("B4").unwrap();
        assert_eq!(red.get(0, 0), Some(0.1));
        assert_eq!(red.get(0, 1), None);
        assert_eq!(red.get(0, 2), None);
        // SCL says cloud (9) but the QA path ignores it
        assert_eq!(red.get(0, 3), Some(0.1));
        assert_eq!(out.band_names(), vec!["B4"]);
        assert_eq!(out.timestamp(), img.timestamp());
    }

    #[test]
    fn classification_used_without_qa_band() {
        let img = scene()
            .with_band("B8", band(vec![3000.0, 3000.0, 3000.0, 3000.0, 3000.0]))
            .unwrap()
            .with_band("SCL", band(vec![6.0, 8.0, 4.0, 3.0, 7.0]))
            .unwrap();

        let out = mask_clouds(&img, &CloudMaskParams::default()).unwrap();
        let nir = out.band("B8").unwrap();
        let valid: Vec<bool> = (0..5).map(|c| nir.is_valid(0, c)).collect();
        assert_eq!(valid, vec![true, false, true, false, true]);
    }

    #[test]
    fn invalid_quality_sample_rejects_pixel() {
        let mut qa = Raster::from_vec(vec![0.0, 0.0], 1, 2).unwrap();
        qa.set_transform(GeoTransform::new(48.2, 31.0, 0.0001, -0.0001));
        let qa = MaskedRaster::new(qa, PixelMask::from_fn(1, 2, |_, c| c == 0)).unwrap();
        let img = scene()
            .with_band("B4", band(vec![500.0, 500.0]))
            .unwrap()
            .with_band("QA60", qa)
            .unwrap();

        let out = mask_clouds(&img, &CloudMaskParams::default()).unwrap();
        assert_eq!(out.band("B4").unwrap().valid_count(), 1);
    }

    #[test]
    fn missing_quality_band_is_error() {
        let img = scene().with_band("B4", band(vec![500.0])).unwrap();
        let err = mask_clouds(&img, &CloudMaskParams::default()).unwrap_err();
        assert!(matches!(err, Error::MissingBand { ref band, .. } if band == "SCL"));
    }

    #[test]
    fn source_nodata_stays_invalid_after_scaling() {
        let mut b4 = Raster::from_vec(vec![0.0, 2000.0], 1, 2).unwrap();
        b4.set_transform(GeoTransform::new(48.2, 31.0, 0.0001, -0.0001));
        b4.set_nodata(Some(0.0));
        let img = scene()
            .with_band("B4", MaskedRaster::from_raster(&b4))
            .unwrap()
            .with_band("SCL", band(vec![4.0, 4.0]))
            .unwrap();
        let out = CloudMask.execute_default(img).unwrap();
        let red = out.band("B4").unwrap();
        assert_eq!(red.get(0, 0), None);
        assert_eq!(red.get(0, 1), Some(0.2));
    }

    #[test]
    fn params_validation() {
        assert!(CloudMaskParams::default().validate().is_ok());
        let bad_bits = CloudMaskParams {
            qa_bits: vec![16],
            ..Default::default()
        };
        assert!(bad_bits.validate().is_err());
        let no_classes = CloudMaskParams {
            valid_classes: BTreeSet::new(),
            ..Default::default()
        };
        assert!(no_classes.validate().is_err());
    }
}
