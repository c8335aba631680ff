//! Masked raster to RGBA rendering.

use crate::scheme::{Palette, Rgb, NDVI_PALETTE};
use serde::{Deserialize, Serialize};
use verdure_core::{BBox, Error, MaskedRaster, Result};

/// Display range and palette for a single-band product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisParams {
    /// Value mapped to the first palette colour; lower values clamp
    pub min: f64,
    /// Value mapped to the last palette colour; higher values clamp
    pub max: f64,
    /// Hex colours (`RRGGBB`), evenly spaced between `min` and `max`
    pub palette: Vec<String>,
}

impl Default for VisParams {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 0.8,
            palette: NDVI_PALETTE.iter().map(|h| h.to_string()).collect(),
        }
    }
}

impl VisParams {
    /// Explicit range with the given palette
    pub fn with_range(min: f64, max: f64, palette: &Palette) -> Self {
        Self {
            min,
            max,
            palette: palette.colors().iter().map(Rgb::to_hex).collect(),
        }
    }

    /// Range stretched to the valid samples of `raster`.
    ///
    /// An all-invalid raster falls back to [0, 1]; a constant one gets a
    /// unit-wide range starting at its value.
    pub fn stretched(raster: &MaskedRaster, palette: &Palette) -> Self {
        let stats = raster.statistics();
        let (min, max) = match (stats.min, stats.max) {
            (Some(lo), Some(hi)) if hi - lo > f64::EPSILON => (lo, hi),
            (Some(lo), Some(_)) => (lo, lo + 1.0),
            _ => (0.0, 1.0),
        };
        Self::with_range(min, max, palette)
    }

    /// Fails on a non-finite or empty range or an unparsable palette
    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(Error::InvalidParameter {
                name: "vis_params",
                value: format!("min={}, max={}", self.min, self.max),
                reason: "expected finite min < max".into(),
            });
        }
        self.palette().map(|_| ())
    }

    /// Parsed palette
    pub fn palette(&self) -> Result<Palette> {
        Palette::from_hex(&self.palette)
    }
}

/// Render `raster` into a row-major RGBA buffer (`rows * cols * 4` bytes).
///
/// Invalid samples are fully transparent; valid ones are opaque.
pub fn render_rgba(raster: &MaskedRaster, vis: &VisParams) -> Result<Vec<u8>> {
    vis.validate()?;
    let palette = vis.palette()?;
    let inv_range = 1.0 / (vis.max - vis.min);
    let (rows, cols) = raster.shape();

    let mut rgba = vec![0u8; rows * cols * 4];
    for row in 0..rows {
        for col in 0..cols {
            let Some(v) = raster.get(row, col) else {
                continue;
            };
            let offset = (row * cols + col) * 4;
            let Rgb { r, g, b } = palette.evaluate((v - vis.min) * inv_range);
            rgba[offset..offset + 4].copy_from_slice(&[r, g, b, 255]);
        }
    }
    Ok(rgba)
}

/// Crop `raster` to `bbox` (map units of the raster) and render it.
///
/// Returns the buffer together with its (rows, cols).
pub fn render_rgba_clipped(
    raster: &MaskedRaster,
    vis: &VisParams,
    bbox: &BBox,
) -> Result<(Vec<u8>, usize, usize)> {
    let clipped = clip_to_bbox(raster, bbox)?;
    let (rows, cols) = clipped.shape();
    Ok((render_rgba(&clipped, vis)?, rows, cols))
}

/// Crop to the cells whose centres fall inside `bbox`
pub fn clip_to_bbox(raster: &MaskedRaster, bbox: &BBox) -> Result<MaskedRaster> {
    raster.clip(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdure_core::{GeoTransform, PixelMask, Raster};

    fn ramp() -> MaskedRaster {
        let mut values = Raster::from_vec(vec![0.0, 0.4, 0.8, 0.9], 2, 2).unwrap();
        values.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        let mask = PixelMask::from_fn(2, 2, |r, c| !(r == 1 && c == 1));
        MaskedRaster::new(values, mask).unwrap()
    }

    #[test]
    fn default_vis_params() {
        let vis = VisParams::default();
        assert_eq!(vis.min, 0.0);
        assert_eq!(vis.max, 0.8);
        assert_eq!(vis.palette.len(), 16);
        assert_eq!(vis.palette[0], "FFFFFF");
        assert_eq!(vis.palette[15], "011301");
        vis.validate().unwrap();
    }

    #[test]
    fn invalid_samples_are_transparent() {
        let rgba = render_rgba(&ramp(), &VisParams::default()).unwrap();
        assert_eq!(rgba.len(), 16);

        // 0.0 -> first colour, opaque
        assert_eq!(&rgba[0..4], &[255, 255, 255, 255]);
        // 0.8 -> last colour
        assert_eq!(&rgba[8..12], &[1, 19, 1, 255]);
        // masked sample
        assert_eq!(&rgba[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn values_above_max_clamp() {
        let values = Raster::from_vec(vec![5.0], 1, 1).unwrap();
        let rgba = render_rgba(&MaskedRaster::from_values(values), &VisParams::default()).unwrap();
        assert_eq!(&rgba[..], &[1, 19, 1, 255]);
    }

    #[test]
    fn stretched_range() {
        let vis = VisParams::stretched(&ramp(), &Palette::ndvi());
        // 0.9 is masked out
        assert_eq!(vis.min, 0.0);
        assert_eq!(vis.max, 0.8);

        let empty = MaskedRaster::invalid(2, 2);
        let vis = VisParams::stretched(&empty, &Palette::ndvi());
        assert_eq!((vis.min, vis.max), (0.0, 1.0));
    }

    #[test]
    fn rejects_bad_params() {
        let mut vis = VisParams::default();
        vis.max = vis.min;
        assert!(vis.validate().is_err());

        let vis = VisParams {
            palette: vec!["nothex".into()],
            ..VisParams::default()
        };
        assert!(render_rgba(&ramp(), &vis).is_err());
    }

    #[test]
    fn clipped_render_covers_bbox_only() {
        let (rgba, rows, cols) =
            render_rgba_clipped(&ramp(), &VisParams::default(), &BBox::new(0.0, 1.0, 1.0, 2.0)).unwrap();
        assert_eq!((rows, cols), (1, 1));
        assert_eq!(&rgba[..], &[255, 255, 255, 255]);
    }

    #[test]
    fn vis_params_from_json() {
        let vis: VisParams = serde_json::from_str(r#"{"min": -1.0, "palette": ["000000", "FFFFFF"]}"#).unwrap();
        assert_eq!(vis.min, -1.0);
        assert_eq!(vis.max, 0.8);
        assert_eq!(vis.palette().unwrap().len(), 2);
    }
}
