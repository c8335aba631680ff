//! Resampling of masked rasters onto a target CRS and ground resolution
//!
//! The destination grid is north-up with square pixels of the requested
//! scale (metres; converted to degrees for a geographic target) and covers
//! the envelope of the source footprint. Each destination pixel centre is
//! mapped back into the source grid and sampled:
//! - **Nearest**: the containing source pixel
//! - **Bilinear**: the four surrounding source pixel centres; no-data if any
//!   of them is no-data

use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use verdure_core::bbox::BBox;
use verdure_core::crs::{Projection, CRS, METERS_PER_DEGREE};
use verdure_core::raster::{GeoTransform, MaskedRaster, Raster};
use verdure_core::{Error, Result};

/// Samples taken along each footprint edge when computing the destination
/// envelope
const EDGE_SAMPLES: usize = 21;

/// Resampling kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    #[default]
    Nearest,
    Bilinear,
}

impl std::str::FromStr for ResampleMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(ResampleMethod::Nearest),
            "bilinear" => Ok(ResampleMethod::Bilinear),
            other => Err(Error::InvalidParameter {
                name: "resampling",
                value: other.to_string(),
                reason: "expected 'nearest' or 'bilinear'".into(),
            }),
        }
    }
}

/// Parameters for resampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleParams {
    /// EPSG code of the destination CRS
    pub target_epsg: u32,
    /// Ground sample distance in metres per pixel
    pub scale: f64,
    pub method: ResampleMethod,
    /// Upper bound on destination pixels
    pub max_pixels: u64,
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self {
            target_epsg: 4326,
            scale: 10.0,
            method: ResampleMethod::Nearest,
            max_pixels: 1_000_000_000,
        }
    }
}

fn reprojection_error(msg: impl Into<String>) -> Error {
    Error::Reprojection(msg.into())
}

fn projections(src: &MaskedRaster, params: &ResampleParams) -> Result<(Projection, Projection)> {
    let src_crs = src
        .crs()
        .ok_or_else(|| reprojection_error("source raster has no CRS"))?;
    let src_proj = Projection::from_crs(src_crs).map_err(|e| reprojection_error(e.to_string()))?;
    let dst_proj = Projection::from_epsg(params.target_epsg)
        .ok_or_else(|| reprojection_error(format!("unsupported target CRS EPSG:{}", params.target_epsg)))?;
    Ok((src_proj, dst_proj))
}

fn pixel_size(params: &ResampleParams, dst_proj: &Projection) -> Result<f64> {
    if !params.scale.is_finite() || params.scale <= 0.0 {
        return Err(reprojection_error(format!(
            "scale must be a positive number of metres, got {}",
            params.scale
        )));
    }
    Ok(if dst_proj.is_geographic() {
        params.scale / METERS_PER_DEGREE
    } else {
        params.scale
    })
}

/// North-up grid of `pixel`-sized cells covering `envelope`
fn envelope_grid(envelope: &BBox, pixel: f64, max_pixels: u64) -> Result<(GeoTransform, usize, usize)> {
    let cols = ((envelope.width() / pixel) - 1e-6).ceil().max(1.0);
    let rows = ((envelope.height() / pixel) - 1e-6).ceil().max(1.0);
    if !cols.is_finite() || !rows.is_finite() || cols * rows > max_pixels as f64 {
        return Err(reprojection_error(format!(
            "target grid of {cols} x {rows} pixels exceeds the limit of {max_pixels}"
        )));
    }
    let transform = GeoTransform::new(envelope.min_x, envelope.max_y, pixel, -pixel);
    Ok((transform, rows as usize, cols as usize))
}

/// Destination grid for `src` under `params`: transform, rows, cols
pub fn target_grid(src: &MaskedRaster, params: &ResampleParams) -> Result<(GeoTransform, usize, usize)> {
    let (src_proj, dst_proj) = projections(src, params)?;
    let pixel = pixel_size(params, &dst_proj)?;

    let footprint = BBox::from_bounds(src.values().bounds());
    let envelope = footprint
        .reproject(&src_proj, &dst_proj, EDGE_SAMPLES)
        .ok_or_else(|| reprojection_error("source footprint is outside the target projection's domain"))?;
    envelope_grid(&envelope, pixel, params.max_pixels)
}

/// An all no-data raster covering a WGS84 `aoi` on the grid `params`
/// describes
pub fn aoi_grid(aoi: &BBox, params: &ResampleParams) -> Result<MaskedRaster> {
    aoi.validate()?;
    let geographic = Projection::from_epsg(4326).ok_or_else(|| reprojection_error("EPSG:4326 unavailable"))?;
    let dst_proj = Projection::from_epsg(params.target_epsg)
        .ok_or_else(|| reprojection_error(format!("unsupported target CRS EPSG:{}", params.target_epsg)))?;
    let pixel = pixel_size(params, &dst_proj)?;
    let envelope = aoi
        .reproject(&geographic, &dst_proj, EDGE_SAMPLES)
        .ok_or_else(|| reprojection_error("AOI is outside the target projection's domain"))?;
    let (transform, rows, cols) = envelope_grid(&envelope, pixel, params.max_pixels)?;

    let mut template: Raster<f64> = Raster::new(rows, cols);
    template.set_transform(transform);
    template.set_crs(Some(CRS::from_epsg(params.target_epsg)));
    Ok(MaskedRaster::invalid_like(&template))
}

/// Sample `src` at every pixel centre of a `rows` x `cols` grid in `dst_proj`
fn sample_onto(
    src: &MaskedRaster,
    src_proj: &Projection,
    dst_proj: &Projection,
    transform: &GeoTransform,
    (rows, cols): (usize, usize),
    method: ResampleMethod,
) -> Vec<Option<f64>> {
    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![None; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let (x, y) = transform.pixel_to_geo(col, row);
                let Some((sx, sy)) = dst_proj.transform_to(src_proj, x, y) else {
                    continue;
                };
                let (fc, fr) = src.transform().geo_to_pixel(sx, sy);
                *out = match method {
                    ResampleMethod::Nearest => sample_nearest(src, fc, fr),
                    ResampleMethod::Bilinear => sample_bilinear(src, fc, fr),
                };
            }
            row_data
        })
        .collect()
}

/// Resample `src` onto the grid described by `params`
///
/// # Errors
/// `Reprojection` when the source has no CRS, either CRS is unsupported,
/// the scale is not a positive number or the grid exceeds `max_pixels`.
pub fn resample(src: &MaskedRaster, params: &ResampleParams) -> Result<MaskedRaster> {
    let (transform, rows, cols) = target_grid(src, params)?;
    let (src_proj, dst_proj) = projections(src, params)?;
    let samples = sample_onto(src, &src_proj, &dst_proj, &transform, (rows, cols), params.method);

    let mut template: Raster<f64> = Raster::new(rows, cols);
    template.set_transform(transform);
    template.set_crs(Some(CRS::from_epsg(params.target_epsg)));
    let out = MaskedRaster::from_options(&template, samples)?;

    tracing::debug!(
        src_rows = src.rows(),
        src_cols = src.cols(),
        rows,
        cols,
        epsg = params.target_epsg,
        method = ?params.method,
        "resampled raster"
    );
    Ok(out)
}

/// Resample `src` onto the exact grid of `template` (shape, transform, CRS)
///
/// # Errors
/// `Reprojection` when either raster has no CRS or a CRS is unsupported.
pub fn resample_to_grid(src: &MaskedRaster, template: &MaskedRaster, method: ResampleMethod) -> Result<MaskedRaster> {
    let proj = |raster: &MaskedRaster, what: &str| {
        let crs = raster
            .crs()
            .ok_or_else(|| reprojection_error(format!("{what} raster has no CRS")))?;
        Projection::from_crs(crs).map_err(|e| reprojection_error(e.to_string()))
    };
    let src_proj = proj(src, "source")?;
    let dst_proj = proj(template, "template")?;
    let samples = sample_onto(src, &src_proj, &dst_proj, template.transform(), template.shape(), method);
    MaskedRaster::from_options(template.values(), samples)
}

fn inside(src: &MaskedRaster, fc: f64, fr: f64) -> bool {
    fc >= 0.0 && fr >= 0.0 && fc < src.cols() as f64 && fr < src.rows() as f64
}

#[inline]
fn sample_nearest(src: &MaskedRaster, fc: f64, fr: f64) -> Option<f64> {
    if !inside(src, fc, fr) {
        return None;
    }
    src.get(fr.floor() as usize, fc.floor() as usize)
}

#[inline]
fn sample_bilinear(src: &MaskedRaster, fc: f64, fr: f64) -> Option<f64> {
    if !inside(src, fc, fr) {
        return None;
    }
    let max_c = src.cols() - 1;
    let max_r = src.rows() - 1;

    // Pixel centres sit at half-integer positions
    let u = (fc - 0.5).max(0.0);
    let v = (fr - 0.5).max(0.0);
    let c0 = (u.floor() as usize).min(max_c);
    let r0 = (v.floor() as usize).min(max_r);
    let c1 = (c0 + 1).min(max_c);
    let r1 = (r0 + 1).min(max_r);
    let tx = (u - c0 as f64).clamp(0.0, 1.0);
    let ty = (v - r0 as f64).clamp(0.0, 1.0);

    let v00 = src.get(r0, c0)?;
    let v01 = src.get(r0, c1)?;
    let v10 = src.get(r1, c0)?;
    let v11 = src.get(r1, c1)?;

    let top = v00 + (v01 - v00) * tx;
    let bottom = v10 + (v11 - v10) * tx;
    Some(top + (bottom - top) * ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use verdure_core::raster::PixelMask;

    /// 4x4 geographic raster with pixels exactly one target pixel wide
    fn geographic(values: Vec<f64>, valid: impl Fn(usize, usize) -> bool) -> MaskedRaster {
        let px = 10.0 / METERS_PER_DEGREE;
        let mut r = Raster::from_vec(values, 4, 4).unwrap();
        r.set_transform(GeoTransform::new(48.2, 31.0, px, -px));
        r.set_crs(Some(CRS::wgs84()));
        MaskedRaster::new(r, PixelMask::from_fn(4, 4, valid)).unwrap()
    }

    #[test]
    fn same_grid_nearest_is_identity() {
        let src = geographic((0..16).map(|v| v as f64 / 16.0).collect(), |r, c| r != c);
        let out = resample(&src, &ResampleParams::default()).unwrap();
        assert_eq!(out.shape(), (4, 4));
        for r in 0..4 {
            for c in 0..4 {
                assert_eq!(out.get(r, c), src.get(r, c), "({r}, {c})");
            }
        }
        assert_eq!(out.crs().and_then(CRS::epsg), Some(4326));
    }

    #[test]
    fn coarser_scale_shrinks_grid() {
        let src = geographic(vec![0.5; 16], |_, _| true);
        let params = ResampleParams {
            scale: 20.0,
            ..Default::default()
        };
        let out = resample(&src, &params).unwrap();
        assert_eq!(out.shape(), (2, 2));
        assert_eq!(out.valid_count(), 4);
    }

    #[test]
    fn bilinear_interpolates_and_propagates_nodata() {
        let values: Vec<f64> = (0..16).map(|i| (i % 4) as f64).collect();
        let src = geographic(values, |r, c| !(r == 3 && c == 3));
        let params = ResampleParams {
            scale: 5.0,
            method: ResampleMethod::Bilinear,
            ..Default::default()
        };
        let out = resample(&src, &params).unwrap();
        assert_eq!(out.shape(), (8, 8));
        // Destination (0, 3) sits a quarter pixel right of source column 1 centre
        assert_relative_eq!(out.get(0, 3).unwrap(), 1.25, epsilon = 1e-6);
        // Corner next to the masked source pixel
        assert_eq!(out.get(7, 7), None);
        assert_eq!(out.get(6, 6), None);
        assert!(out.get(4, 4).is_some());
    }

    #[test]
    fn utm_target_grid() {
        let src = geographic(vec![0.3; 16], |_, _| true);
        let params = ResampleParams {
            target_epsg: 32639,
            ..Default::default()
        };
        let out = resample(&src, &params).unwrap();
        // A 40 m square in degrees is slightly narrower than 40 m east-west at 31N
        assert!(out.rows() >= 4 && out.rows() <= 6, "rows {}", out.rows());
        assert!(out.cols() >= 3 && out.cols() <= 6, "cols {}", out.cols());
        assert_eq!(out.crs().and_then(CRS::epsg), Some(32639));
        assert!(out.valid_count() > 0);
        assert_eq!(out.transform().pixel_width, 10.0);
    }

    #[test]
    fn invalid_requests_are_reprojection_errors() {
        let src = geographic(vec![0.3; 16], |_, _| true);
        for params in [
            ResampleParams { scale: 0.0, ..Default::default() },
            ResampleParams { scale: f64::NAN, ..Default::default() },
            ResampleParams { target_epsg: 2154, ..Default::default() },
            ResampleParams { max_pixels: 4, scale: 1.0, ..Default::default() },
        ] {
            assert!(matches!(resample(&src, &params), Err(Error::Reprojection(_))), "{params:?}");
        }

        let mut no_crs = src.clone();
        no_crs.set_crs(None);
        assert!(matches!(
            resample(&no_crs, &ResampleParams::default()),
            Err(Error::Reprojection(_))
        ));
    }

    #[test]
    fn onto_grid_shifted_by_one_pixel() {
        let src = geographic((0..16).map(|v| v as f64).collect(), |_, _| true);
        let px = 10.0 / METERS_PER_DEGREE;
        let mut grid = Raster::<f64>::new(4, 4);
        grid.set_transform(GeoTransform::new(48.2 - px, 31.0, px, -px));
        grid.set_crs(Some(CRS::wgs84()));
        let template = MaskedRaster::invalid_like(&grid);

        let out = resample_to_grid(&src, &template, ResampleMethod::Nearest).unwrap();
        assert_eq!(out.transform(), template.transform());
        assert_eq!(out.get(1, 0), None);
        assert_eq!(out.get(1, 1), src.get(1, 0));
        assert_eq!(out.get(2, 3), src.get(2, 2));
        assert_eq!(out.valid_count(), 12);

        let mut no_crs = src.clone();
        no_crs.set_crs(None);
        assert!(matches!(
            resample_to_grid(&no_crs, &template, ResampleMethod::Nearest),
            Err(Error::Reprojection(_))
        ));
    }

    #[test]
    fn aoi_grid_is_empty_at_target_scale() {
        let px = 10.0 / METERS_PER_DEGREE;
        let aoi = BBox::new(48.2, 30.99, 48.2 + 8.0 * px, 30.99 + 5.0 * px);
        let out = aoi_grid(&aoi, &ResampleParams::default()).unwrap();
        assert_eq!(out.shape(), (5, 8));
        assert_eq!(out.valid_count(), 0);
        assert_eq!(out.crs().and_then(CRS::epsg), Some(4326));
        assert_relative_eq!(out.transform().origin_x, 48.2, epsilon = 1e-9);

        let utm = aoi_grid(&aoi, &ResampleParams { target_epsg: 32639, ..Default::default() }).unwrap();
        assert_eq!(utm.transform().pixel_width, 10.0);
        assert_eq!(utm.valid_count(), 0);
    }

    #[test]
    fn method_names() {
        assert_eq!("Bilinear".parse::<ResampleMethod>().unwrap(), ResampleMethod::Bilinear);
        assert!("cubic".parse::<ResampleMethod>().is_err());
    }
}
