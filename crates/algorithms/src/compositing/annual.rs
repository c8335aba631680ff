//! Annual mean aggregation of monthly composites

use super::monthly::MonthlyComposite;
use crate::maybe_rayon::*;
use crate::resample::{resample, ResampleParams};
use serde::{Deserialize, Serialize};
use verdure_core::image::RasterImage;
use verdure_core::raster::{MaskedRaster, MaskedStatistics};
use verdure_core::{Algorithm, Error, Result};

/// Parameters for annual aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateParams {
    /// Name of the output band
    pub band: String,
    /// Target grid; `None` keeps the composites' grid
    pub resample: Option<ResampleParams>,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            band: "NDVI".to_string(),
            resample: Some(ResampleParams::default()),
        }
    }
}

/// The pipeline's terminal product: one single-band image
#[derive(Debug, Clone)]
pub struct AnnualRaster {
    image: RasterImage,
}

impl AnnualRaster {
    pub fn new(image: RasterImage) -> Result<Self> {
        if image.band_count() != 1 {
            return Err(Error::InvalidParameter {
                name: "image",
                value: image.band_count().to_string(),
                reason: "an annual raster holds exactly one band".into(),
            });
        }
        Ok(Self { image })
    }

    pub fn image(&self) -> &RasterImage {
        &self.image
    }

    pub fn data(&self) -> &MaskedRaster {
        self.image.bands()[0].data()
    }

    pub fn band_name(&self) -> &str {
        self.image.bands()[0].name()
    }

    pub fn statistics(&self) -> MaskedStatistics {
        self.data().statistics()
    }

    pub fn into_image(self) -> RasterImage {
        self.image
    }
}

/// Per-pixel mean over the valid samples of `layers`. A pixel with no valid
/// sample is invalid. Samples are summed in layer order.
pub fn mean_composite(layers: &[&MaskedRaster]) -> Result<MaskedRaster> {
    let first = layers
        .first()
        .ok_or_else(|| Error::EmptyCollection("no layers to average".into()))?;
    let (rows, cols) = first.shape();
    if let Some(bad) = layers.iter().find(|l| l.shape() != (rows, cols)) {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: bad.rows(),
            ac: bad.cols(),
        });
    }

    let samples: Vec<Option<f64>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![None; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let mut sum = 0.0;
                let mut n = 0usize;
                for layer in layers {
                    if let Some(v) = layer.get(row, col) {
                        sum += v;
                        n += 1;
                    }
                }
                if n > 0 {
                    *out = Some(sum / n as f64);
                }
            }
            row_data
        })
        .collect();

    MaskedRaster::from_options(first.values(), samples)
}

/// Mean of the monthly composites on their own grid
pub fn annual_mean(composites: &[MonthlyComposite]) -> Result<MaskedRaster> {
    let layers: Vec<&MaskedRaster> = composites.iter().map(MonthlyComposite::data).collect();
    mean_composite(&layers)
}

/// Mean of the composites, then resampled onto the target grid
///
/// # Errors
/// `Reprojection` when the target CRS or scale is invalid.
pub fn aggregate(composites: &[MonthlyComposite], params: &AggregateParams) -> Result<AnnualRaster> {
    let mean = annual_mean(composites)?;
    let data = match &params.resample {
        Some(target) => resample(&mean, target)?,
        None => mean,
    };
    let timestamp = composites
        .first()
        .map(|c| c.window().start)
        .ok_or_else(|| Error::EmptyCollection("no composites".into()))?;
    let image = RasterImage::new(format!("{}_annual_mean", params.band), timestamp)
        .with_band(params.band.clone(), data)?;
    AnnualRaster::new(image)
}

/// Annual aggregation algorithm
#[derive(Debug, Clone, Default)]
pub struct AnnualAggregator;

impl Algorithm for AnnualAggregator {
    type Input = Vec<MonthlyComposite>;
    type Output = AnnualRaster;
    type Params = AggregateParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "AnnualAggregator"
    }

    fn description(&self) -> &'static str {
        "Per-pixel mean of monthly composites, resampled to a target grid"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        aggregate(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use verdure_core::raster::{GeoTransform, PixelMask, Raster};
    use verdure_core::time::month_windows;
    use verdure_core::CRS;

    fn layer(values: Vec<f64>, valid: Vec<bool>) -> MaskedRaster {
        let n = values.len();
        let mut r = Raster::from_vec(values, 1, n).unwrap();
        r.set_transform(GeoTransform::new(48.2, 31.0, 0.0001, -0.0001));
        r.set_crs(Some(CRS::wgs84()));
        MaskedRaster::new(r, PixelMask::from_fn(1, n, |_, c| valid[c])).unwrap()
    }

    fn year_of(pixel: impl Fn(usize) -> Option<f64>) -> Vec<MonthlyComposite> {
        month_windows(2024, 1, 12)
            .unwrap()
            .into_iter()
            .map(|w| {
                let v = pixel(w.index);
                let data = layer(vec![v.unwrap_or(0.0)], vec![v.is_some()]);
                MonthlyComposite::new(w, usize::from(v.is_some()), "NDVI", data).unwrap()
            })
            .collect()
    }

    #[test]
    fn mean_skips_invalid() {
        let a = layer(vec![0.2, 0.4, 0.0], vec![true, true, false]);
        let b = layer(vec![0.6, 0.0, 0.0], vec![true, false, false]);
        let m = mean_composite(&[&a, &b]).unwrap();
        assert_relative_eq!(m.get(0, 0).unwrap(), 0.4, epsilon = 1e-12);
        assert_eq!(m.get(0, 1), Some(0.4));
        assert_eq!(m.get(0, 2), None);
    }

    #[test]
    fn two_valid_months_average() {
        let composites = year_of(|m| match m {
            1 => Some(0.2),
            2 => Some(0.8),
            _ => None,
        });
        let mean = annual_mean(&composites).unwrap();
        assert_relative_eq!(mean.get(0, 0).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn all_months_empty_is_nodata() {
        let composites = year_of(|_| None);
        let out = AnnualAggregator
            .execute(composites, AggregateParams { resample: None, ..Default::default() })
            .unwrap();
        assert_eq!(out.data().valid_count(), 0);
        assert_eq!(out.band_name(), "NDVI");
    }

    #[test]
    fn aggregate_resamples_and_stamps() {
        let composites = year_of(|m| Some(m as f64 / 100.0));
        let annual = aggregate(&composites, &AggregateParams::default()).unwrap();
        assert_eq!(annual.image().timestamp(), composites[0].window().start);
        assert_eq!(annual.data().crs().and_then(CRS::epsg), Some(4326));
        let stats = annual.statistics();
        assert!(stats.valid_count > 0);
        assert_relative_eq!(stats.mean.unwrap(), 0.065, epsilon = 1e-9);
    }

    #[test]
    fn bad_target_is_fatal() {
        let composites = year_of(|_| Some(0.3));
        let params = AggregateParams {
            resample: Some(ResampleParams {
                target_epsg: 27700,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(aggregate(&composites, &params), Err(Error::Reprojection(_))));
    }

    #[test]
    fn empty_input_is_error() {
        assert!(aggregate(&[], &AggregateParams::default()).is_err());
    }
}
