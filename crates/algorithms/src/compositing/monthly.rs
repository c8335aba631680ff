//! Monthly maximum-value compositing

use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use verdure_core::image::{ImageCollection, RasterImage};
use verdure_core::raster::MaskedRaster;
use verdure_core::time::{month_windows, MonthWindow};
use verdure_core::{Algorithm, Error, Result};

/// Parameters for monthly compositing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeParams {
    /// Calendar year of the first window
    pub year: i32,
    /// Month (1-12) of the first window
    pub start_month: u32,
    /// Number of consecutive windows
    pub month_count: usize,
    /// Band reduced by the mosaic
    pub band: String,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            year: 2024,
            start_month: 1,
            month_count: 12,
            band: "NDVI".to_string(),
        }
    }
}

/// One month's composite: a single-band image stamped with the window start
#[derive(Debug, Clone)]
pub struct MonthlyComposite {
    window: MonthWindow,
    source_count: usize,
    image: RasterImage,
}

impl MonthlyComposite {
    pub fn new(window: MonthWindow, source_count: usize, band: impl Into<String>, data: MaskedRaster) -> Result<Self> {
        let image = RasterImage::new(window.label(), window.start).with_band(band, data)?;
        Ok(Self {
            window,
            source_count,
            image,
        })
    }

    pub fn window(&self) -> &MonthWindow {
        &self.window
    }

    /// Number of images that fell in the window
    pub fn source_count(&self) -> usize {
        self.source_count
    }

    pub fn image(&self) -> &RasterImage {
        &self.image
    }

    /// The composite band
    pub fn data(&self) -> &MaskedRaster {
        // Constructed with exactly one band
        self.image.bands()[0].data()
    }

    pub fn band_name(&self) -> &str {
        self.image.bands()[0].name()
    }

    /// Whether every pixel is no-data
    pub fn is_empty(&self) -> bool {
        self.data().mask().is_all_invalid()
    }

    pub fn into_image(self) -> RasterImage {
        self.image
    }

    pub fn into_data(self) -> MaskedRaster {
        let (rows, cols) = self.data().shape();
        self.image
            .into_bands()
            .into_iter()
            .next()
            .map(|b| b.into_data())
            .unwrap_or_else(|| MaskedRaster::invalid(rows, cols))
    }
}

/// Per-pixel maximum over `layers`, ignoring invalid samples.
///
/// `layers` are expected in acquisition order; on ties the earliest layer
/// wins. A pixel with no valid sample in any layer is invalid. With no
/// layers at all the result is an all-invalid raster on `template`'s grid.
pub fn quality_mosaic(layers: &[&MaskedRaster], template: &MaskedRaster) -> Result<MaskedRaster> {
    let (rows, cols) = template.shape();
    if let Some(bad) = layers.iter().find(|l| l.shape() != (rows, cols)) {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: bad.rows(),
            ac: bad.cols(),
        });
    }
    if layers.is_empty() {
        return Ok(MaskedRaster::invalid_like(template.values()));
    }

    let samples: Vec<Option<f64>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data: Vec<Option<f64>> = vec![None; cols];
            for (col, best) in row_data.iter_mut().enumerate() {
                for layer in layers {
                    if let Some(v) = layer.get(row, col) {
                        if best.map_or(true, |b| v > b) {
                            *best = Some(v);
                        }
                    }
                }
            }
            row_data
        })
        .collect();

    MaskedRaster::from_options(template.values(), samples)
}

/// Composite one window from the images it selects.
///
/// Images are filtered to `window`, ordered by time and reduced with
/// [`quality_mosaic`] over `band`.
pub fn composite_window(
    images: &ImageCollection,
    window: &MonthWindow,
    band: &str,
    template: &MaskedRaster,
) -> Result<MonthlyComposite> {
    let selected = images.filter_window(window).sorted_by_time();
    let layers = selected
        .iter()
        .map(|img| img.require_band(band))
        .collect::<Result<Vec<_>>>()?;
    let data = quality_mosaic(&layers, template)?;

    if selected.is_empty() {
        tracing::debug!(month = %window.label(), "no images in window");
    }
    MonthlyComposite::new(*window, selected.len(), band, data)
}

/// Composite every window, in window order.
///
/// The grid comes from the earliest image; images on another grid are an
/// error. Windows are processed in parallel.
pub fn composite_months(images: &ImageCollection, params: &CompositeParams) -> Result<Vec<MonthlyComposite>> {
    let windows = month_windows(params.year, params.start_month, params.month_count)?;
    let ordered = images.sorted_by_time();
    let reference = ordered
        .iter()
        .next()
        .ok_or_else(|| Error::EmptyCollection("no images to composite".into()))?;
    let template = reference.require_band(&params.band)?;

    for img in ordered.iter() {
        let band = img.require_band(&params.band)?;
        if let Some(reason) = template.values().grid_mismatch(band.values()) {
            return Err(Error::GridMismatch {
                image: img.id().to_string(),
                band: params.band.clone(),
                reason,
            });
        }
    }

    windows
        .par_iter()
        .map(|window| composite_window(&ordered, window, &params.band, template))
        .collect()
}

/// Monthly compositing algorithm
#[derive(Debug, Clone, Default)]
pub struct MonthlyCompositor;

impl Algorithm for MonthlyCompositor {
    type Input = ImageCollection;
    type Output = Vec<MonthlyComposite>;
    type Params = CompositeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "MonthlyCompositor"
    }

    fn description(&self) -> &'static str {
        "Per-pixel maximum of an index band within calendar month windows"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        composite_months(&input, &params)
    }
}
