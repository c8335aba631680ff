//! Orchestration: source → mask → index → monthly mosaic → annual mean → resample

use super::config::PipelineConfig;
use super::report::{MonthReport, MonthStatus, PipelineReport, Stage, StageFailure};
use crate::compositing::{annual_mean, composite_months, AnnualRaster, CompositeParams, MonthlyComposite};
use crate::imagery::index_band;
use crate::masking::{mask_with_strategy, select_strategy, MaskStrategy};
use crate::maybe_rayon::*;
use crate::resample::{aoi_grid, resample, resample_to_grid, ResampleMethod};
use std::sync::Arc;
use std::time::Instant;
use verdure_core::image::{ImageCollection, ImageSource, RasterImage};
use verdure_core::raster::MaskedRaster;
use verdure_core::time::{month_windows, MonthWindow};
use verdure_core::{Error, Result};
use verdure_parallel::{ParallelStrategy, Tile, TiledProcessor};

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub annual: AnnualRaster,
    /// One composite per window, in window order, on the reference grid
    /// (the AOI grid when no image is usable)
    pub composites: Vec<MonthlyComposite>,
    pub report: PipelineReport,
}

/// An image that passed the up-front checks, with the strategy chosen for it
struct Prepared {
    image: Arc<RasterImage>,
    strategy: MaskStrategy,
}

/// Per-tile products: one block per month window plus the annual mean block
struct TileOutput {
    months: Vec<MaskedRaster>,
    annual: MaskedRaster,
}

/// Query `source` with the configured AOI and dates, then run the pipeline
pub fn run<S: ImageSource + ?Sized>(source: &S, config: &PipelineConfig) -> Result<PipelineOutput> {
    config.validate()?;
    let collection = source.query(&config.aoi, config.start()?, config.end()?)?;
    tracing::info!(images = collection.len(), "queried image source");
    run_collection(&collection, config)
}

/// Run the pipeline on an already-queried collection.
///
/// Images that fail their checks are dropped and recorded in the report;
/// tiles that fail are left as no-data. A collection with no usable image
/// yields all no-data outputs on the AOI grid. Only an invalid config or a
/// failed resampling abort the run.
///
/// Every stage, including the per-row kernels, runs on the threads of
/// `config.processing`.
pub fn run_collection(collection: &ImageCollection, config: &PipelineConfig) -> Result<PipelineOutput> {
    config.validate()?;
    config.processing.install(|| run_validated(collection, config))
}

fn run_validated(collection: &ImageCollection, config: &PipelineConfig) -> Result<PipelineOutput> {
    let run_start = Instant::now();
    let mut report = PipelineReport {
        images_in: collection.len(),
        ..Default::default()
    };

    let ordered = collection.sorted_by_time();
    let template = reference_grid(&ordered);
    let prepared = prepare_all(&ordered, template.as_ref(), config, &mut report);
    let template = match template {
        Some(template) if !prepared.is_empty() => template,
        _ => return empty_output(collection.len(), config, report),
    };
    report.images_used = prepared.len();

    let params = config.composite_params()?;
    let windows = month_windows(params.year, params.start_month, params.month_count)?;
    let processor = match config.tile_size {
        Some(size) => TiledProcessor::new(size, config.processing),
        None => TiledProcessor::whole_grid(config.processing),
    };

    let stage_start = Instant::now();
    let (rows, cols) = template.shape();
    let results = processor.map(rows, cols, |tile| process_tile(&prepared, tile, config, &params));
    report.tiles = results.len();
    let (blocks, failed) = TiledProcessor::split_results(results);
    for (tile, e) in failed {
        report.record(StageFailure {
            stage: Stage::Tile,
            image: None,
            tile: Some(tile.index),
            message: e.to_string(),
        });
    }
    tracing::info!(
        tiles = report.tiles,
        images = prepared.len(),
        elapsed_ms = stage_start.elapsed().as_millis() as u64,
        "composited tiles"
    );

    let used: ImageCollection = prepared.iter().map(|p| Arc::clone(&p.image)).collect();
    let mut composites = Vec::with_capacity(windows.len());
    for (m, window) in windows.iter().enumerate() {
        let data = TiledProcessor::reassemble(&template, blocks.iter().map(|(t, out)| (t, &out.months[m])))?;
        let composite = MonthlyComposite::new(*window, used.filter_window(window).len(), &params.band, data)?;
        let month = MonthReport::new(window, composite.source_count(), composite.data().valid_count(), rows * cols);
        log_month(&month);
        report.months.push(month);
        composites.push(composite);
    }

    let mean = TiledProcessor::reassemble(&template, blocks.iter().map(|(t, out)| (t, &out.annual)))?;
    report.set_annual(&mean.statistics());

    let stage_start = Instant::now();
    let resampled = resample(&mean, &config.resample_params())?;
    tracing::info!(
        rows = resampled.rows(),
        cols = resampled.cols(),
        epsg = config.crs,
        elapsed_ms = stage_start.elapsed().as_millis() as u64,
        "resampled annual mean"
    );

    let annual = annual_raster(&windows, &params.band, resampled)?;
    tracing::info!(
        used = report.images_used,
        dropped = report.dropped_images().count(),
        empty_months = report.months_with(MonthStatus::Empty).count(),
        elapsed_ms = run_start.elapsed().as_millis() as u64,
        "pipeline finished"
    );

    Ok(PipelineOutput {
        annual,
        composites,
        report,
    })
}

/// The grid shared by the most images, ties going to the earliest; images
/// on any other grid are resampled onto it
fn reference_grid(ordered: &ImageCollection) -> Option<MaskedRaster> {
    let mut grids: Vec<(&MaskedRaster, usize)> = Vec::new();
    for grid in ordered.iter().filter_map(|img| img.grid()) {
        match grids
            .iter_mut()
            .find(|(g, _)| g.values().grid_mismatch(grid.values()).is_none())
        {
            Some((_, count)) => *count += 1,
            None => grids.push((grid, 1)),
        }
    }
    let mut best: Option<(&MaskedRaster, usize)> = None;
    for (grid, count) in grids {
        match best {
            Some((_, n)) if n >= count => {}
            _ => best = Some((grid, count)),
        }
    }
    best.map(|(grid, _)| MaskedRaster::invalid_like(grid.values()))
}

/// No image survived: every output is no-data on the AOI at the target grid
fn empty_output(images_in: usize, config: &PipelineConfig, mut report: PipelineReport) -> Result<PipelineOutput> {
    let params = config.composite_params()?;
    let windows = month_windows(params.year, params.start_month, params.month_count)?;
    let grid = aoi_grid(&config.aoi, &config.resample_params())?;
    let (rows, cols) = grid.shape();

    report.record(StageFailure {
        stage: Stage::Collection,
        image: None,
        tile: None,
        message: format!("none of the {images_in} images is usable; outputs are no-data"),
    });
    tracing::warn!(images = images_in, rows, cols, "no usable image, writing empty outputs");

    let mut composites = Vec::with_capacity(windows.len());
    for window in &windows {
        let month = MonthReport::new(window, 0, 0, rows * cols);
        log_month(&month);
        report.months.push(month);
        composites.push(MonthlyComposite::new(*window, 0, &params.band, grid.clone())?);
    }
    report.set_annual(&grid.statistics());
    let annual = annual_raster(&windows, &params.band, grid)?;
    Ok(PipelineOutput {
        annual,
        composites,
        report,
    })
}

fn prepare_all(
    ordered: &ImageCollection,
    template: Option<&MaskedRaster>,
    config: &PipelineConfig,
    report: &mut PipelineReport,
) -> Vec<Prepared> {
    let checks = config
        .processing
        .par_map_slice(ordered.images(), |img| prepare(img, template, config));

    let mut prepared = Vec::with_capacity(checks.len());
    for (image, check) in ordered.images().iter().zip(checks) {
        match check {
            Ok(accepted) => {
                tracing::debug!(image = image.id(), strategy = accepted.strategy.label(), "image accepted");
                prepared.push(accepted);
            }
            Err((stage, e)) => {
                tracing::warn!(image = image.id(), stage = %stage, error = %e, "dropping image");
                report.record(StageFailure {
                    stage,
                    image: Some(image.id().to_string()),
                    tile: None,
                    message: e.to_string(),
                });
            }
        }
    }
    prepared
}

/// Band checks for one image, which is brought onto the reference grid
/// if needed; picks its masking strategy
fn prepare(
    image: &Arc<RasterImage>,
    template: Option<&MaskedRaster>,
    config: &PipelineConfig,
) -> std::result::Result<Prepared, (Stage, Error)> {
    let no_bands = || (Stage::Grid, Error::Other(format!("image '{}' has no bands", image.id())));
    let grid = image.grid().ok_or_else(no_bands)?;
    let template = template.ok_or_else(no_bands)?;

    let strategy = select_strategy(image, &config.masking);
    if !image.has_band(strategy.band_name()) {
        return Err((Stage::Mask, Error::missing_band(image.id(), strategy.band_name())));
    }
    for band in [&config.index.positive_band, &config.index.negative_band] {
        if !image.has_band(band) {
            return Err((Stage::Index, Error::missing_band(image.id(), band.as_str())));
        }
    }

    let image = match template.values().grid_mismatch(grid.values()) {
        None => Arc::clone(image),
        Some(reason) => Arc::new(regrid(image, template, &reason).map_err(|e| (Stage::Grid, e))?),
    };
    Ok(Prepared { image, strategy })
}

/// Nearest-neighbour copy of every band onto `template`; quality bands
/// keep their bit patterns
fn regrid(image: &RasterImage, template: &MaskedRaster, reason: &str) -> Result<RasterImage> {
    let mut out = RasterImage::new(image.id(), image.timestamp());
    for band in image.bands() {
        let data = resample_to_grid(band.data(), template, ResampleMethod::Nearest).map_err(|e| {
            Error::GridMismatch {
                image: image.id().to_string(),
                band: band.name().to_string(),
                reason: format!("{reason}; {e}"),
            }
        })?;
        out = out.with_band(band.name(), data)?;
    }
    tracing::info!(image = image.id(), reason, "resampled image onto the reference grid");
    Ok(out)
}

/// Full pipeline on one block of the grid
fn process_tile(
    prepared: &[Prepared],
    tile: &Tile,
    config: &PipelineConfig,
    params: &CompositeParams,
) -> Result<TileOutput> {
    let indexed = prepared
        .par_iter()
        .map(|p| {
            let block = p.image.window(tile.row_offset, tile.col_offset, tile.rows, tile.cols)?;
            let masked = mask_with_strategy(&block, &p.strategy, &config.masking)?;
            let index = index_band(&masked, &config.index)?;
            RasterImage::new(block.id(), block.timestamp()).with_band(params.band.clone(), index)
        })
        .collect::<Result<Vec<_>>>()?;

    let collection: ImageCollection = indexed.into_iter().collect();
    let composites = composite_months(&collection, params)?;
    let annual = annual_mean(&composites)?;
    Ok(TileOutput {
        months: composites.into_iter().map(MonthlyComposite::into_data).collect(),
        annual,
    })
}

fn annual_raster(windows: &[MonthWindow], band: &str, data: MaskedRaster) -> Result<AnnualRaster> {
    let start = windows
        .first()
        .map(|w| w.start)
        .ok_or_else(|| Error::EmptyCollection("no month windows".into()))?;
    let image = RasterImage::new(format!("{band}_annual_mean"), start).with_band(band, data)?;
    AnnualRaster::new(image)
}

fn log_month(month: &MonthReport) {
    match month.status {
        MonthStatus::Empty => tracing::warn!(
            month = %month.label,
            images = month.image_count,
            "month has no valid pixels"
        ),
        MonthStatus::Partial => tracing::info!(
            month = %month.label,
            images = month.image_count,
            valid = month.valid_pixels,
            total = month.total_pixels,
            "month partially covered"
        ),
        MonthStatus::Complete => tracing::debug!(
            month = %month.label,
            images = month.image_count,
            "month fully covered"
        ),
    }
}
