//! What a run did: dropped images, failed tiles and per-month coverage

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use verdure_core::raster::MaskedStatistics;
use verdure_core::time::MonthWindow;

/// Pipeline stage at which something went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Image grid check against the reference grid
    Grid,
    /// Cloud masking
    Mask,
    /// Spectral index computation
    Index,
    /// Per-tile processing
    Tile,
    /// The collection as a whole, when no image is usable
    Collection,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Grid => "grid",
            Stage::Mask => "mask",
            Stage::Index => "index",
            Stage::Tile => "tile",
            Stage::Collection => "collection",
        };
        f.write_str(s)
    }
}

/// A non-fatal failure that degraded the output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    /// Image that was dropped, if the failure is per image
    pub image: Option<String>,
    /// Tile index, if the failure is per tile
    pub tile: Option<usize>,
    pub message: String,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.stage)?;
        if let Some(image) = &self.image {
            write!(f, " image {image}")?;
        }
        if let Some(tile) = self.tile {
            write!(f, " tile {tile}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Coverage class of a monthly composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonthStatus {
    /// No valid pixel (no images, or all masked)
    Empty,
    /// Some pixels are no-data
    Partial,
    /// Every pixel is valid
    Complete,
}

impl MonthStatus {
    pub fn classify(valid: usize, total: usize) -> Self {
        if valid == 0 {
            MonthStatus::Empty
        } else if valid == total {
            MonthStatus::Complete
        } else {
            MonthStatus::Partial
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthReport {
    pub label: String,
    pub start: DateTime<Utc>,
    pub image_count: usize,
    pub valid_pixels: usize,
    pub total_pixels: usize,
    pub status: MonthStatus,
}

impl MonthReport {
    pub fn new(window: &MonthWindow, image_count: usize, valid_pixels: usize, total_pixels: usize) -> Self {
        Self {
            label: window.label(),
            start: window.start,
            image_count,
            valid_pixels,
            total_pixels,
            status: MonthStatus::classify(valid_pixels, total_pixels),
        }
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    /// Images handed to the pipeline
    pub images_in: usize,
    /// Images that made it into the composites
    pub images_used: usize,
    pub failures: Vec<StageFailure>,
    pub months: Vec<MonthReport>,
    /// Valid pixels of the annual mean before resampling
    pub annual_valid_pixels: usize,
    pub annual_total_pixels: usize,
    pub tiles: usize,
}

impl PipelineReport {
    pub fn record(&mut self, failure: StageFailure) {
        self.failures.push(failure);
    }

    pub fn dropped_images(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().filter_map(|f| f.image.as_deref())
    }

    pub fn failed_tiles(&self) -> impl Iterator<Item = usize> + '_ {
        self.failures.iter().filter_map(|f| f.tile)
    }

    pub fn months_with(&self, status: MonthStatus) -> impl Iterator<Item = &MonthReport> {
        self.months.iter().filter(move |m| m.status == status)
    }

    /// Whether any part of the output was degraded to no-data by a failure
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn set_annual(&mut self, stats: &MaskedStatistics) {
        self.annual_valid_pixels = stats.valid_count;
        self.annual_total_pixels = stats.total_count;
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "images: {} in, {} used, {} dropped; tiles: {}",
            self.images_in,
            self.images_used,
            self.dropped_images().count(),
            self.tiles
        )?;
        for m in &self.months {
            writeln!(
                f,
                "  {}  {:>3} images  {:>10}/{} valid  {:?}",
                m.label, m.image_count, m.valid_pixels, m.total_pixels, m.status
            )?;
        }
        for failure in &self.failures {
            writeln!(f, "  {failure}")?;
        }
        write!(
            f,
            "annual mean: {}/{} valid pixels",
            self.annual_valid_pixels, self.annual_total_pixels
        )
    }
}
