//! Pipeline configuration

use crate::compositing::{AggregateParams, CompositeParams};
use crate::imagery::IndexParams;
use crate::masking::{is_optical_band, CloudMaskParams};
use crate::resample::{ResampleMethod, ResampleParams};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use verdure_core::bbox::BBox;
use verdure_core::time::parse_date;
use verdure_core::{Error, Result};
use verdure_parallel::ProcessingMode;

/// Everything the pipeline needs to know; values only.
///
/// Loaded from JSON with missing fields taking their defaults, so a config
/// file only has to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Area of interest as WGS84 `[min_lon, min_lat, max_lon, max_lat]`
    pub aoi: BBox,
    /// First day of the query range (inclusive), `YYYY-MM-DD`
    pub start_date: String,
    /// Last day of the query range (exclusive), `YYYY-MM-DD`
    pub end_date: String,
    /// Month of the first window; defaults to the start date's month
    pub start_month: Option<u32>,
    pub month_count: usize,
    /// Output ground sample distance in metres
    pub scale: f64,
    /// EPSG code of the output CRS
    pub crs: u32,
    pub resampling: ResampleMethod,
    pub max_pixels: u64,
    pub masking: CloudMaskParams,
    pub index: IndexParams,
    /// Edge length of processing tiles; `None` processes the grid whole
    pub tile_size: Option<usize>,
    pub processing: ProcessingMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aoi: BBox::new(48.180, 30.859, 48.364, 31.080),
            start_date: "2024-03-01".to_string(),
            end_date: "2024-10-31".to_string(),
            start_month: None,
            month_count: 12,
            scale: 10.0,
            crs: 4326,
            resampling: ResampleMethod::Nearest,
            max_pixels: ResampleParams::default().max_pixels,
            masking: CloudMaskParams::default(),
            index: IndexParams::default(),
            tile_size: None,
            processing: ProcessingMode::Parallel,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn start(&self) -> Result<NaiveDate> {
        parse_date(&self.start_date)
    }

    pub fn end(&self) -> Result<NaiveDate> {
        parse_date(&self.end_date)
    }

    /// Check every value; nothing is run with an invalid config
    pub fn validate(&self) -> Result<()> {
        self.aoi.validate()?;
        let (start, end) = (self.start()?, self.end()?);
        if end <= start {
            return Err(Error::InvalidParameter {
                name: "end_date",
                value: self.end_date.clone(),
                reason: format!("must be after start_date {}", self.start_date),
            });
        }
        if self.month_count == 0 {
            return Err(invalid("month_count", "0", "at least one month window is required"));
        }
        if let Some(m) = self.start_month {
            if !(1..=12).contains(&m) {
                return Err(invalid("start_month", &m.to_string(), "must be in 1..=12"));
            }
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(invalid("scale", &self.scale.to_string(), "must be a positive number of metres"));
        }
        if self.max_pixels == 0 {
            return Err(invalid("max_pixels", "0", "must be positive"));
        }
        if self.tile_size == Some(0) {
            return Err(invalid("tile_size", "0", "must be positive"));
        }
        self.masking.validate()?;

        let IndexParams {
            positive_band,
            negative_band,
            output_band,
        } = &self.index;
        if positive_band == negative_band {
            return Err(invalid("index", positive_band, "the two index bands must differ"));
        }
        for band in [positive_band, negative_band] {
            if !is_optical_band(band, &self.masking.optical_prefix) {
                return Err(invalid("index", band, "index bands must be optical bands"));
            }
        }
        if output_band.trim().is_empty() {
            return Err(invalid("index.output_band", output_band, "must not be empty"));
        }
        Ok(())
    }

    /// Year and month of the first composite window
    pub fn first_month(&self) -> Result<(i32, u32)> {
        let start = self.start()?;
        Ok((start.year(), self.start_month.unwrap_or_else(|| start.month())))
    }

    pub fn composite_params(&self) -> Result<CompositeParams> {
        let (year, start_month) = self.first_month()?;
        Ok(CompositeParams {
            year,
            start_month,
            month_count: self.month_count,
            band: self.index.output_band.clone(),
        })
    }

    pub fn resample_params(&self) -> ResampleParams {
        ResampleParams {
            target_epsg: self.crs,
            scale: self.scale,
            method: self.resampling,
            max_pixels: self.max_pixels,
        }
    }

    pub fn aggregate_params(&self) -> AggregateParams {
        AggregateParams {
            band: self.index.output_band.clone(),
            resample: Some(self.resample_params()),
        }
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> Error {
    Error::InvalidParameter {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.first_month().unwrap(), (2024, 3));
        let p = cfg.composite_params().unwrap();
        assert_eq!((p.year, p.start_month, p.month_count), (2024, 3, 12));
        assert_eq!(p.band, "NDVI");
        assert_eq!(cfg.resample_params().target_epsg, 4326);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = PipelineConfig::from_json(
            r#"{ "start_date": "2023-01-01", "end_date": "2024-01-01", "scale": 20,
                 "masking": { "qa_bits": [10] }, "tile_size": 256 }"#,
        )
        .unwrap();
        assert_eq!(cfg.scale, 20.0);
        assert_eq!(cfg.masking.qa_bits, vec![10]);
        assert_eq!(cfg.masking.qa_band, "QA60");
        assert_eq!(cfg.tile_size, Some(256));
        assert_eq!(cfg.aoi, PipelineConfig::default().aoi);
        assert_eq!(cfg.first_month().unwrap(), (2023, 1));
    }

    #[test]
    fn json_round_trip() {
        let cfg = PipelineConfig {
            start_month: Some(1),
            ..Default::default()
        };
        let back = PipelineConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn rejects_bad_values() {
        let cases = [
            PipelineConfig { month_count: 0, ..Default::default() },
            PipelineConfig { scale: -10.0, ..Default::default() },
            PipelineConfig { start_month: Some(13), ..Default::default() },
            PipelineConfig { end_date: "2024-02-01".into(), ..Default::default() },
            PipelineConfig { start_date: "March 1".into(), ..Default::default() },
            PipelineConfig { tile_size: Some(0), ..Default::default() },
            PipelineConfig {
                index: IndexParams {
                    positive_band: "B4".into(),
                    negative_band: "B4".into(),
                    output_band: "X".into(),
                },
                ..Default::default()
            },
            PipelineConfig {
                index: IndexParams {
                    positive_band: "SCL".into(),
                    negative_band: "B4".into(),
                    output_band: "X".into(),
                },
                ..Default::default()
            },
            PipelineConfig {
                aoi: BBox::new(1.0, 1.0, 0.0, 2.0),
                ..Default::default()
            },
        ];
        for cfg in cases {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }
}
