//! Local scene archive described by a JSON manifest.
//!
//! ```json
//! {
//!   "scenes": [
//!     {
//!       "id": "S2A_20240312",
//!       "datetime": "2024-03-12T07:05:21Z",
//!       "crs": "EPSG:32639",
//!       "bands": { "B4": "S2A_20240312/B4.tif", "B8": "S2A_20240312/B8.tif" }
//!     }
//!   ]
//! }
//! ```
//!
//! Band paths are resolved relative to the manifest's directory.
//!
//! No-data sentinels (from the file or the scene's `nodata` override) apply
//! to reflectance bands only. Quality bands (`QA60` and `SCL` unless
//! configured otherwise) are read verbatim: a QA60 value of 0 is a clear
//! pixel, not a fill value.

use super::native::read_geotiff;
use crate::bbox::BBox;
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::image::{ImageCollection, ImageSource, RasterImage};
use crate::raster::{MaskedRaster, Raster};
use crate::time::parse_timestamp;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One scene of the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneEntry {
    pub id: String,
    /// RFC 3339 timestamp or bare `YYYY-MM-DD`
    pub datetime: String,
    /// Overrides the CRS stored in the band files
    #[serde(default)]
    pub crs: Option<String>,
    /// Overrides the no-data value stored in the band files
    #[serde(default)]
    pub nodata: Option<f64>,
    pub bands: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneManifest {
    pub scenes: Vec<SceneEntry>,
}

impl SceneManifest {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// [`ImageSource`] backed by GeoTIFF band files on disk
#[derive(Debug, Clone)]
pub struct ManifestSource {
    root: PathBuf,
    manifest: SceneManifest,
    quality_bands: BTreeSet<String>,
}

impl ManifestSource {
    pub fn new(root: impl Into<PathBuf>, manifest: SceneManifest) -> Self {
        Self {
            root: root.into(),
            manifest,
            quality_bands: ["QA60", "SCL"].into_iter().map(String::from).collect(),
        }
    }

    /// Bands read without a no-data sentinel
    pub fn with_quality_bands<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quality_bands = bands.into_iter().map(Into::into).collect();
        self
    }

    /// Load a manifest file; band paths resolve against its directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manifest = SceneManifest::from_file(path)?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::new(root, manifest))
    }

    pub fn manifest(&self) -> &SceneManifest {
        &self.manifest
    }

    /// Read every band of one scene
    pub fn load_scene(&self, entry: &SceneEntry) -> Result<RasterImage> {
        let timestamp = parse_timestamp(&entry.datetime)?;
        let crs_override = entry.crs.as_deref().map(str::parse::<CRS>).transpose()?;

        let mut image = RasterImage::new(entry.id.clone(), timestamp);
        for (name, rel) in &entry.bands {
            let mut raster: Raster<f64> = read_geotiff(self.root.join(rel))?;
            if let Some(crs) = &crs_override {
                raster.set_crs(Some(crs.clone()));
            }
            if self.quality_bands.contains(name) {
                raster.set_nodata(None);
            } else if entry.nodata.is_some() {
                raster.set_nodata(entry.nodata);
            }
            image = image.with_band(name.clone(), MaskedRaster::from_raster(&raster))?;
        }
        tracing::debug!(scene = %entry.id, bands = entry.bands.len(), "loaded scene");
        Ok(image)
    }
}

impl ImageSource for ManifestSource {
    /// Loads every scene in the date range, then keeps those intersecting
    /// the AOI
    fn query(&self, aoi: &BBox, start: NaiveDate, end: NaiveDate) -> Result<ImageCollection> {
        let start_ts = crate::time::start_of_day(start);
        let end_ts = crate::time::start_of_day(end);

        let mut collection = ImageCollection::new();
        for entry in &self.manifest.scenes {
            let ts = parse_timestamp(&entry.datetime)?;
            if ts < start_ts || ts >= end_ts {
                continue;
            }
            collection.push(self.load_scene(entry).map_err(|e| {
                Error::Other(format!("scene '{}': {e}", entry.id))
            })?);
        }
        let found = collection.filter_bounds(aoi);
        tracing::info!(
            scenes = self.manifest.scenes.len(),
            in_range = collection.len(),
            selected = found.len(),
            "queried manifest"
        );
        Ok(found)
    }
}
