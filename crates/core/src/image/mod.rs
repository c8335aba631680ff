//! Timestamped multi-band scenes and collections of them

mod collection;
mod source;

pub use collection::ImageCollection;
pub use source::ImageSource;

use crate::bbox::BBox;
use crate::crs::{Projection, CRS};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, MaskedRaster};
use chrono::{DateTime, Utc};

/// One named band of a [`RasterImage`]
#[derive(Debug, Clone)]
pub struct Band {
    name: String,
    data: MaskedRaster,
}

impl Band {
    pub fn new(name: impl Into<String>, data: MaskedRaster) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &MaskedRaster {
        &self.data
    }

    pub fn into_data(self) -> MaskedRaster {
        self.data
    }
}

/// A multi-band scene acquired at one instant.
///
/// Bands keep their insertion order and are always co-registered: every band
/// shares the shape, transform and CRS of the first one. Images are values;
/// the builder methods consume `self` and return a new image.
#[derive(Debug, Clone)]
pub struct RasterImage {
    id: String,
    timestamp: DateTime<Utc>,
    bands: Vec<Band>,
}

impl RasterImage {
    /// Create an image with no bands
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            bands: Vec::new(),
        }
    }

    /// Add a band, or replace an existing band of the same name in place.
    ///
    /// Fails with [`Error::GridMismatch`] if the band is not on the grid of
    /// the bands already present.
    pub fn with_band(mut self, name: impl Into<String>, data: MaskedRaster) -> Result<Self> {
        let name = name.into();
        if let Some(first) = self.bands.first() {
            if let Some(reason) = first.data.values().grid_mismatch(data.values()) {
                return Err(Error::GridMismatch {
                    image: self.id.clone(),
                    band: name,
                    reason,
                });
            }
        }

        match self.bands.iter_mut().find(|b| b.name == name) {
            Some(existing) => existing.data = data,
            None => self.bands.push(Band::new(name, data)),
        }
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn into_bands(self) -> Vec<Band> {
        self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
    }

    pub fn band(&self, name: &str) -> Option<&MaskedRaster> {
        self.bands.iter().find(|b| b.name == name).map(|b| &b.data)
    }

    /// Like [`band`](Self::band) but fails with [`Error::MissingBand`]
    pub fn require_band(&self, name: &str) -> Result<&MaskedRaster> {
        self.band(name)
            .ok_or_else(|| Error::missing_band(self.id.clone(), name))
    }

    /// New image keeping only the bands for which `keep(name)` holds
    pub fn select<F: Fn(&str) -> bool>(&self, keep: F) -> RasterImage {
        RasterImage {
            id: self.id.clone(),
            timestamp: self.timestamp,
            bands: self.bands.iter().filter(|b| keep(&b.name)).cloned().collect(),
        }
    }

    /// New image with exactly the named bands, in the given order
    pub fn select_names(&self, names: &[&str]) -> Result<RasterImage> {
        let bands = names
            .iter()
            .map(|name| {
                self.require_band(name)
                    .map(|data| Band::new(*name, data.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RasterImage {
            id: self.id.clone(),
            timestamp: self.timestamp,
            bands,
        })
    }

    /// Shape of the grid, `None` for an image without bands
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.bands.first().map(|b| b.data.shape())
    }

    /// Transform of the grid, `None` for an image without bands
    pub fn transform(&self) -> Option<&GeoTransform> {
        self.bands.first().map(|b| b.data.transform())
    }

    /// CRS of the grid, `None` if there are no bands or the grid has no CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.bands.first().and_then(|b| b.data.crs())
    }

    /// First band's data, which defines the grid of the image
    pub fn grid(&self) -> Option<&MaskedRaster> {
        self.bands.first().map(|b| &b.data)
    }

    /// Footprint in the image's own CRS
    pub fn footprint(&self) -> Option<BBox> {
        self.grid().map(|g| BBox::from_bounds(g.values().bounds()))
    }

    /// Footprint as WGS84 longitude/latitude; images without a CRS are
    /// assumed to be geographic
    pub fn footprint_wgs84(&self) -> Result<Option<BBox>> {
        let Some(footprint) = self.footprint() else {
            return Ok(None);
        };
        let projection = match self.crs() {
            Some(crs) => Projection::from_crs(crs)?,
            None => Projection::Geographic,
        };
        Ok(footprint.reproject(&projection, &Projection::Geographic, 8))
    }

    /// Copy out the same block of every band
    pub fn window(&self, row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Result<RasterImage> {
        let bands = self
            .bands
            .iter()
            .map(|b| {
                b.data
                    .window(row_offset, col_offset, rows, cols)
                    .map(|data| Band::new(b.name.clone(), data))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RasterImage {
            id: self.id.clone(),
            timestamp: self.timestamp,
            bands,
        })
    }
}
