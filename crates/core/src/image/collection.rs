//! Unordered sets of scenes over a common AOI

use super::RasterImage;
use crate::bbox::BBox;
use crate::time::MonthWindow;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A set of [`RasterImage`]s sharing an AOI.
///
/// Images are held behind `Arc`, so filtering produces a new collection
/// without copying pixel data and never mutates the source collection.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    images: Vec<Arc<RasterImage>>,
}

impl ImageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_images(images: impl IntoIterator<Item = RasterImage>) -> Self {
        Self {
            images: images.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn push(&mut self, image: RasterImage) {
        self.images.push(Arc::new(image));
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RasterImage> {
        self.images.iter().map(|i| i.as_ref())
    }

    /// Shared handles to the images
    pub fn images(&self) -> &[Arc<RasterImage>] {
        &self.images
    }

    /// Images whose timestamp lies in `[start, end)`
    pub fn filter_date(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ImageCollection {
        self.filter(|img| img.timestamp() >= start && img.timestamp() < end)
    }

    /// Images acquired inside a month window
    pub fn filter_window(&self, window: &MonthWindow) -> ImageCollection {
        self.filter(|img| window.contains(&img.timestamp()))
    }

    /// Images whose WGS84 footprint intersects `aoi`. Images whose footprint
    /// cannot be computed are dropped.
    pub fn filter_bounds(&self, aoi: &BBox) -> ImageCollection {
        self.filter(|img| matches!(img.footprint_wgs84(), Ok(Some(fp)) if fp.intersects(aoi)))
    }

    /// Images for which `keep` holds
    pub fn filter<F: Fn(&RasterImage) -> bool>(&self, keep: F) -> ImageCollection {
        ImageCollection {
            images: self.images.iter().filter(|i| keep(i)).cloned().collect(),
        }
    }

    /// Images ordered by acquisition time, ties broken by id
    pub fn sorted_by_time(&self) -> ImageCollection {
        let mut images = self.images.clone();
        images.sort_by(|a, b| {
            a.timestamp()
                .cmp(&b.timestamp())
                .then_with(|| a.id().cmp(b.id()))
        });
        ImageCollection { images }
    }
}

impl FromIterator<RasterImage> for ImageCollection {
    fn from_iter<I: IntoIterator<Item = RasterImage>>(iter: I) -> Self {
        Self::from_images(iter)
    }
}

impl FromIterator<Arc<RasterImage>> for ImageCollection {
    fn from_iter<I: IntoIterator<Item = Arc<RasterImage>>>(iter: I) -> Self {
        Self {
            images: iter.into_iter().collect(),
        }
    }
}
