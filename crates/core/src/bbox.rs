//! Axis-aligned bounding boxes for AOIs and image footprints

use crate::crs::Projection;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A bounding box in map units of some CRS.
///
/// Serialised as `[min_x, min_y, max_x, max_y]`, the same order used by
/// rectangle geometries and STAC `bbox` fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Checked constructor: rejects non-finite or inverted boxes
    pub fn try_new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let bbox = Self::new(min_x, min_y, max_x, max_y);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Fails unless all corners are finite and min < max on both axes
    pub fn validate(&self) -> Result<()> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min_x >= self.max_x || self.min_y >= self.max_y {
            return Err(Error::InvalidParameter {
                name: "bbox",
                value: format!("{:?}", self.to_array()),
                reason: "expected finite [min_x, min_y, max_x, max_y] with min < max".into(),
            });
        }
        Ok(())
    }

    /// Build from a `(min_x, min_y, max_x, max_y)` tuple as returned by
    /// `GeoTransform::bounds`
    pub fn from_bounds(bounds: (f64, f64, f64, f64)) -> Self {
        Self::new(bounds.0, bounds.1, bounds.2, bounds.3)
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Centre point (x, y)
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Check if two bboxes intersect.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Overlap of two boxes, `None` if they do not intersect
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BBox::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        ))
    }

    /// Whether the point lies inside the box (edges inclusive)
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Envelope of this box after transforming it from `from` to `to`.
    ///
    /// Each edge is sampled at `samples_per_edge` points so the curvature of
    /// the projection is captured; the result is the envelope of the samples.
    pub fn reproject(&self, from: &Projection, to: &Projection, samples_per_edge: usize) -> Option<BBox> {
        if from == to {
            return Some(*self);
        }

        let steps = samples_per_edge.max(2) - 1;
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = self.min_x + t * self.width();
            let y = self.min_y + t * self.height();
            for (px, py) in [(x, self.min_y), (x, self.max_y), (self.min_x, y), (self.max_x, y)] {
                let (tx, ty) = from.transform_to(to, px, py)?;
                min_x = min_x.min(tx);
                min_y = min_y.min(ty);
                max_x = max_x.max(tx);
                max_y = max_y.max(ty);
            }
        }

        Some(BBox::new(min_x, min_y, max_x, max_y))
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        b.to_array()
    }
}
