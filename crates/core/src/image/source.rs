//! Upstream image archive boundary

use super::ImageCollection;
use crate::bbox::BBox;
use crate::error::Result;
use chrono::NaiveDate;

/// Supplier of scenes for an AOI and date range.
///
/// Implementations return every scene whose footprint intersects `aoi` and
/// whose timestamp lies in `[start, end)` (both at midnight UTC). The
/// returned collection is consumed as a value; the pipeline never re-queries.
pub trait ImageSource {
    fn query(&self, aoi: &BBox, start: NaiveDate, end: NaiveDate) -> Result<ImageCollection>;
}

impl ImageSource for ImageCollection {
    /// An in-memory collection is its own source
    fn query(&self, aoi: &BBox, start: NaiveDate, end: NaiveDate) -> Result<ImageCollection> {
        use crate::time::start_of_day;
        Ok(self
            .filter_date(start_of_day(start), start_of_day(end))
            .filter_bounds(aoi))
    }
}
