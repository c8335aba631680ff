//! Raster values paired with an explicit validity mask

use crate::bbox::BBox;
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, PixelMask, Raster, RasterElement};
use ndarray::{Array2, Zip};

/// Sentinel written under invalid cells and into exported files.
///
/// It is only a storage convention: validity is always decided by the
/// [`PixelMask`], never by comparing against this value.
pub const NODATA: f64 = -9999.0;

/// A `Raster<f64>` whose validity is carried by a [`PixelMask`].
///
/// Every constructor normalises the pair so that invalid cells hold
/// [`NODATA`] and no valid cell holds a non-finite value. Two masked rasters
/// built from the same inputs are therefore bit-identical.
#[derive(Debug, Clone)]
pub struct MaskedRaster {
    values: Raster<f64>,
    mask: PixelMask,
}

impl MaskedRaster {
    /// Pair values with a mask of the same shape
    pub fn new(mut values: Raster<f64>, mask: PixelMask) -> Result<Self> {
        let (er, ec) = values.shape();
        let (ar, ac) = mask.shape();
        if (er, ec) != (ar, ac) {
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }

        let mut valid = mask.view().to_owned();
        Zip::from(values.data_mut())
            .and(&mut valid)
            .for_each(|v, ok| {
                if !v.is_finite() {
                    *ok = false;
                }
                if !*ok {
                    *v = NODATA;
                }
            });
        values.set_nodata(Some(NODATA));

        Ok(Self {
            values,
            mask: PixelMask::from_array(valid),
        })
    }

    /// Convert a raster of any cell type; its no-data sentinel (if any)
    /// defines the invalid cells
    pub fn from_raster<T: RasterElement>(raster: &Raster<T>) -> Self {
        let mask = PixelMask::from_nodata(raster);
        let values = raster.map(|v| v.to_f64().unwrap_or(NODATA));
        let (rows, cols) = values.shape();
        // Shapes match by construction
        Self::new(values, mask).unwrap_or_else(|_| Self::invalid(rows, cols))
    }

    /// A fully valid raster
    pub fn from_values(values: Raster<f64>) -> Self {
        let (rows, cols) = values.shape();
        let mask = PixelMask::all_valid(rows, cols);
        Self::new(values, mask).unwrap_or_else(|_| Self::invalid(rows, cols))
    }

    /// Build from row-major optional samples on the grid of `template`
    pub fn from_options<T: RasterElement>(template: &Raster<T>, samples: Vec<Option<f64>>) -> Result<Self> {
        let (rows, cols) = template.shape();
        if samples.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let mut values = template.with_same_meta::<f64>(rows, cols);
        let mut valid = Array2::from_elem((rows, cols), false);
        for (i, sample) in samples.into_iter().enumerate() {
            if let Some(v) = sample {
                let idx = (i / cols, i % cols);
                values.data_mut()[idx] = v;
                valid[idx] = true;
            }
        }
        Self::new(values, PixelMask::from_array(valid))
    }

    /// An entirely invalid raster of the given shape
    pub fn invalid(rows: usize, cols: usize) -> Self {
        let mut values = Raster::filled(rows, cols, NODATA);
        values.set_nodata(Some(NODATA));
        Self {
            values,
            mask: PixelMask::all_invalid(rows, cols),
        }
    }

    /// An entirely invalid raster on the grid of `template`
    pub fn invalid_like<T: RasterElement>(template: &Raster<T>) -> Self {
        let (rows, cols) = template.shape();
        let mut values = template.with_same_meta::<f64>(rows, cols);
        values.data_mut().fill(NODATA);
        values.set_nodata(Some(NODATA));
        Self {
            values,
            mask: PixelMask::all_invalid(rows, cols),
        }
    }

    /// Value at (row, col), or `None` if the sample is invalid or out of range
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if self.mask.is_valid(row, col) {
            self.values.get(row, col).ok()
        } else {
            None
        }
    }

    /// Whether the sample at (row, col) is valid
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.mask.is_valid(row, col)
    }

    /// Underlying values (invalid cells hold [`NODATA`])
    pub fn values(&self) -> &Raster<f64> {
        &self.values
    }

    /// Validity mask
    pub fn mask(&self) -> &PixelMask {
        &self.mask
    }

    /// Split into values and mask
    pub fn into_parts(self) -> (Raster<f64>, PixelMask) {
        (self.values, self.mask)
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.values.rows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.values.cols()
    }

    /// Geotransform of the grid
    pub fn transform(&self) -> &GeoTransform {
        self.values.transform()
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.values.set_transform(transform);
    }

    /// CRS of the grid
    pub fn crs(&self) -> Option<&CRS> {
        self.values.crs()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.values.set_crs(crs);
    }

    /// Number of valid samples
    pub fn valid_count(&self) -> usize {
        self.mask.count_valid()
    }

    /// Invalidate every sample where `mask` is false
    pub fn with_mask(&self, mask: &PixelMask) -> Result<Self> {
        let combined = self.mask.and(mask)?;
        Self::new(self.values.clone(), combined)
    }

    /// Apply `f` to every valid sample; invalid samples stay invalid
    pub fn map_valid<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        let mut values = self.values.clone();
        Zip::from(values.data_mut())
            .and(self.mask.view())
            .for_each(|v, &ok| {
                if ok {
                    *v = f(*v);
                }
            });
        let (rows, cols) = values.shape();
        Self::new(values, self.mask.clone()).unwrap_or_else(|_| Self::invalid(rows, cols))
    }

    /// Copy out a block, keeping map positions
    pub fn window(&self, row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Result<Self> {
        Ok(Self {
            values: self.values.window(row_offset, col_offset, rows, cols)?,
            mask: self.mask.window(row_offset, col_offset, rows, cols)?,
        })
    }

    /// Write `block` (values and validity) at the given offset
    pub fn paste(&mut self, block: &MaskedRaster, row_offset: usize, col_offset: usize) -> Result<()> {
        self.values.paste(&block.values, row_offset, col_offset)?;
        self.mask.paste(&block.mask, row_offset, col_offset)
    }

    /// Crop to the cells whose centres fall inside `bbox`.
    ///
    /// `bbox` is in the map units of this grid. The result keeps its map
    /// position; a box that covers no cell centre is an error.
    pub fn clip(&self, bbox: &BBox) -> Result<Self> {
        let transform = *self.transform();
        if !transform.is_north_up() {
            return Err(Error::InvalidParameter {
                name: "region",
                value: format!("{:?}", bbox.to_array()),
                reason: "clipping needs a north-up grid".into(),
            });
        }

        let (rows, cols) = self.shape();
        let inside_cols: Vec<usize> = (0..cols)
            .filter(|&c| {
                let (x, _) = transform.pixel_to_geo(c, 0);
                x >= bbox.min_x && x <= bbox.max_x
            })
            .collect();
        let inside_rows: Vec<usize> = (0..rows)
            .filter(|&r| {
                let (_, y) = transform.pixel_to_geo(0, r);
                y >= bbox.min_y && y <= bbox.max_y
            })
            .collect();

        match (inside_rows.first(), inside_rows.last(), inside_cols.first(), inside_cols.last()) {
            (Some(&r0), Some(&r1), Some(&c0), Some(&c1)) => self.window(r0, c0, r1 - r0 + 1, c1 - c0 + 1),
            _ => Err(Error::InvalidParameter {
                name: "region",
                value: format!("{:?}", bbox.to_array()),
                reason: "region does not cover any pixel of the raster".into(),
            }),
        }
    }

    /// Statistics over valid samples only
    pub fn statistics(&self) -> MaskedStatistics {
        let mut stats = MaskedStatistics {
            total_count: self.values.len(),
            ..MaskedStatistics::default()
        };
        let mut sum = 0.0;

        Zip::from(self.values.data())
            .and(self.mask.view())
            .for_each(|&v, &ok| {
                if !ok {
                    return;
                }
                stats.min = Some(stats.min.map_or(v, |m: f64| m.min(v)));
                stats.max = Some(stats.max.map_or(v, |m: f64| m.max(v)));
                sum += v;
                stats.valid_count += 1;
            });

        if stats.valid_count > 0 {
            stats.mean = Some(sum / stats.valid_count as f64);
        }
        stats
    }
}

/// Statistics over the valid samples of a [`MaskedRaster`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskedStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub total_count: usize,
}

impl MaskedStatistics {
    /// Fraction of valid samples in [0, 1]
    pub fn coverage(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.valid_count as f64 / self.total_count as f64
        }
    }
}
