//! Per-sample validity masks

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};
use ndarray::{s, Array2, ArrayView2, Zip};

/// A boolean grid with the same shape as a band; `true` marks a valid sample.
///
/// Invalid samples are excluded from every reduction that touches them. The
/// mask is the single source of truth for validity: values stored under an
/// invalid cell are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelMask {
    valid: Array2<bool>,
}

impl PixelMask {
    /// Mask with every sample valid
    pub fn all_valid(rows: usize, cols: usize) -> Self {
        Self {
            valid: Array2::from_elem((rows, cols), true),
        }
    }

    /// Mask with every sample invalid
    pub fn all_invalid(rows: usize, cols: usize) -> Self {
        Self {
            valid: Array2::from_elem((rows, cols), false),
        }
    }

    /// Wrap an existing boolean array
    pub fn from_array(valid: Array2<bool>) -> Self {
        Self { valid }
    }

    /// Build a mask by evaluating `f(row, col)` for every cell
    pub fn from_fn<F: Fn(usize, usize) -> bool>(rows: usize, cols: usize, f: F) -> Self {
        Self {
            valid: Array2::from_shape_fn((rows, cols), |(r, c)| f(r, c)),
        }
    }

    /// Derive validity from a raster's no-data sentinel (non-finite floats
    /// are always invalid)
    pub fn from_nodata<T: RasterElement>(raster: &Raster<T>) -> Self {
        let nodata = raster.nodata();
        Self {
            valid: raster.data().mapv(|v| !v.is_nodata(nodata)),
        }
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.valid.dim()
    }

    /// Whether the sample at (row, col) is valid; out-of-range cells are invalid
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid.get((row, col)).copied().unwrap_or(false)
    }

    /// Set the validity of one sample
    pub fn set(&mut self, row: usize, col: usize, valid: bool) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.valid.get_mut((row, col)) {
            Some(cell) => {
                *cell = valid;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds { row, col, rows, cols }),
        }
    }

    /// Logical AND of two masks of equal shape
    pub fn and(&self, other: &PixelMask) -> Result<PixelMask> {
        self.check_shape(other)?;
        let valid = Zip::from(&self.valid)
            .and(&other.valid)
            .map_collect(|&a, &b| a && b);
        Ok(Self { valid })
    }

    /// Number of valid samples
    pub fn count_valid(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Whether no sample is valid
    pub fn is_all_invalid(&self) -> bool {
        !self.valid.iter().any(|v| *v)
    }

    /// Read-only view of the validity grid
    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.valid.view()
    }

    /// Copy out a block of the mask
    pub fn window(&self, row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Result<Self> {
        let (total_rows, total_cols) = self.shape();
        if row_offset + rows > total_rows || col_offset + cols > total_cols {
            return Err(Error::IndexOutOfBounds {
                row: (row_offset + rows).saturating_sub(1),
                col: (col_offset + cols).saturating_sub(1),
                rows: total_rows,
                cols: total_cols,
            });
        }
        Ok(Self {
            valid: self
                .valid
                .slice(s![row_offset..row_offset + rows, col_offset..col_offset + cols])
                .to_owned(),
        })
    }

    /// Write `block` into this mask at the given offset
    pub fn paste(&mut self, block: &PixelMask, row_offset: usize, col_offset: usize) -> Result<()> {
        let (rows, cols) = block.shape();
        let (total_rows, total_cols) = self.shape();
        if row_offset + rows > total_rows || col_offset + cols > total_cols {
            return Err(Error::SizeMismatch {
                er: total_rows,
                ec: total_cols,
                ar: row_offset + rows,
                ac: col_offset + cols,
            });
        }
        self.valid
            .slice_mut(s![row_offset..row_offset + rows, col_offset..col_offset + cols])
            .assign(&block.valid);
        Ok(())
    }

    fn check_shape(&self, other: &PixelMask) -> Result<()> {
        let (er, ec) = self.shape();
        let (ar, ac) = other.shape();
        if (er, ec) != (ar, ac) {
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        Ok(())
    }
}
