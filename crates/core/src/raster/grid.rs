//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a 2D grid with associated
/// geographic metadata (transform and CRS). It carries an optional no-data
/// sentinel for interchange with files; validity inside the pipeline is
/// tracked separately by [`PixelMask`](crate::raster::PixelMask).
///
/// # Example
///
/// ```ignore
/// use verdure_core::Raster;
///
/// let mut raster: Raster<f64> = Raster::new(100, 100);
/// raster.set(10, 20, 0.42)?;
/// let value = raster.get(10, 20)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from existing row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a zeroed raster with the same georeferencing but a different
    /// data type
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Create a raster with the same dimensions and metadata, filled with a value
    pub fn like(&self, fill_value: T) -> Self {
        Self {
            data: Array2::from_elem(self.data.dim(), fill_value),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }

    /// Apply `f` to every cell, keeping the georeferencing
    pub fn map<U: RasterElement, F: Fn(T) -> U>(&self, f: F) -> Raster<U> {
        Raster {
            data: self.data.mapv(f),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a mutable view of the underlying data
    pub fn view_mut(&mut self) -> ArrayViewMut2<'_, T> {
        self.data.view_mut()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Consume the raster and return the underlying array
    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    // Windows

    /// Copy out the `rows` x `cols` block starting at (`row_offset`, `col_offset`).
    ///
    /// The returned raster keeps the CRS and no-data value; its transform is
    /// shifted so every cell keeps its map position.
    pub fn window(&self, row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Result<Self> {
        let row_end = row_offset + rows;
        let col_end = col_offset + cols;
        if row_end > self.rows() || col_end > self.cols() {
            return Err(Error::IndexOutOfBounds {
                row: row_end.saturating_sub(1),
                col: col_end.saturating_sub(1),
                rows: self.rows(),
                cols: self.cols(),
            });
        }

        Ok(Self {
            data: self.data.slice(s![row_offset..row_end, col_offset..col_end]).to_owned(),
            transform: self.transform.window(col_offset, row_offset),
            crs: self.crs.clone(),
            nodata: self.nodata,
        })
    }

    /// Write `block` into this raster with its top-left cell at
    /// (`row_offset`, `col_offset`)
    pub fn paste(&mut self, block: &Raster<T>, row_offset: usize, col_offset: usize) -> Result<()> {
        let (rows, cols) = block.shape();
        if row_offset + rows > self.rows() || col_offset + cols > self.cols() {
            return Err(Error::SizeMismatch {
                er: self.rows(),
                ec: self.cols(),
                ar: row_offset + rows,
                ac: col_offset + cols,
            });
        }
        self.data
            .slice_mut(s![row_offset..row_offset + rows, col_offset..col_offset + cols])
            .assign(&block.data);
        Ok(())
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Map bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Whether `other` covers exactly the same cells: same shape, same
    /// transform (to 1e-9 map units) and an equivalent CRS.
    pub fn same_grid<U: RasterElement>(&self, other: &Raster<U>) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        if !self.transform.approx_eq(other.transform(), 1e-9) {
            return false;
        }
        match (self.crs(), other.crs()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_equivalent(b),
            _ => false,
        }
    }

    /// Describe why `other` is not on this grid, if it is not
    pub fn grid_mismatch<U: RasterElement>(&self, other: &Raster<U>) -> Option<String> {
        if self.shape() != other.shape() {
            return Some(format!("shape {:?} vs {:?}", self.shape(), other.shape()));
        }
        if !self.transform.approx_eq(other.transform(), 1e-9) {
            return Some(format!("transform {:?} vs {:?}", self.transform.to_gdal(), other.transform().to_gdal()));
        }
        if !self.same_grid(other) {
            let name = |c: Option<&CRS>| c.map_or_else(|| "none".to_string(), CRS::identifier);
            return Some(format!("CRS {} vs {}", name(self.crs()), name(other.crs())));
        }
        None
    }

    // Coordinate conversion

    /// Convert pixel coordinates to map coordinates (pixel center)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Convert map coordinates to fractional pixel coordinates
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    // Value checks

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, cols: usize) -> Raster<f64> {
        let data = (0..rows * cols).map(|i| i as f64).collect();
        Raster::from_vec(data, rows, cols).unwrap()
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(Raster::<f64>::from_vec(vec![1.0; 5], 2, 3).is_err());
    }

    #[test]
    fn window_copies_block_and_shifts_transform() {
        let mut r = ramp(4, 5);
        r.set_transform(GeoTransform::new(0.0, 40.0, 10.0, -10.0));

        let w = r.window(1, 2, 2, 3).unwrap();
        assert_eq!(w.shape(), (2, 3));
        assert_eq!(w.get(0, 0).unwrap(), 7.0);
        assert_eq!(w.get(1, 2).unwrap(), 14.0);
        assert_eq!(w.transform().origin_x, 20.0);
        assert_eq!(w.transform().origin_y, 30.0);
        assert_eq!(w.pixel_to_geo(0, 0), r.pixel_to_geo(2, 1));
    }

    #[test]
    fn window_out_of_bounds_fails() {
        let r = ramp(4, 4);
        assert!(r.window(3, 0, 2, 2).is_err());
    }

    #[test]
    fn paste_restores_window() {
        let r = ramp(6, 6);
        let mut out = r.like(0.0);
        for (ro, co) in [(0, 0), (0, 3), (3, 0), (3, 3)] {
            let block = r.window(ro, co, 3, 3).unwrap();
            out.paste(&block, ro, co).unwrap();
        }
        assert_eq!(out.data(), r.data());
    }

    #[test]
    fn same_grid_checks_crs() {
        let mut a: Raster<f64> = Raster::new(2, 2);
        let mut b: Raster<u16> = a.with_same_meta(2, 2);
        assert!(a.same_grid(&b));

        a.set_crs(Some(CRS::from_epsg(32639)));
        assert!(!a.same_grid(&b));
        b.set_crs(Some(CRS::from_epsg(32639)));
        assert!(a.same_grid(&b));
        assert!(a.grid_mismatch(&b).is_none());
    }
}
