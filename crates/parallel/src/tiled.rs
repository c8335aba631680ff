//! Tiled processing for large grids.
//!
//! A grid is split into non-overlapping blocks; each block runs through a
//! caller-supplied function independently and the per-block rasters are
//! pasted back into a full-size result. Blocks that fail are left as
//! no-data in the reassembled output.

use crate::strategy::{ParallelStrategy, ProcessingMode};
use verdure_core::error::{Error, Result};
use verdure_core::raster::MaskedRaster;

/// A tile representing a block of a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Position in row-major tile order
    pub index: usize,
    /// Row offset in the source grid
    pub row_offset: usize,
    /// Column offset in the source grid
    pub col_offset: usize,
    /// Number of rows in this tile
    pub rows: usize,
    /// Number of columns in this tile
    pub cols: usize,
}

impl Tile {
    /// Create a new tile
    pub fn new(index: usize, row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Self {
        Self {
            index,
            row_offset,
            col_offset,
            rows,
            cols,
        }
    }

    /// Convert tile-local coordinates to source grid coordinates
    pub fn to_source_coords(&self, local_row: usize, local_col: usize) -> (usize, usize) {
        (self.row_offset + local_row, self.col_offset + local_col)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterator over non-overlapping tiles covering a grid in row-major order
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    tile_rows: usize,
    tile_cols: usize,
    current_row: usize,
    current_col: usize,
    index: usize,
}

impl TileIterator {
    /// Create a new tile iterator; a zero tile size is treated as one
    pub fn new(total_rows: usize, total_cols: usize, tile_size: usize) -> Self {
        let tile_size = tile_size.max(1);
        Self {
            total_rows,
            total_cols,
            tile_rows: tile_size,
            tile_cols: tile_size,
            current_row: 0,
            current_col: 0,
            index: 0,
        }
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let rows = self.tile_rows.min(self.total_rows - self.current_row);
        let cols = self.tile_cols.min(self.total_cols - self.current_col);
        let tile = Tile::new(self.index, self.current_row, self.current_col, rows, cols);
        self.index += 1;

        self.current_col += self.tile_cols;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.tile_rows;
        }

        Some(tile)
    }
}

/// Outcome of running one tile
#[derive(Debug)]
pub struct TileResult<T> {
    pub tile: Tile,
    pub result: Result<T>,
}

/// Processor for tiled raster operations
#[derive(Debug, Clone, Copy)]
pub struct TiledProcessor {
    tile_size: Option<usize>,
    mode: ProcessingMode,
}

impl Default for TiledProcessor {
    fn default() -> Self {
        Self::whole_grid(ProcessingMode::default())
    }
}

impl TiledProcessor {
    /// Create a processor producing `tile_size` x `tile_size` blocks
    pub fn new(tile_size: usize, mode: ProcessingMode) -> Self {
        Self {
            tile_size: Some(tile_size.max(1)),
            mode,
        }
    }

    /// A processor that treats the whole grid as a single tile
    pub fn whole_grid(mode: ProcessingMode) -> Self {
        Self {
            tile_size: None,
            mode,
        }
    }

    pub fn tile_size(&self) -> Option<usize> {
        self.tile_size
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Tiles covering a `rows` x `cols` grid
    pub fn tiles(&self, rows: usize, cols: usize) -> Vec<Tile> {
        match self.tile_size {
            Some(size) => TileIterator::new(rows, cols, size).collect(),
            None if rows == 0 || cols == 0 => Vec::new(),
            None => vec![Tile::new(0, 0, 0, rows, cols)],
        }
    }

    /// Run `f` on every tile; results come back in tile order
    pub fn map<T, F>(&self, rows: usize, cols: usize, f: F) -> Vec<TileResult<T>>
    where
        T: Send,
        F: Fn(&Tile) -> Result<T> + Sync + Send,
    {
        let tiles = self.tiles(rows, cols);
        self.mode.par_map_slice(&tiles, |tile| TileResult {
            tile: *tile,
            result: f(tile),
        })
    }

    /// Separate successful tiles from failed ones, logging each failure
    pub fn split_results<T>(results: Vec<TileResult<T>>) -> (Vec<(Tile, T)>, Vec<(Tile, Error)>) {
        let mut done = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for TileResult { tile, result } in results {
            match result {
                Ok(value) => done.push((tile, value)),
                Err(e) => {
                    tracing::warn!(
                        tile = tile.index,
                        row = tile.row_offset,
                        col = tile.col_offset,
                        error = %e,
                        "tile failed, leaving block as no-data"
                    );
                    failed.push((tile, e));
                }
            }
        }
        (done, failed)
    }

    /// Paste per-tile rasters into a `template`-shaped raster.
    ///
    /// Cells not covered by any block stay invalid, so a failed tile
    /// degrades to no-data.
    pub fn reassemble<'a, I>(template: &MaskedRaster, blocks: I) -> Result<MaskedRaster>
    where
        I: IntoIterator<Item = (&'a Tile, &'a MaskedRaster)>,
    {
        let mut output = MaskedRaster::invalid_like(template.values());
        for (tile, block) in blocks {
            if block.shape() != (tile.rows, tile.cols) {
                return Err(Error::SizeMismatch {
                    er: tile.rows,
                    ec: tile.cols,
                    ar: block.rows(),
                    ac: block.cols(),
                });
            }
            output.paste(block, tile.row_offset, tile.col_offset)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdure_core::raster::{GeoTransform, Raster};

    #[test]
    fn test_tile_iterator() {
        let tiles: Vec<_> = TileIterator::new(100, 70, 32).collect();
        assert_eq!(tiles.len(), 4 * 3);
        assert_eq!(tiles[0], Tile::new(0, 0, 0, 32, 32));
        let last = tiles.last().unwrap();
        assert_eq!((last.row_offset, last.col_offset), (96, 64));
        assert_eq!((last.rows, last.cols), (4, 6));
        assert!(tiles.iter().enumerate().all(|(i, t)| t.index == i));
    }

    #[test]
    fn test_tile_coverage() {
        let rows = 100;
        let cols = 100;
        let mut covered = vec![vec![0u8; cols]; rows];

        for tile in TileIterator::new(rows, cols, 32) {
            for r in 0..tile.rows {
                for c in 0..tile.cols {
                    let (sr, sc) = tile.to_source_coords(r, c);
                    covered[sr][sc] += 1;
                }
            }
        }

        // Every cell exactly once
        for r in 0..rows {
            for c in 0..cols {
                assert_eq!(covered[r][c], 1, "Cell ({}, {}) covered {} times", r, c, covered[r][c]);
            }
        }
    }

    #[test]
    fn whole_grid_is_one_tile() {
        let p = TiledProcessor::whole_grid(ProcessingMode::Sequential);
        assert_eq!(p.tiles(5, 7), vec![Tile::new(0, 0, 0, 5, 7)]);
        assert!(p.tiles(0, 7).is_empty());
    }

    fn template(rows: usize, cols: usize) -> MaskedRaster {
        let mut values = Raster::filled(rows, cols, 1.0);
        values.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        MaskedRaster::from_values(values)
    }

    #[test]
    fn map_and_reassemble_round_trip() {
        let src = template(9, 11);
        let p = TiledProcessor::new(4, ProcessingMode::Parallel);
        let results = p.map(9, 11, |tile| {
            let block = src.window(tile.row_offset, tile.col_offset, tile.rows, tile.cols)?;
            Ok(block.map_valid(|v| v + tile.row_offset as f64))
        });
        let (blocks, failures) = TiledProcessor::split_results(results);
        assert!(failures.is_empty());
        let out = TiledProcessor::reassemble(&src, blocks.iter().map(|(t, b)| (t, b))).unwrap();
        assert_eq!(out.get(0, 0), Some(1.0));
        assert_eq!(out.get(8, 10), Some(9.0));
        assert_eq!(out.transform(), src.transform());
    }

    #[test]
    fn failed_tile_degrades_to_nodata() {
        let src = template(8, 8);
        let p = TiledProcessor::new(4, ProcessingMode::Sequential);
        let results = p.map(8, 8, |tile| {
            if tile.index == 3 {
                return Err(Error::Algorithm("boom".into()));
            }
            src.window(tile.row_offset, tile.col_offset, tile.rows, tile.cols)
        });
        let (blocks, failures) = TiledProcessor::split_results(results);
        assert_eq!(failures.len(), 1);
        let out = TiledProcessor::reassemble(&src, blocks.iter().map(|(t, b)| (t, b))).unwrap();
        assert_eq!(failures[0].0.index, 3);
        assert_eq!(out.get(3, 3), Some(1.0));
        assert_eq!(out.get(4, 4), None);
        assert_eq!(out.valid_count(), 48);
    }
}
