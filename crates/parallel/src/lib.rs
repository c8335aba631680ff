//! # Verdure Parallel
//!
//! Execution strategies for the compositing pipeline.
//!
//! This crate provides:
//! - Row/item parallel mapping using Rayon, with a sequential mode
//! - Spatial tiling of large grids and reassembly of per-tile results

pub mod strategy;
pub mod tiled;

pub use strategy::{ParallelStrategy, ProcessingMode};
pub use tiled::{Tile, TileIterator, TileResult, TiledProcessor};
