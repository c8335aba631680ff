//! # Verdure Colormap
//!
//! Colour palettes and raster-to-RGBA rendering for Verdure products.
//!
//! A [`Palette`] is a list of evenly spaced colours interpolated linearly
//! between [`VisParams::min`] and [`VisParams::max`]. The default palette is
//! the 16-stop NDVI ramp from bare soil (white, tan) to dense canopy (dark
//! green). Invalid samples always render fully transparent.
//!
//! ## Usage
//!
//! ```ignore
//! use verdure_colormap::{render_rgba, VisParams};
//!
//! let rgba = render_rgba(&annual_ndvi, &VisParams::default())?;
//! ```

mod render;
mod scheme;

pub use render::{clip_to_bbox, render_rgba, render_rgba_clipped, VisParams};
pub use scheme::{ColorScheme, Palette, Rgb, NDVI_PALETTE};
