//! PNG previews of single-band products

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use verdure_colormap::{render_rgba, render_rgba_clipped, VisParams};
use verdure_core::{BBox, MaskedRaster, Projection};

/// Render `raster` with `vis` and write it as an 8-bit RGBA PNG.
///
/// When `region` (longitude/latitude) is given the preview is cropped to it.
pub fn write_preview(raster: &MaskedRaster, vis: &VisParams, region: Option<&BBox>, path: &Path) -> Result<()> {
    let (rgba, rows, cols) = match region {
        Some(region) => {
            let crs = raster.crs().context("raster has no CRS")?;
            let projection = Projection::from_crs(crs)?;
            let local = region
                .reproject(&Projection::Geographic, &projection, 21)
                .context("region cannot be expressed in the raster CRS")?;
            render_rgba_clipped(raster, vis, &local)?
        }
        None => {
            let (rows, cols) = raster.shape();
            (render_rgba(raster, vis)?, rows, cols)
        }
    };
    write_png(path, &rgba, cols, rows)
}

fn write_png(path: &Path, rgba: &[u8], width: usize, height: usize) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width as u32, height as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("Failed to write PNG header")?;
    writer.write_image_data(rgba).context("Failed to write PNG data")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdure_core::crs::METERS_PER_DEGREE;
    use verdure_core::{GeoTransform, PixelMask, Raster, CRS};

    fn annual() -> MaskedRaster {
        let pixel = 10.0 / METERS_PER_DEGREE;
        let mut values = Raster::filled(4, 3, 0.8);
        values.set_transform(GeoTransform::new(48.2, 31.0, pixel, -pixel));
        values.set_crs(Some(CRS::wgs84()));
        let mask = PixelMask::from_fn(4, 3, |r, _| r != 3);
        MaskedRaster::new(values, mask).unwrap()
    }

    fn read_png(path: &Path) -> (u32, u32, Vec<u8>) {
        let decoder = png::Decoder::new(File::open(path).unwrap());
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        buf.truncate(info.buffer_size());
        (info.width, info.height, buf)
    }

    #[test]
    fn preview_is_rgba_with_transparent_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        write_preview(&annual(), &VisParams::default(), None, &path).unwrap();

        let (w, h, data) = read_png(&path);
        assert_eq!((w, h), (3, 4));
        assert_eq!(&data[0..4], &[1, 19, 1, 255]);
        let last_row = 3 * 3 * 4;
        assert_eq!(&data[last_row..last_row + 4], &[0, 0, 0, 0]);
    }

    #[test]
    fn preview_outside_region_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let far = BBox::new(10.0, 10.0, 11.0, 11.0);
        assert!(write_preview(&annual(), &VisParams::default(), Some(&far), &path).is_err());
    }
}
