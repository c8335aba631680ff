//! Native GeoTIFF reading/writing built on the `tiff` crate.
//!
//! Supports the georeferencing subset the pipeline needs: pixel scale and
//! tiepoint tags, the EPSG code from the GeoKey directory, and the
//! `GDAL_NODATA` tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, MaskedRaster, Raster, RasterElement, NODATA};
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

// The decoder resolves these IDs to named variants; `Tag::Unknown(id)`
// lookups never match them.
const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Value written into the `GDAL_NODATA` tag, if any
    pub nodata: Option<f64>,
}

/// Read the first image of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{context}: {e}"))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("Cannot read dimensions"))?;
    let rows = height as usize;
    let cols = width as usize;

    let data: Vec<T> = match decoder
        .read_image()
        .map_err(tiff_err("Cannot read image data"))?
    {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_epsg(&mut decoder).map(CRS::from_epsg));
    if let Some(nodata) = read_nodata(&mut decoder) {
        raster.set_nodata(Some(T::from_f64(nodata)));
    }

    Ok(raster)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(MODEL_TIEPOINT).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder.get_tag_u16_vec(GEO_KEY_DIRECTORY).ok()?;
    // Header is 4 shorts, then entries of (key, location, count, value)
    keys.get(4..)?
        .chunks_exact(4)
        .find(|entry| {
            (entry[0] == PROJECTED_CS_TYPE_KEY || entry[0] == GEOGRAPHIC_TYPE_KEY) && entry[1] == 0
        })
        .map(|entry| entry[3] as u32)
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(GDAL_NODATA).ok()?;
    text.trim_matches(char::from(0)).trim().parse().ok()
}

/// Write a Raster to a single-band float32 GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, file, &options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

/// Write a masked raster; invalid cells are stored as [`NODATA`] and the
/// sentinel is declared in the `GDAL_NODATA` tag
pub fn write_masked_geotiff<P: AsRef<Path>>(raster: &MaskedRaster, path: P) -> Result<()> {
    write_geotiff(raster.values(), path, Some(GeoTiffOptions { nodata: Some(NODATA) }))
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(tiff_err("Cannot create TIFF image"))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(MODEL_PIXEL_SCALE, &scale[..])
        .map_err(tiff_err("Cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(MODEL_TIEPOINT, &tiepoint[..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;

    let geokeys = geokey_directory(raster.crs());
    image
        .encoder()
        .write_tag(GEO_KEY_DIRECTORY, &geokeys[..])
        .map_err(tiff_err("Cannot write geokey tag"))?;

    if let Some(nodata) = options.nodata {
        image
            .encoder()
            .write_tag(GDAL_NODATA, nodata.to_string().as_str())
            .map_err(tiff_err("Cannot write nodata tag"))?;
    }

    image
        .write_data(&data)
        .map_err(tiff_err("Cannot write image data"))?;

    Ok(())
}

/// Minimal GeoKey directory: model type, raster type and, when known, the
/// EPSG code of the CRS
fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(CRS::epsg).and_then(|c| u16::try_from(c).ok());
    let geographic = crs.is_some_and(CRS::is_geographic);
    // ModelTypeProjected = 1, ModelTypeGeographic = 2
    let model_type = if geographic { 2 } else { 1 };

    let mut keys = vec![
        1, 1, 0, 2, // version 1.1.0, key count patched below
        GT_MODEL_TYPE_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_KEY, 0, 1, 1, // RasterPixelIsArea
    ];
    if let Some(code) = epsg {
        let key = if geographic { GEOGRAPHIC_TYPE_KEY } else { PROJECTED_CS_TYPE_KEY };
        keys.extend_from_slice(&[key, 0, 1, code]);
        keys[3] = 3;
    }
    keys
}
