//! Scene builders shared by the integration tests
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use verdure_core::crs::METERS_PER_DEGREE;
use verdure_core::raster::{GeoTransform, MaskedRaster, Raster};
use verdure_core::{RasterImage, CRS};

pub const ROWS: usize = 6;
pub const COLS: usize = 5;

/// Pixel size matching a 10 m target scale, so resampling is an identity
pub fn pixel() -> f64 {
    10.0 / METERS_PER_DEGREE
}

pub fn transform() -> GeoTransform {
    GeoTransform::new(48.2, 31.0, pixel(), -pixel())
}

pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 7, 30, 0).unwrap()
}

pub fn band_with(f: impl Fn(usize, usize) -> f64) -> MaskedRaster {
    let mut r = Raster::new(ROWS, COLS);
    for row in 0..ROWS {
        for col in 0..COLS {
            r.set(row, col, f(row, col)).unwrap();
        }
    }
    r.set_transform(transform());
    r.set_crs(Some(CRS::wgs84()));
    MaskedRaster::from_values(r)
}

pub fn constant(v: f64) -> MaskedRaster {
    band_with(|_, _| v)
}

/// Digital numbers (B8, B4) whose NDVI is `ndvi` after scaling
pub fn dn_for(ndvi: f64) -> (f64, f64) {
    let total = 2000.0;
    let nir = total * (1.0 + ndvi) / 2.0;
    (nir, total - nir)
}

/// Scene with uniform NDVI, clear everywhere, masked through SCL
pub struct SceneBuilder {
    id: String,
    timestamp: DateTime<Utc>,
    ndvi: Box<dyn Fn(usize, usize) -> f64>,
    qa: Option<Box<dyn Fn(usize, usize) -> f64>>,
    scl: Option<Box<dyn Fn(usize, usize) -> f64>>,
    skip_b8: bool,
    transform: GeoTransform,
    crs: Option<CRS>,
}

impl SceneBuilder {
    pub fn new(id: &str, timestamp: DateTime<Utc>, ndvi: f64) -> Self {
        Self {
            id: id.to_string(),
            timestamp,
            ndvi: Box::new(move |_, _| ndvi),
            qa: None,
            scl: Some(Box::new(|_, _| 4.0)),
            skip_b8: false,
            transform: transform(),
            crs: Some(CRS::wgs84()),
        }
    }

    pub fn ndvi_fn(mut self, f: impl Fn(usize, usize) -> f64 + 'static) -> Self {
        self.ndvi = Box::new(f);
        self
    }

    pub fn qa(mut self, f: impl Fn(usize, usize) -> f64 + 'static) -> Self {
        self.qa = Some(Box::new(f));
        self
    }

    pub fn scl(mut self, f: impl Fn(usize, usize) -> f64 + 'static) -> Self {
        self.scl = Some(Box::new(f));
        self
    }

    pub fn no_scl(mut self) -> Self {
        self.scl = None;
        self
    }

    pub fn without_nir(mut self) -> Self {
        self.skip_b8 = true;
        self
    }

    pub fn shifted(mut self) -> Self {
        self.transform = GeoTransform::new(48.3, 31.0, pixel(), -pixel());
        self
    }

    /// Grid moved `cols` pixels east of the shared grid
    pub fn offset_cols(mut self, cols: f64) -> Self {
        self.transform = GeoTransform::new(48.2 + cols * pixel(), 31.0, pixel(), -pixel());
        self
    }

    pub fn without_crs(mut self) -> Self {
        self.crs = None;
        self
    }

    pub fn build(self) -> RasterImage {
        let tf = self.transform;
        let crs = self.crs.clone();
        let place = |b: MaskedRaster| {
            let mut b = b;
            b.set_transform(tf);
            b.set_crs(crs.clone());
            b
        };
        let ndvi = &self.ndvi;
        let b8 = place(band_with(|r, c| dn_for(ndvi(r, c)).0));
        let b4 = place(band_with(|r, c| dn_for(ndvi(r, c)).1));

        let mut img = RasterImage::new(self.id, self.timestamp)
            .with_band("B2", place(constant(500.0)))
            .unwrap()
            .with_band("B4", b4)
            .unwrap();
        if !self.skip_b8 {
            img = img.with_band("B8", b8).unwrap();
        }
        if let Some(qa) = &self.qa {
            img = img.with_band("QA60", place(band_with(|r, c| qa(r, c)))).unwrap();
        }
        if let Some(scl) = &self.scl {
            img = img.with_band("SCL", place(band_with(|r, c| scl(r, c)))).unwrap();
        }
        img
    }
}
