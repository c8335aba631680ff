//! Pure-Rust map projections between WGS84 and the supported grids.
//!
//! Covers EPSG:4326, EPSG:3857 and UTM (EPSG 326xx north / 327xx south),
//! which is what Sentinel-2 products and their exports use. UTM formulas
//! follow Snyder 1987 (USGS Prof. Paper 1395, pp. 61-64).

use super::CRS;
use crate::error::{Error, Result};

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Length of one degree along the equator, used to express a metric scale
/// in degrees for geographic grids.
pub const METERS_PER_DEGREE: f64 = 2.0 * std::f64::consts::PI * A / 360.0;

/// A supported map projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Longitude/latitude in degrees (EPSG:4326)
    Geographic,
    /// Spherical web mercator in metres (EPSG:3857)
    WebMercator,
    /// Universal Transverse Mercator in metres
    Utm { zone: u32, north: bool },
}

impl Projection {
    /// Resolve the projection for a CRS.
    ///
    /// Fails with [`Error::UnsupportedCrs`] for anything without a supported
    /// EPSG code.
    pub fn from_crs(crs: &CRS) -> Result<Self> {
        let code = crs
            .epsg()
            .ok_or_else(|| Error::UnsupportedCrs(crs.identifier()))?;
        Self::from_epsg(code).ok_or_else(|| Error::UnsupportedCrs(crs.identifier()))
    }

    /// Resolve an EPSG code; `None` if unsupported
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Projection::Geographic),
            3857 => Some(Projection::WebMercator),
            32601..=32660 => Some(Projection::Utm {
                zone: code - 32600,
                north: true,
            }),
            32701..=32760 => Some(Projection::Utm {
                zone: code - 32700,
                north: false,
            }),
            _ => None,
        }
    }

    /// Whether coordinates are in degrees
    pub fn is_geographic(&self) -> bool {
        matches!(self, Projection::Geographic)
    }

    /// Project WGS84 (lon, lat) degrees into this projection.
    ///
    /// Returns `None` where the projection is undefined (poles for web
    /// mercator, invalid latitudes).
    pub fn forward(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !lon.is_finite() || !lat.is_finite() || lat.abs() > 90.0 {
            return None;
        }
        match *self {
            Projection::Geographic => Some((lon, lat)),
            Projection::WebMercator => {
                if lat.abs() > MERCATOR_MAX_LAT {
                    return None;
                }
                let x = A * lon.to_radians();
                let y = A * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                Some((x, y))
            }
            Projection::Utm { zone, north } => Some(wgs84_to_utm(lon, lat, zone, north)),
        }
    }

    /// Unproject map coordinates back to WGS84 (lon, lat) degrees
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        match *self {
            Projection::Geographic => Some((x, y)),
            Projection::WebMercator => {
                let lon = (x / A).to_degrees();
                let lat = (2.0 * (y / A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
                Some((lon, lat))
            }
            Projection::Utm { zone, north } => Some(utm_to_wgs84(x, y, zone, north)),
        }
    }

    /// Transform a point from this projection into `target`
    pub fn transform_to(&self, target: &Projection, x: f64, y: f64) -> Option<(f64, f64)> {
        if self == target {
            return Some((x, y));
        }
        let (lon, lat) = self.inverse(x, y)?;
        target.forward(lon, lat)
    }
}

// ── Core projection ──────────────────────────────────────────────────────

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// WGS84 (lon, lat) in degrees to UTM (easting, northing) in metres
fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Snyder eq. 8-9
    let easting = K0
        * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    // Snyder eq. 8-10
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    let northing = if north {
        northing
    } else {
        northing + FALSE_NORTHING_SOUTH
    };

    (easting, northing)
}

/// UTM (easting, northing) in metres to WGS84 (lon, lat) in degrees
fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;

    // Footpoint latitude (Snyder eq. 3-26, 7-19)
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let sqrt_1me2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let t1 = tan_phi1 * tan_phi1;
    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    // Snyder eq. 8-17, 8-18
    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * E_PRIME2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from equator to latitude `lat` (radians), Snyder eq. 3-21
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn resolve_supported_codes() {
        assert_eq!(Projection::from_epsg(4326), Some(Projection::Geographic));
        assert_eq!(Projection::from_epsg(3857), Some(Projection::WebMercator));
        assert_eq!(
            Projection::from_epsg(32639),
            Some(Projection::Utm { zone: 39, north: true })
        );
        assert_eq!(
            Projection::from_epsg(32721),
            Some(Projection::Utm { zone: 21, north: false })
        );
        assert_eq!(Projection::from_epsg(32600), None);
        assert_eq!(Projection::from_epsg(2154), None);
        assert!(Projection::from_crs(&CRS::from_wkt("LOCAL_CS[]")).is_err());
    }

    // pyproj: Transformer.from_crs(4326, 32630, always_xy=True)
    //   .transform(-3.7037, 40.4168) -> (440298.94, 4474257.31)
    #[test]
    fn madrid_to_utm30n() {
        let p = Projection::Utm { zone: 30, north: true };
        let (e, n) = p.forward(-3.7037, 40.4168).unwrap();
        assert_relative_eq!(e, 440_298.94, epsilon = 1.0);
        assert_relative_eq!(n, 4_474_257.31, epsilon = 1.0);
    }

    #[test]
    fn utm_round_trip_in_aoi() {
        // AOI centre in south-western Iran, UTM zone 39N
        let p = Projection::Utm { zone: 39, north: true };
        let (e, n) = p.forward(48.272, 30.9695).unwrap();
        let (lon, lat) = p.inverse(e, n).unwrap();
        assert_relative_eq!(lon, 48.272, epsilon = 1e-6);
        assert_relative_eq!(lat, 30.9695, epsilon = 1e-6);
    }

    #[test]
    fn utm_south_round_trip() {
        let p = Projection::Utm { zone: 21, north: false };
        let (e, n) = p.forward(-58.3816, -34.6037).unwrap();
        assert_relative_eq!(e, 373_317.50, epsilon = 1.0);
        assert_relative_eq!(n, 6_170_036.17, epsilon = 1.0);
        let (lon, lat) = p.inverse(e, n).unwrap();
        assert_relative_eq!(lon, -58.3816, epsilon = 1e-6);
        assert_relative_eq!(lat, -34.6037, epsilon = 1e-6);
    }

    #[test]
    fn web_mercator_round_trip_and_limits() {
        let p = Projection::WebMercator;
        let (x, y) = p.forward(48.18, 30.859).unwrap();
        let (lon, lat) = p.inverse(x, y).unwrap();
        assert_relative_eq!(lon, 48.18, epsilon = 1e-9);
        assert_relative_eq!(lat, 30.859, epsilon = 1e-9);
        assert!(p.forward(0.0, 89.0).is_none());
    }

    #[test]
    fn transform_between_utm_zones_goes_through_wgs84() {
        let z38 = Projection::Utm { zone: 38, north: true };
        let z39 = Projection::Utm { zone: 39, north: true };
        let (e, n) = z39.forward(48.0, 31.0).unwrap();
        let (e38, n38) = z39.transform_to(&z38, e, n).unwrap();
        let (lon, lat) = z38.inverse(e38, n38).unwrap();
        assert_relative_eq!(lon, 48.0, epsilon = 1e-6);
        assert_relative_eq!(lat, 31.0, epsilon = 1e-6);
    }

    #[test]
    fn meters_per_degree_at_equator() {
        assert_relative_eq!(METERS_PER_DEGREE, 111_319.490_793_273_6, epsilon = 1e-6);
    }
}
