//! Coordinate Reference System handling

mod projection;

pub use projection::{Projection, METERS_PER_DEGREE};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self::from_epsg(3857)
    }

    /// UTM zone `zone` (1..=60) on the given hemisphere
    pub fn utm(zone: u32, north: bool) -> Self {
        Self::from_epsg(if north { 32600 + zone } else { 32700 + zone })
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether this CRS uses degrees of longitude/latitude
    pub fn is_geographic(&self) -> bool {
        self.epsg == Some(4326)
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // WKT comparison is textual only
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", wkt.chars().take(50).collect::<String>());
        }
        "Unknown".to_string()
    }
}

impl FromStr for CRS {
    type Err = Error;

    /// Parses `EPSG:<code>` (case-insensitive) or a bare EPSG code
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let code = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .unwrap_or(trimmed);
        code.parse::<u32>()
            .map(CRS::from_epsg)
            .map_err(|_| Error::UnsupportedCrs(s.to_string()))
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_epsg_strings() {
        assert_eq!("EPSG:4326".parse::<CRS>().unwrap().epsg(), Some(4326));
        assert_eq!("epsg:32639".parse::<CRS>().unwrap().epsg(), Some(32639));
        assert_eq!("3857".parse::<CRS>().unwrap().epsg(), Some(3857));
        assert!("EPSG:abc".parse::<CRS>().is_err());
    }

    #[test]
    fn utm_codes() {
        assert_eq!(CRS::utm(39, true).epsg(), Some(32639));
        assert_eq!(CRS::utm(21, false).epsg(), Some(32721));
    }

    #[test]
    fn equivalence_and_identifier() {
        assert!(CRS::from_epsg(4326).is_equivalent(&CRS::wgs84()));
        assert!(!CRS::wgs84().is_equivalent(&CRS::web_mercator()));
        assert_eq!(CRS::wgs84().identifier(), "EPSG:4326");
        assert!(CRS::wgs84().is_geographic());
    }
}
