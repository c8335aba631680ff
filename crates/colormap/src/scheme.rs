//! Colour palettes and the multi-stop interpolation engine.

use std::fmt;
use std::str::FromStr;
use verdure_core::{Error, Result};

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `RRGGBB`, with or without a leading `#`
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || Error::InvalidParameter {
            name: "palette",
            value: hex.to_string(),
            reason: "expected a six digit hex colour".into(),
        };
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Upper-case `RRGGBB`
    pub fn to_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hex())
    }
}

/// NDVI ramp: bare soil and water at the low end, dense canopy at the top.
pub const NDVI_PALETTE: [&str; 16] = [
    "FFFFFF", "CE7E45", "DF923D", "F1B555", "FCD163", "99B718", "74A901", "66A000",
    "529400", "3E8601", "207401", "056201", "004C00", "023B01", "011D01", "011301",
];

const WATER_PALETTE: [&str; 5] = ["F0F9FF", "BAE4FA", "50B4E6", "1E78C8", "08306B"];

const DIVERGENT_PALETTE: [&str; 5] = ["2166AC", "67A9CF", "F7F7F7", "EF8A62", "B2182B"];

const GRAYSCALE_PALETTE: [&str; 2] = ["000000", "FFFFFF"];

/// Evenly spaced colour stops.
///
/// Position `t` in [0, 1] falls between stops `floor(t * (n - 1))` and the
/// next one and is interpolated linearly; values outside [0, 1] clamp to the
/// end colours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgb>,
}

impl Palette {
    /// Build from explicit colours; at least one is required
    pub fn new(colors: Vec<Rgb>) -> Result<Self> {
        if colors.is_empty() {
            return Err(Error::InvalidParameter {
                name: "palette",
                value: "[]".into(),
                reason: "palette needs at least one colour".into(),
            });
        }
        Ok(Self { colors })
    }

    /// Parse a list of hex colours
    pub fn from_hex<I, S>(hex: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let colors = hex
            .into_iter()
            .map(|h| Rgb::from_hex(h.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(colors)
    }

    /// The 16-stop NDVI palette
    pub fn ndvi() -> Self {
        Self::from_static(&NDVI_PALETTE)
    }

    fn from_static(hex: &[&str]) -> Self {
        let colors = hex.iter().filter_map(|h| Rgb::from_hex(h).ok()).collect();
        Self { colors }
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Colour at normalised position `t`
    pub fn evaluate(&self, t: f64) -> Rgb {
        let n = self.colors.len();
        if n == 1 || t.is_nan() || t <= 0.0 {
            return self.colors[0];
        }
        if t >= 1.0 {
            return self.colors[n - 1];
        }
        let pos = t * (n - 1) as f64;
        let i = (pos.floor() as usize).min(n - 2);
        lerp_color(self.colors[i], self.colors[i + 1], pos - i as f64)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

/// Named palettes selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorScheme {
    /// White -> tan -> green (vegetation indices)
    Ndvi,
    /// White -> cyan -> blue (water indices)
    Water,
    /// Blue -> white -> red (signed differences such as NBR)
    Divergent,
    /// Black -> White
    Grayscale,
}

impl ColorScheme {
    pub const ALL: &[ColorScheme] = &[Self::Ndvi, Self::Water, Self::Divergent, Self::Grayscale];

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ndvi => "ndvi",
            Self::Water => "water",
            Self::Divergent => "divergent",
            Self::Grayscale => "grayscale",
        }
    }

    /// Hex colours of this scheme
    pub fn hex(&self) -> &'static [&'static str] {
        match self {
            Self::Ndvi => &NDVI_PALETTE,
            Self::Water => &WATER_PALETTE,
            Self::Divergent => &DIVERGENT_PALETTE,
            Self::Grayscale => &GRAYSCALE_PALETTE,
        }
    }

    pub fn palette(&self) -> Palette {
        Palette::from_static(self.hex())
    }
}

impl FromStr for ColorScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|scheme| scheme.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidParameter {
                name: "scheme",
                value: s.to_string(),
                reason: "expected one of ndvi, water, divergent, grayscale".into(),
            })
    }
}
