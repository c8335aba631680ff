//! The two masking strategies and the band-presence rule that picks one

use super::CloudMaskParams;
use std::collections::BTreeSet;
use verdure_core::image::RasterImage;

/// How a scene's clear-sky pixels are identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskStrategy {
    /// Valid where none of `bits` is set in the QA band
    Bitmask { band: String, bits: u64 },
    /// Valid where the classification band holds one of `valid_classes`
    Classification {
        band: String,
        valid_classes: BTreeSet<u16>,
    },
}

impl MaskStrategy {
    /// Bitmask strategy rejecting any of the given bit positions
    pub fn bitmask(band: impl Into<String>, positions: &[u32]) -> Self {
        let bits = positions
            .iter()
            .filter(|&&p| p < 64)
            .fold(0u64, |acc, &p| acc | (1u64 << p));
        MaskStrategy::Bitmask {
            band: band.into(),
            bits,
        }
    }

    pub fn classification(band: impl Into<String>, valid_classes: BTreeSet<u16>) -> Self {
        MaskStrategy::Classification {
            band: band.into(),
            valid_classes,
        }
    }

    /// The band this strategy reads
    pub fn band_name(&self) -> &str {
        match self {
            MaskStrategy::Bitmask { band, .. } | MaskStrategy::Classification { band, .. } => band,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MaskStrategy::Bitmask { .. } => "bitmask",
            MaskStrategy::Classification { .. } => "classification",
        }
    }

    /// Whether a (valid) quality sample marks a clear pixel. Quality values
    /// are integers; anything negative or fractional is rejected.
    #[inline]
    pub fn accepts(&self, quality: f64) -> bool {
        if !quality.is_finite() || quality < 0.0 || quality.fract() != 0.0 {
            return false;
        }
        match self {
            MaskStrategy::Bitmask { bits, .. } => (quality as u64) & bits == 0,
            MaskStrategy::Classification { valid_classes, .. } => {
                quality <= u16::MAX as f64 && valid_classes.contains(&(quality as u16))
            }
        }
    }
}

/// Pick the strategy for one scene: bitmask when the QA band is present,
/// classification otherwise
pub fn select_strategy(image: &RasterImage, params: &CloudMaskParams) -> MaskStrategy {
    if image.has_band(&params.qa_band) {
        MaskStrategy::bitmask(params.qa_band.clone(), &params.qa_bits)
    } else {
        MaskStrategy::classification(
            params.classification_band.clone(),
            params.valid_classes.clone(),
        )
    }
}
