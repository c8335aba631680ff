//! # Verdure Algorithms
//!
//! Per-pixel stages of the annual vegetation-index compositing pipeline.
//!
//! ## Modules
//!
//! - **masking**: QA bitmask / scene-classification cloud masking
//! - **imagery**: normalized-difference spectral indices (NDVI and friends)
//! - **compositing**: monthly quality mosaic and annual mean
//! - **resample**: nearest / bilinear resampling onto a target CRS and scale
//! - **pipeline**: configuration, orchestration and run report

pub mod compositing;
pub mod imagery;
pub mod masking;
mod maybe_rayon;
pub mod pipeline;
pub mod resample;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::compositing::{
        aggregate, composite_months, quality_mosaic, AggregateParams, AnnualAggregator, AnnualRaster,
        CompositeParams, MonthlyComposite, MonthlyCompositor,
    };
    pub use crate::imagery::{compute_index, normalized_difference, IndexCompute, IndexParams, SpectralIndex};
    pub use crate::masking::{mask_clouds, select_strategy, CloudMask, CloudMaskParams, MaskStrategy};
    pub use crate::pipeline::{run, run_collection, PipelineConfig, PipelineOutput, PipelineReport};
    pub use crate::resample::{resample, ResampleMethod, ResampleParams};
    pub use verdure_core::prelude::*;
}
