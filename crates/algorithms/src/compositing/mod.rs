//! Temporal compositing
//!
//! - **monthly**: per-pixel maximum of an index band within each calendar
//!   month window (quality mosaic)
//! - **annual**: per-pixel mean of the monthly composites

mod annual;
mod monthly;

pub use annual::{aggregate, annual_mean, mean_composite, AggregateParams, AnnualAggregator, AnnualRaster};
pub use monthly::{
    composite_months, composite_window, quality_mosaic, CompositeParams, MonthlyComposite,
    MonthlyCompositor,
};
