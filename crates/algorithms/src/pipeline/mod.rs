//! End-to-end compositing pipeline
//!
//! [`run`] queries an [`ImageSource`](verdure_core::ImageSource) and
//! [`run_collection`] processes an in-memory collection. Both return the
//! annual raster, the monthly composites and a [`PipelineReport`].

mod config;
mod report;
mod run;

pub use config::PipelineConfig;
pub use report::{MonthReport, MonthStatus, PipelineReport, Stage, StageFailure};
pub use run::{run, run_collection, PipelineOutput};
