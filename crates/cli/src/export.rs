//! Background GeoTIFF export with a start/poll task handle

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info};
use verdure_algorithms::resample::{resample, ResampleMethod, ResampleParams};
use verdure_core::crs::METERS_PER_DEGREE;
use verdure_core::io::write_masked_geotiff;
use verdure_core::{BBox, MaskedRaster, Projection};

/// Output container of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileFormat {
    #[default]
    GeoTIFF,
}

impl FromStr for FileFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "geotiff" | "tif" | "tiff" => Ok(Self::GeoTIFF),
            other => bail!("unsupported export format '{other}' (only GeoTIFF is available)"),
        }
    }
}

/// Where and how an export is written.
///
/// `region` is in longitude/latitude degrees and is reprojected into the
/// raster's CRS before clipping. `scale` is in metres per pixel; the raster is
/// resampled when it differs from the raster's own pixel size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportParams {
    pub description: String,
    pub folder: PathBuf,
    pub file_name_prefix: String,
    pub scale: f64,
    pub region: BBox,
    pub file_format: FileFormat,
    pub max_pixels: u64,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            description: "NDVI_Annual_Mean_Export".into(),
            folder: PathBuf::from("GEE_Exports"),
            file_name_prefix: "NDVI_mean_2023".into(),
            scale: 10.0,
            region: BBox::new(48.180, 30.859, 48.364, 31.080),
            file_format: FileFormat::GeoTIFF,
            max_pixels: 10_000_000_000,
        }
    }
}

impl ExportParams {
    /// `<folder>/<file_name_prefix>.tif`
    pub fn output_path(&self) -> PathBuf {
        self.folder.join(format!("{}.tif", self.file_name_prefix))
    }
}

/// Lifecycle of an [`ExportTask`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Completed(PathBuf),
    Failed(String),
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "READY"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed(path) => write!(f, "COMPLETED ({})", path.display()),
            Self::Failed(msg) => write!(f, "FAILED ({msg})"),
        }
    }
}

/// Handle for a single export.
///
/// Created in [`TaskState::Ready`]; [`start`](Self::start) prepares the
/// raster on the calling thread and writes it on a worker thread.
pub struct ExportTask {
    raster: MaskedRaster,
    params: ExportParams,
    state: Arc<Mutex<TaskState>>,
    worker: Option<JoinHandle<()>>,
}

impl ExportTask {
    pub fn new(raster: MaskedRaster, params: ExportParams) -> Self {
        Self {
            raster,
            params,
            state: Arc::new(Mutex::new(TaskState::Ready)),
            worker: None,
        }
    }

    pub fn params(&self) -> &ExportParams {
        &self.params
    }

    /// Clip, check the pixel budget and begin writing.
    ///
    /// Preparation errors are returned directly and leave the task `Ready`;
    /// write errors surface later as [`TaskState::Failed`].
    pub fn start(&mut self) -> Result<()> {
        if self.poll() != TaskState::Ready {
            bail!("export '{}' was already started", self.params.description);
        }

        let prepared = prepare(&self.raster, &self.params)
            .with_context(|| format!("Failed to prepare export '{}'", self.params.description))?;
        let path = self.params.output_path();
        info!(
            task = %self.params.description,
            path = %path.display(),
            rows = prepared.rows(),
            cols = prepared.cols(),
            "export started"
        );

        set_state(&self.state, TaskState::Running);
        let state = Arc::clone(&self.state);
        self.worker = Some(std::thread::spawn(move || {
            let outcome = write_export(&prepared, &path);
            let next = match outcome {
                Ok(()) => TaskState::Completed(path),
                Err(e) => TaskState::Failed(format!("{e:#}")),
            };
            debug!(state = %next, "export finished");
            set_state(&state, next);
        }));
        Ok(())
    }

    /// Current state, without blocking on the worker
    pub fn poll(&self) -> TaskState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Block until the worker finishes and return the final state
    pub fn wait(&mut self) -> TaskState {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                set_state(&self.state, TaskState::Failed("export worker panicked".into()));
            }
        }
        self.poll()
    }
}

fn set_state(state: &Mutex<TaskState>, next: TaskState) {
    match state.lock() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}

fn write_export(raster: &MaskedRaster, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    write_masked_geotiff(raster, path).context("Failed to write GeoTIFF")
}

/// Resample to the export scale if needed, clip to the region and enforce
/// `max_pixels`.
fn prepare(raster: &MaskedRaster, params: &ExportParams) -> Result<MaskedRaster> {
    params.region.validate()?;
    if !params.scale.is_finite() || params.scale <= 0.0 {
        bail!("export scale must be a positive number of metres, got {}", params.scale);
    }

    let crs = raster.crs().context("raster has no CRS")?;
    let projection = Projection::from_crs(crs)?;
    let epsg = crs.epsg().context("raster CRS has no EPSG code")?;

    let current_scale = if projection.is_geographic() {
        raster.transform().cell_size() * METERS_PER_DEGREE
    } else {
        raster.transform().cell_size()
    };
    let scaled;
    let source = if (current_scale - params.scale).abs() > 1e-6 * params.scale {
        debug!(from = current_scale, to = params.scale, "resampling for export");
        scaled = resample(
            raster,
            &ResampleParams {
                target_epsg: epsg,
                scale: params.scale,
                method: ResampleMethod::Nearest,
                max_pixels: params.max_pixels,
            },
        )?;
        &scaled
    } else {
        raster
    };

    let region = params
        .region
        .reproject(&Projection::Geographic, &projection, 21)
        .context("region cannot be expressed in the raster CRS")?;
    let clipped = source.clip(&region)?;

    let pixels = (clipped.rows() * clipped.cols()) as u64;
    if pixels > params.max_pixels {
        bail!(
            "export of {pixels} pixels exceeds max_pixels = {}",
            params.max_pixels
        );
    }
    Ok(clipped)
}
