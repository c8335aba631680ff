//! Verdure CLI - annual vegetation index composites from scene manifests

mod export;
mod preview;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use export::{ExportParams, ExportTask, FileFormat, TaskState};
use verdure_algorithms::imagery::{IndexParams, SpectralIndex};
use verdure_algorithms::pipeline::{run, PipelineConfig, PipelineOutput};
use verdure_algorithms::resample::ResampleMethod;
use verdure_colormap::{ColorScheme, VisParams};
use verdure_core::io::{read_geotiff, ManifestSource};
use verdure_core::raster::MaskedStatistics;
use verdure_core::{BBox, MaskedRaster, Raster};
use verdure_parallel::ProcessingMode;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "verdure")]
#[command(author, version, about = "Cloud-masked annual NDVI composites", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the compositing pipeline over a scene manifest and export the result
    Run(RunArgs),
    /// Print the effective pipeline configuration as JSON
    Config {
        /// JSON config file to start from (defaults otherwise)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Render a single-band GeoTIFF as a PNG preview
    Preview {
        /// Input raster file
        input: PathBuf,
        /// Output PNG file
        output: PathBuf,
        #[command(flatten)]
        vis: VisArgs,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Scene manifest (JSON)
    manifest: PathBuf,
    /// JSON pipeline config; command-line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Area of interest as min_lon,min_lat,max_lon,max_lat
    #[arg(long, value_parser = parse_bbox)]
    aoi: Option<BBox>,
    /// First date included (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,
    /// First date excluded (YYYY-MM-DD)
    #[arg(long)]
    end: Option<String>,
    /// Month of the first composite window (1-12)
    #[arg(long)]
    start_month: Option<u32>,
    /// Output pixel size in metres
    #[arg(long)]
    scale: Option<f64>,
    /// Output CRS as an EPSG code
    #[arg(long)]
    crs: Option<u32>,
    /// Resampling method: nearest, bilinear
    #[arg(long)]
    resampling: Option<String>,
    /// Spectral index: NDVI, NDWI, MNDWI, NBR, NDRE, GNDVI
    #[arg(long)]
    index: Option<String>,
    /// Process in square tiles of this many pixels
    #[arg(long)]
    tile_size: Option<usize>,
    /// Worker threads (0 = sequential)
    #[arg(long)]
    threads: Option<usize>,
    /// Export folder
    #[arg(long, default_value = "GEE_Exports")]
    folder: PathBuf,
    /// Export file name prefix
    #[arg(long, default_value = "NDVI_mean_2023")]
    prefix: String,
    /// Export task description
    #[arg(long, default_value = "NDVI_Annual_Mean_Export")]
    description: String,
    /// Export file format
    #[arg(long, default_value = "GeoTIFF")]
    format: String,
    /// Largest number of pixels the export may write
    #[arg(long, default_value_t = 10_000_000_000)]
    max_pixels: u64,
    /// Also write each monthly composite next to the annual export
    #[arg(long)]
    monthly: bool,
    /// Write a PNG preview of the annual composite
    #[arg(long)]
    preview: Option<PathBuf>,
    #[command(flatten)]
    vis: VisArgs,
}

#[derive(clap::Args)]
struct VisArgs {
    /// Value mapped to the first palette colour
    #[arg(long, default_value = "0.0")]
    min: f64,
    /// Value mapped to the last palette colour
    #[arg(long, default_value = "0.8")]
    max: f64,
    /// Palette: ndvi, water, divergent, grayscale
    #[arg(long, default_value = "ndvi")]
    scheme: String,
}

impl VisArgs {
    fn to_params(&self) -> Result<VisParams> {
        let scheme: ColorScheme = self.scheme.parse()?;
        let vis = VisParams::with_range(self.min, self.max, &scheme.palette());
        vis.validate()?;
        Ok(vis)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn parse_bbox(s: &str) -> std::result::Result<BBox, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("invalid coordinate '{p}': {e}")))
        .collect::<std::result::Result<_, _>>()?;
    match parts[..] {
        [min_x, min_y, max_x, max_y] => BBox::try_new(min_x, min_y, max_x, max_y).map_err(|e| e.to_string()),
        _ => Err(format!("expected 4 comma-separated values, got {}", parts.len())),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn apply_overrides(config: &mut PipelineConfig, args: &RunArgs) -> Result<()> {
    if let Some(aoi) = args.aoi {
        config.aoi = aoi;
    }
    if let Some(start) = &args.start {
        config.start_date = start.clone();
    }
    if let Some(end) = &args.end {
        config.end_date = end.clone();
    }
    if args.start_month.is_some() {
        config.start_month = args.start_month;
    }
    if let Some(scale) = args.scale {
        config.scale = scale;
    }
    if let Some(crs) = args.crs {
        config.crs = crs;
    }
    if let Some(method) = &args.resampling {
        config.resampling = method.parse::<ResampleMethod>()?;
    }
    if let Some(name) = &args.index {
        let index: SpectralIndex = name.parse()?;
        config.index = IndexParams::for_index(index);
    }
    if args.tile_size.is_some() {
        config.tile_size = args.tile_size;
    }
    if let Some(threads) = args.threads {
        config.processing = match threads {
            0 => ProcessingMode::Sequential,
            n => ProcessingMode::ParallelWith(n),
        };
    }
    config.validate().context("Invalid pipeline configuration")
}

fn print_statistics(label: &str, stats: &MaskedStatistics) {
    println!("{label}:");
    match (stats.min, stats.max, stats.mean) {
        (Some(min), Some(max), Some(mean)) => {
            println!("  Min: {:.4}", min);
            println!("  Max: {:.4}", max);
            println!("  Mean: {:.4}", mean);
        }
        _ => println!("  (no valid pixels)"),
    }
    println!(
        "  Valid cells: {} / {} ({:.1}%)",
        stats.valid_count,
        stats.total_count,
        100.0 * stats.coverage()
    );
}

fn read_masked(path: &Path) -> Result<MaskedRaster> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path).context("Failed to read raster")?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(MaskedRaster::from_raster(&raster))
}

/// Start an export and poll it until it finishes
fn export_raster(raster: MaskedRaster, params: ExportParams) -> Result<PathBuf> {
    let description = params.description.clone();
    let mut task = ExportTask::new(raster, params);
    task.start()?;

    let pb = spinner(&format!("Exporting {description}..."));
    loop {
        let state = task.poll();
        pb.set_message(format!("{description}: {state}"));
        if state.is_finished() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    pb.finish_and_clear();

    match task.wait() {
        TaskState::Completed(path) => Ok(path),
        TaskState::Failed(msg) => bail!("export '{description}' failed: {msg}"),
        other => bail!("export '{description}' ended in state {other}"),
    }
}

fn run_pipeline(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args)?;
    let vis = args.vis.to_params()?;
    let file_format: FileFormat = args.format.parse()?;

    let pb = spinner("Opening scene manifest...");
    let source = ManifestSource::open(&args.manifest)
        .with_context(|| format!("Failed to open manifest {}", args.manifest.display()))?
        .with_quality_bands([
            config.masking.qa_band.clone(),
            config.masking.classification_band.clone(),
        ]);
    pb.finish_and_clear();

    let start = Instant::now();
    let pb = spinner("Compositing...");
    let PipelineOutput {
        annual,
        composites,
        report,
    } = run(&source, &config).context("Pipeline failed")?;
    pb.finish_and_clear();

    println!("{report}");
    if report.is_degraded() {
        warn!(
            dropped = report.dropped_images().count(),
            failed_tiles = report.failed_tiles().count(),
            "run completed with degraded inputs"
        );
    }
    print_statistics(&format!("{} annual mean", annual.band_name()), &annual.statistics());

    let export_params = ExportParams {
        description: args.description.clone(),
        folder: args.folder.clone(),
        file_name_prefix: args.prefix.clone(),
        scale: config.scale,
        region: config.aoi,
        file_format,
        max_pixels: args.max_pixels,
    };

    if args.monthly {
        for composite in &composites {
            let params = ExportParams {
                description: format!("{}_{}", args.description, composite.window().label()),
                file_name_prefix: format!("{}_{}", args.prefix, composite.window().label()),
                ..export_params.clone()
            };
            // Monthly composites stay on the native grid
            let native = ExportParams {
                scale: native_scale(composite.data()),
                ..params
            };
            let path = export_raster(composite.data().clone(), native)?;
            info!(month = %composite.window().label(), path = %path.display(), "monthly composite written");
        }
    }

    if let Some(png) = &args.preview {
        preview::write_preview(annual.data(), &vis, Some(&config.aoi), png)
            .with_context(|| format!("Failed to write preview {}", png.display()))?;
        println!("Preview saved to: {}", png.display());
    }

    let path = export_raster(annual.data().clone(), export_params)?;
    println!("Annual composite saved to: {}", path.display());
    println!("  Processing time: {:.2?}", start.elapsed());
    Ok(())
}

/// Pixel size of `raster` in metres
fn native_scale(raster: &MaskedRaster) -> f64 {
    let cell = raster.transform().cell_size();
    match raster.crs() {
        Some(crs) if crs.is_geographic() => cell * verdure_core::crs::METERS_PER_DEGREE,
        _ => cell,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run(args) => run_pipeline(args)?,

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", config.to_json()?);
        }

        Commands::Info { input } => {
            let raster = read_masked(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.values().bounds();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, rows * cols);
            println!("Cell size: {}", raster.transform().cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            print_statistics("\nStatistics", &raster.statistics());
        }

        Commands::Preview { input, output, vis } => {
            let vis = vis.to_params()?;
            let raster = read_masked(&input)?;
            preview::write_preview(&raster, &vis, None, &output)
                .with_context(|| format!("Failed to write preview {}", output.display()))?;
            println!("Preview saved to: {}", output.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["verdure", "run", "scenes.json"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn bbox_argument() {
        let b = parse_bbox("48.18, 30.859, 48.364, 31.08").unwrap();
        assert_eq!(b.to_array(), [48.18, 30.859, 48.364, 31.08]);
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("3,2,1,4").is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let args = run_args(&[
            "--start", "2023-01-01",
            "--end", "2024-01-01",
            "--crs", "32639",
            "--index", "nbr",
            "--threads", "0",
            "--resampling", "bilinear",
        ]);
        let mut config = PipelineConfig::default();
        apply_overrides(&mut config, &args).unwrap();

        assert_eq!(config.start_date, "2023-01-01");
        assert_eq!(config.crs, 32639);
        assert_eq!(config.index.output_band, "NBR");
        assert_eq!(config.processing, ProcessingMode::Sequential);
        assert_eq!(config.resampling, ResampleMethod::Bilinear);
        // Untouched values keep their defaults
        assert_eq!(config.scale, 10.0);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = run_args(&["--start", "2024-05-01", "--end", "2024-04-01"]);
        let mut config = PipelineConfig::default();
        assert!(apply_overrides(&mut config, &args).is_err());
    }

    #[test]
    fn export_defaults_match_flags() {
        let args = run_args(&[]);
        let defaults = ExportParams::default();
        assert_eq!(args.folder, defaults.folder);
        assert_eq!(args.prefix, defaults.file_name_prefix);
        assert_eq!(args.description, defaults.description);
        assert_eq!(args.max_pixels, defaults.max_pixels);
        assert_eq!(args.vis.to_params().unwrap(), VisParams::default());
    }
}
