//! Command-line interface for the grain-size pipeline.

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{ReferenceScale, ScanAxes};
use crate::core::loaders::list_images;
use crate::processors::batch::{self, ImageOutcome};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "grainsize")]
#[command(about = "Wavelet-based grain-size distributions from images", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse every image in a directory
    Batch {
        /// Directory containing images
        directory: PathBuf,
        /// Number of worker threads
        #[arg(short, long)]
        workers: Option<usize>,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Analyse a single image
    Analyse {
        /// Image file
        image: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Output YAML path
        #[arg(default_value = "grainsize.yaml")]
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AxesArg {
    Rows,
    Columns,
    Both,
}

impl From<AxesArg> for ScanAxes {
    fn from(value: AxesArg) -> Self {
        match value {
            AxesArg::Rows => ScanAxes::Rows,
            AxesArg::Columns => ScanAxes::Columns,
            AxesArg::Both => ScanAxes::Both,
        }
    }
}

/// Overrides applied on top of the YAML configuration.
#[derive(Args)]
struct AnalysisArgs {
    /// Physical length per pixel
    #[arg(short, long)]
    resolution: Option<f64>,
    /// Physical length of a reference object in the image
    #[arg(long, requires = "reference_pixels")]
    reference_length: Option<f64>,
    /// Length of the reference object in pixels
    #[arg(long, requires = "reference_length")]
    reference_pixels: Option<f64>,
    /// Unit label for physical lengths
    #[arg(long)]
    unit: Option<String>,
    /// Fail instead of reporting in pixels when no resolution is known
    #[arg(long)]
    require_physical: bool,
    /// Scan lines sampled per axis
    #[arg(short, long)]
    density: Option<usize>,
    /// Scan-line orientation
    #[arg(long, value_enum)]
    axes: Option<AxesArg>,
    /// Smallest grain diameter to resolve (output units)
    #[arg(long)]
    min_diameter: Option<f64>,
    /// Largest grain diameter to resolve (output units)
    #[arg(long)]
    max_diameter: Option<f64>,
    /// Downscale images so the longest side is at most this many pixels
    #[arg(long)]
    max_dimension: Option<u32>,
    /// Skip central square crop
    #[arg(long)]
    no_crop: bool,
    /// Skip illumination flattening
    #[arg(long)]
    no_flatten: bool,
    /// Kaiser taper shape applied across the spectrum
    #[arg(long)]
    taper_beta: Option<f64>,
    /// Output directory (defaults to <input>/outputs)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Write a PNG plot of each distribution
    #[arg(long)]
    plot: bool,
}

impl AnalysisArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(res) = self.resolution {
            config.calibration.resolution = Some(res);
        }
        if let (Some(length), Some(pixels)) = (self.reference_length, self.reference_pixels) {
            config.calibration.reference = Some(ReferenceScale { length, pixels });
        }
        if let Some(unit) = &self.unit {
            config.calibration.unit = unit.clone();
        }
        if self.require_physical {
            config.calibration.require_physical = true;
        }
        if let Some(density) = self.density {
            config.spectrum.density = density;
        }
        if let Some(axes) = self.axes {
            config.spectrum.axes = axes.into();
        }
        if let Some(d) = self.min_diameter {
            config.spectrum.min_diameter = Some(d);
        }
        if let Some(d) = self.max_diameter {
            config.spectrum.max_diameter = Some(d);
        }
        if let Some(m) = self.max_dimension {
            config.preprocessing.max_dimension = Some(m);
        }
        if self.no_crop {
            config.preprocessing.crop_central = false;
        }
        if self.no_flatten {
            config.preprocessing.flatten_illumination = false;
        }
        if let Some(beta) = self.taper_beta {
            config.distribution.taper_beta = Some(beta);
        }
        if let Some(dir) = &self.output_dir {
            config.batch.output_dir = Some(dir.clone());
        }
        if self.plot {
            config.batch.plot = true;
        }
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Batch {
            directory,
            workers,
            analysis,
        } => {
            analysis.apply(&mut config);
            if let Some(w) = workers {
                config.batch.workers = w;
            }
            cmd_batch(&directory, &config);
        }
        Commands::Analyse { image, analysis } => {
            analysis.apply(&mut config);
            cmd_analyse(&image, &config);
        }
        Commands::InitConfig { path } => cmd_init_config(&path, &config),
    }
}

fn cmd_batch(directory: &Path, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Analysing images in batch mode...");
    println!("Input directory: {}", directory.display());
    println!("Workers: {}", config.batch.workers);

    let count = list_images(directory, &config.batch.extensions)
        .map(|files| files.len())
        .unwrap_or(0);
    let progress = create_progress_bar(count as u64);

    let result = batch::process_directory(directory, config, None, |outcome: &ImageOutcome| {
        let name = outcome
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        progress.set_message(name);
        progress.inc(1);
    });
    progress.finish_and_clear();

    match result {
        Ok(summary) => {
            print_summary(
                "Batch Analysis Complete",
                &[
                    ("Input directory", directory.display().to_string()),
                    ("Output directory", summary.output_dir.display().to_string()),
                    ("Images", summary.outcomes.len().to_string()),
                    ("Succeeded", summary.succeeded().to_string()),
                    ("Failed", summary.failed().to_string()),
                    ("Skipped", summary.skipped().to_string()),
                    ("Summary CSV", summary.summary_path.display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
            if summary.succeeded() == 0 {
                error!("No image produced a distribution");
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Batch analysis failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_analyse(image: &Path, config: &PipelineConfig) {
    let start = Instant::now();

    let output_dir = config.batch.output_dir.clone().unwrap_or_else(|| {
        image
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("outputs")
    });

    println!("Analysing single image...");
    println!("Input: {}", image.display());
    println!("Output directory: {}", output_dir.display());

    let spinner = create_spinner("Computing wavelet spectrum...");

    match batch::process_image_file(image, &output_dir, config) {
        Ok(success) => {
            spinner.finish_and_clear();

            let dist = &success.report.distribution;
            let unit = dist.unit().to_string();
            let mut items = vec![
                ("Input file", image.display().to_string()),
                ("Unit", unit.clone()),
                ("Scan lines used", success.report.spectrum.lines_used().to_string()),
                ("Mean", format!("{:.4} {}", dist.mean(), unit)),
                ("D50", format!("{:.4} {}", dist.median(), unit)),
                ("Mode", format!("{:.4} {}", dist.mode(), unit)),
                ("Sorting", format!("{:.4} {}", dist.sorting(), unit)),
                ("Skewness", format!("{:.4}", dist.statistics().skewness)),
            ];
            for path in &success.outputs {
                items.push(("Output", path.display().to_string()));
            }
            items.push(("Duration", format!("{:.2?}", start.elapsed())));
            print_summary("Analysis Complete", &items);
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Analysis failed ({}): {:#}", batch::FailureKind::classify(&e).as_str(), e);
            std::process::exit(1);
        }
    }
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) {
    match config.to_yaml(path) {
        Ok(()) => println!("Wrote configuration to {}", path.display()),
        Err(e) => {
            error!("Failed to write config to {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
