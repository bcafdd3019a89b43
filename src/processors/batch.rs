//! Directory batch runs.
//!
//! Every analysable image in a directory is processed independently on a
//! dedicated rayon pool. A failing image is recorded with its failure kind
//! and the run continues; results come back in input order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::loaders::{list_images, load_image, LoaderError};
use crate::core::writers::{
    write_batch_csv, write_distribution_csv, write_summary_csv, BatchRow, WriteError,
};
use crate::error::AnalysisError;
use crate::visualization::{plot_distribution, VisualizationError};

use super::pipeline::{analyse_image, GrainSizeReport};

/// Name of the per-run summary written to the output directory.
pub const BATCH_SUMMARY_FILE: &str = "batch_summary.csv";

/// Errors that stop a batch run before any image is processed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("No images found in {folder}")]
    NoImagesFound { folder: PathBuf },

    #[error("Failed to list images: {0}")]
    Loader(#[from] LoaderError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] AnalysisError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to write batch summary: {0}")]
    Write(#[from] WriteError),
}

/// Why one image produced no distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Load,
    Calibration,
    InputSize,
    Indeterminate,
    InvalidParameter,
    Output,
    /// Not started because the run was cancelled.
    Skipped,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Load => "load",
            FailureKind::Calibration => "calibration",
            FailureKind::InputSize => "input-size",
            FailureKind::Indeterminate => "indeterminate",
            FailureKind::InvalidParameter => "invalid-parameter",
            FailureKind::Output => "output",
            FailureKind::Skipped => "skipped",
        }
    }

    /// Classify a per-image error by the first recognised cause in its chain.
    pub fn classify(err: &anyhow::Error) -> FailureKind {
        for cause in err.chain() {
            if let Some(analysis) = cause.downcast_ref::<AnalysisError>() {
                return match analysis {
                    AnalysisError::Calibration(_) => FailureKind::Calibration,
                    AnalysisError::InputSize { .. } => FailureKind::InputSize,
                    AnalysisError::IndeterminateDistribution { .. } => FailureKind::Indeterminate,
                    AnalysisError::InvalidParameter { .. } => FailureKind::InvalidParameter,
                };
            }
            if cause.downcast_ref::<LoaderError>().is_some() {
                return FailureKind::Load;
            }
            if cause.downcast_ref::<WriteError>().is_some()
                || cause.downcast_ref::<VisualizationError>().is_some()
            {
                return FailureKind::Output;
            }
        }
        FailureKind::Output
    }
}

/// A successfully analysed image and the files written for it.
#[derive(Debug, Clone)]
pub struct ImageSuccess {
    pub path: PathBuf,
    pub report: GrainSizeReport,
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ImageFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Success(ImageSuccess),
    Failure(ImageFailure),
}

impl ImageOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ImageOutcome::Success(s) => &s.path,
            ImageOutcome::Failure(f) => &f.path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ImageOutcome::Success(_))
    }

    fn to_row(&self) -> BatchRow {
        let image = file_label(self.path());
        match self {
            ImageOutcome::Success(s) => {
                let dist = &s.report.distribution;
                BatchRow {
                    image,
                    status: "ok".to_string(),
                    unit: dist.unit().to_string(),
                    mean: Some(dist.mean()),
                    d50: Some(dist.median()),
                    sorting: Some(dist.sorting()),
                    error_kind: String::new(),
                    error: String::new(),
                }
            }
            ImageOutcome::Failure(f) => BatchRow {
                image,
                status: if f.kind == FailureKind::Skipped { "skipped" } else { "failed" }.to_string(),
                unit: String::new(),
                mean: None,
                d50: None,
                sorting: None,
                error_kind: f.kind.as_str().to_string(),
                error: f.message.clone(),
            },
        }
    }
}

/// Result of a whole directory run.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub outcomes: Vec<ImageOutcome>,
    pub output_dir: PathBuf,
    pub summary_path: PathBuf,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.count_failures(|kind| kind != FailureKind::Skipped)
    }

    pub fn skipped(&self) -> usize {
        self.count_failures(|kind| kind == FailureKind::Skipped)
    }

    fn count_failures(&self, pred: impl Fn(FailureKind) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ImageOutcome::Failure(f) if pred(f.kind)))
            .count()
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn percentile_label(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("D{:.0}", p)
    } else {
        format!("D{}", p)
    }
}

/// `statistic,value` rows describing one report.
pub fn summary_rows(report: &GrainSizeReport) -> Vec<(String, String)> {
    let dist = &report.distribution;
    let stats = dist.statistics();
    let mut rows = vec![
        ("unit".to_string(), dist.unit().to_string()),
        ("resolution".to_string(), format!("{}", report.resolution.per_pixel())),
        ("lines_used".to_string(), report.spectrum.lines_used().to_string()),
        ("mean".to_string(), format!("{:.6}", stats.mean)),
        ("sorting".to_string(), format!("{:.6}", stats.sorting)),
        ("skewness".to_string(), format!("{:.6}", stats.skewness)),
        ("kurtosis".to_string(), format!("{:.6}", stats.kurtosis)),
        ("mode".to_string(), format!("{:.6}", stats.mode)),
        ("geometric_sorting".to_string(), format!("{:.6}", stats.geometric_sorting)),
    ];
    rows.extend(
        stats
            .percentiles
            .iter()
            .map(|&(p, d)| (percentile_label(p), format!("{:.6}", d))),
    );
    rows
}

/// Load, analyse and write results for a single image file.
///
/// Writes `<stem>_psd.csv`, `<stem>_summary.csv` and, when plotting is
/// enabled, `<stem>_psd.png` into `output_dir`.
pub fn process_image_file(
    path: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<ImageSuccess> {
    let image = load_image(path, config.preprocessing.max_dimension)
        .with_context(|| format!("Failed to load image: {}", path.display()))?;
    let report = analyse_image(&image, config)
        .with_context(|| format!("Failed to analyse image: {}", path.display()))?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    let dist = &report.distribution;

    let psd_path = output_dir.join(format!("{}_psd.csv", stem));
    write_distribution_csv(&psd_path, dist.diameters(), dist.density(), dist.cumulative())
        .with_context(|| format!("Failed to write distribution: {}", psd_path.display()))?;

    let summary_path = output_dir.join(format!("{}_summary.csv", stem));
    write_summary_csv(&summary_path, &summary_rows(&report))
        .with_context(|| format!("Failed to write summary: {}", summary_path.display()))?;

    let mut outputs = vec![psd_path, summary_path];
    if config.batch.plot {
        let plot_path = output_dir.join(format!("{}_psd.png", stem));
        plot_distribution(&plot_path, dist)
            .with_context(|| format!("Failed to plot distribution: {}", plot_path.display()))?;
        outputs.push(plot_path);
    }

    Ok(ImageSuccess {
        path: path.to_path_buf(),
        report,
        outputs,
    })
}

/// Analyse every matching image in `dir`.
///
/// When given, `cancel` is checked before each image starts; images not yet
/// started when it is set are reported as skipped. `on_done` is called from
/// the worker threads as each image finishes.
pub fn process_directory<F>(
    dir: &Path,
    config: &PipelineConfig,
    cancel: Option<&AtomicBool>,
    on_done: F,
) -> std::result::Result<BatchSummary, BatchError>
where
    F: Fn(&ImageOutcome) + Sync,
{
    config.validate()?;

    let images = list_images(dir, &config.batch.extensions)?;
    if images.is_empty() {
        return Err(BatchError::NoImagesFound {
            folder: dir.to_path_buf(),
        });
    }

    let output_dir = config
        .batch
        .output_dir
        .clone()
        .unwrap_or_else(|| dir.join("outputs"));
    log::info!(
        "Processing {} images from {} with {} workers",
        images.len(),
        dir.display(),
        config.batch.workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.batch.workers)
        .build()?;

    let outcomes: Vec<ImageOutcome> = pool.install(|| {
        images
            .par_iter()
            .map(|path| {
                let cancelled = cancel.is_some_and(|flag| flag.load(Ordering::Relaxed));
                let outcome = if cancelled {
                    ImageOutcome::Failure(ImageFailure {
                        path: path.clone(),
                        kind: FailureKind::Skipped,
                        message: "batch cancelled".to_string(),
                    })
                } else {
                    match process_image_file(path, &output_dir, config) {
                        Ok(success) => ImageOutcome::Success(success),
                        Err(e) => {
                            let kind = FailureKind::classify(&e);
                            log::warn!("{} ({}): {:#}", path.display(), kind.as_str(), e);
                            ImageOutcome::Failure(ImageFailure {
                                path: path.clone(),
                                kind,
                                message: format!("{:#}", e),
                            })
                        }
                    }
                };
                on_done(&outcome);
                outcome
            })
            .collect()
    });

    let rows: Vec<BatchRow> = outcomes.iter().map(ImageOutcome::to_row).collect();
    let summary_path = output_dir.join(BATCH_SUMMARY_FILE);
    write_batch_csv(&summary_path, &rows)?;

    let summary = BatchSummary {
        outcomes,
        output_dir,
        summary_path,
    };
    log::info!(
        "Batch finished: {} succeeded, {} failed, {} skipped",
        summary.succeeded(),
        summary.failed(),
        summary.skipped()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::f64::consts::PI;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn write_texture(dir: &Path, name: &str, period: f64) -> PathBuf {
        let path = dir.join(name);
        let img = GrayImage::from_fn(128, 128, |x, y| {
            let v = 128.0
                + 50.0 * (2.0 * PI * x as f64 / period).sin()
                + 50.0 * (2.0 * PI * y as f64 / period).sin();
            Luma([v.round() as u8])
        });
        img.save(&path).unwrap();
        path
    }

    fn write_flat(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        GrayImage::from_pixel(96, 96, Luma([120u8])).save(&path).unwrap();
        path
    }

    fn resolved_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.calibration.resolution = Some(0.1);
        config.batch.workers = 2;
        config
    }

    #[test]
    fn test_corrupt_image_does_not_stop_batch() {
        let dir = TempDir::new().unwrap();
        write_texture(dir.path(), "a.png", 8.0);
        write_texture(dir.path(), "b.png", 10.0);
        write_texture(dir.path(), "d.png", 12.0);
        fs::write(dir.path().join("c.png"), b"definitely not a png").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let cancel = AtomicBool::new(false);
        let done = AtomicUsize::new(0);
        let summary = process_directory(dir.path(), &resolved_config(), Some(&cancel), |_| {
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(summary.outcomes.len(), 4);
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.failed(), 1);
        assert_eq!(done.load(Ordering::SeqCst), 4);

        // Input order is preserved.
        let names: Vec<String> = summary.outcomes.iter().map(|o| file_label(o.path())).collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png", "d.png"]);
        match &summary.outcomes[2] {
            ImageOutcome::Failure(f) => assert_eq!(f.kind, FailureKind::Load),
            other => panic!("Expected failure, got {:?}", other),
        }

        let out = dir.path().join("outputs");
        assert!(out.join("a_psd.csv").exists());
        assert!(out.join("d_summary.csv").exists());
        assert!(!out.join("c_psd.csv").exists());

        let batch = fs::read_to_string(&summary.summary_path).unwrap();
        let lines: Vec<&str> = batch.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("image,status,unit,mean,d50,sorting"));
        assert!(lines[3].starts_with("c.png,failed,"));
        assert!(lines[3].contains(",load,"));
    }

    #[test]
    fn test_texture_free_image_is_classified() {
        let dir = TempDir::new().unwrap();
        write_texture(dir.path(), "grains.png", 8.0);
        write_flat(dir.path(), "blank.png");

        let summary = process_directory(dir.path(), &resolved_config(), None, |_| {}).unwrap();
        assert_eq!(summary.succeeded(), 1);
        let failure = summary
            .outcomes
            .iter()
            .find_map(|o| match o {
                ImageOutcome::Failure(f) => Some(f),
                _ => None,
            })
            .unwrap();
        assert_eq!(failure.kind, FailureKind::Indeterminate);
        assert!(failure.message.contains("blank.png"));
    }

    #[test]
    fn test_cancelled_batch_skips_everything() {
        let dir = TempDir::new().unwrap();
        write_texture(dir.path(), "a.png", 8.0);
        write_texture(dir.path(), "b.png", 8.0);

        let cancel = AtomicBool::new(true);
        let summary = process_directory(dir.path(), &resolved_config(), Some(&cancel), |_| {}).unwrap();
        assert_eq!(summary.skipped(), 2);
        assert_eq!(summary.succeeded(), 0);
        assert_eq!(summary.failed(), 0);

        let batch = fs::read_to_string(&summary.summary_path).unwrap();
        assert!(batch.lines().skip(1).all(|l| l.contains(",skipped,")));
    }

    #[test]
    fn test_plot_and_custom_output_dir() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_texture(dir.path(), "sample.PNG", 10.0);

        let mut config = resolved_config();
        config.batch.plot = true;
        config.batch.output_dir = Some(out.path().join("results"));

        let summary = process_directory(dir.path(), &config, None, |_| {}).unwrap();
        assert_eq!(summary.succeeded(), 1);
        let results = out.path().join("results");
        assert!(results.join("sample_psd.png").exists());
        assert!(results.join(BATCH_SUMMARY_FILE).exists());

        let summary_csv = fs::read_to_string(results.join("sample_summary.csv")).unwrap();
        assert!(summary_csv.starts_with("statistic,value\nunit,mm\n"));
        assert!(summary_csv.contains("\nD50,"));
        assert!(summary_csv.contains("\ngeometric_sorting,"));
    }

    #[test]
    fn test_worker_count_does_not_change_results() {
        let dir = TempDir::new().unwrap();
        write_texture(dir.path(), "a.png", 8.0);
        write_texture(dir.path(), "b.png", 11.0);
        write_texture(dir.path(), "c.png", 14.0);

        let mut serial = resolved_config();
        serial.batch.workers = 1;
        serial.batch.output_dir = Some(dir.path().join("serial"));
        let mut parallel = resolved_config();
        parallel.batch.workers = 4;
        parallel.batch.output_dir = Some(dir.path().join("parallel"));

        let one = process_directory(dir.path(), &serial, None, |_| {}).unwrap();
        let four = process_directory(dir.path(), &parallel, None, |_| {}).unwrap();
        assert_eq!(one.succeeded(), 3);
        assert_eq!(four.succeeded(), 3);

        for (a, b) in one.outcomes.iter().zip(&four.outcomes) {
            let (ImageOutcome::Success(a), ImageOutcome::Success(b)) = (a, b) else {
                panic!("Expected two successes");
            };
            assert_eq!(a.path, b.path);
            assert_eq!(a.report.distribution, b.report.distribution);

            let image = load_image(&a.path, serial.preprocessing.max_dimension).unwrap();
            let direct = analyse_image(&image, &serial).unwrap();
            assert_eq!(direct.distribution, a.report.distribution);
        }
    }

    #[test]
    fn test_missing_directory() {
        let result = process_directory(
            Path::new("/nonexistent/grain/images"),
            &PipelineConfig::default(),
            None,
            |_| {},
        );
        assert!(matches!(result, Err(BatchError::Loader(LoaderError::DirectoryNotFound(_)))));
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let result = process_directory(dir.path(), &PipelineConfig::default(), None, |_| {});
        assert!(matches!(result, Err(BatchError::NoImagesFound { .. })));
    }

    #[test]
    fn test_invalid_config_stops_before_listing() {
        let mut config = PipelineConfig::default();
        config.batch.workers = 0;
        let result = process_directory(Path::new("."), &config, None, |_| {});
        assert!(matches!(result, Err(BatchError::Config(_))));
    }

    #[test]
    fn test_classify_through_context() {
        let err = anyhow::Error::new(AnalysisError::Calibration("none".into())).context("Failed to analyse image: x.png");
        assert_eq!(FailureKind::classify(&err), FailureKind::Calibration);

        let err = anyhow::Error::new(LoaderError::EmptyImage(PathBuf::from("x.png"))).context("load");
        assert_eq!(FailureKind::classify(&err), FailureKind::Load);
    }

    #[test]
    fn test_percentile_labels() {
        assert_eq!(percentile_label(50.0), "D50");
        assert_eq!(percentile_label(2.5), "D2.5");
    }
}
