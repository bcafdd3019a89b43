//! Wavelet-based grain-size distributions from images of granular material.
//!
//! This crate provides tools for:
//! - Loading images as grayscale intensity grids
//! - Scan-line Morlet wavelet power spectra of image texture
//! - Calibrating wavelet scale to physical grain diameter
//! - Normalised grain-size distributions with percentiles and moments
//! - Parallel batch runs over directories of images
//!
//! # Example
//!
//! ```no_run
//! use grainsize_pipeline::{core::loaders::load_image, processors::pipeline::analyse_image, PipelineConfig};
//! use std::path::Path;
//!
//! let mut config = PipelineConfig::default();
//! config.calibration.resolution = Some(0.05);
//! let image = load_image(Path::new("sand.jpg"), None).unwrap();
//! let report = analyse_image(&image, &config).unwrap();
//! println!("D50 = {:.3} {}", report.distribution.median(), report.distribution.unit());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod processors;
pub mod visualization;

pub use config::{
    BatchConfig, CalibrationConfig, DistributionConfig, PipelineConfig, PreprocessConfig,
    SpectrumConfig,
};
pub use core::loaders::IntensityImage;
pub use error::AnalysisError;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
