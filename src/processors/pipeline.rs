//! Single-image analysis: intensity grid in, grain-size distribution out.
//!
//! Stages run in a fixed order: resolution, preprocessing, scale selection,
//! wavelet spectrum, calibration, distribution. The function is pure with
//! respect to its inputs and safe to call from many threads at once.

use crate::config::{PipelineConfig, PreprocessConfig, SpectrumConfig};
use crate::core::loaders::IntensityImage;
use crate::core::transforms::{crop_central, flatten_illumination};
use crate::error::{AnalysisError, Result};

use super::calibration::calibrate;
use super::distribution::{build_distribution, GrainSizeDistribution};
use super::rescale::{resolve_or_fallback, Resolution};
use super::spectrum::{
    compute_power_spectrum, required_span, sampled_span, PowerSpectrum, GRAINS_PER_LINE,
    MIN_LINE_LENGTH,
};
use super::wavelet::WaveletScaleSet;

/// Smallest grain diameter analysed when none is configured.
pub const DEFAULT_MIN_DIAMETER_PX: f64 = 3.0;

/// Features below two pixels cannot be resolved on the sampling grid.
pub const MIN_RESOLVABLE_DIAMETER_PX: f64 = 2.0;

/// Everything produced for one image.
#[derive(Debug, Clone)]
pub struct GrainSizeReport {
    pub source: String,
    pub resolution: Resolution,
    pub spectrum: PowerSpectrum,
    pub distribution: GrainSizeDistribution,
}

/// Apply the configured crop and illumination correction.
pub fn preprocess(image: &IntensityImage, config: &PreprocessConfig) -> IntensityImage {
    let mut working = if config.crop_central {
        crop_central(image)
    } else {
        image.clone()
    };
    if config.flatten_illumination {
        working = flatten_illumination(&working);
    }
    working
}

/// Diameter range to analyse, in working pixels.
///
/// Configured bounds are in output units and converted with the
/// resolution; the default upper bound is a third of the sampled span.
pub fn diameter_range_px(
    config: &SpectrumConfig,
    resolution: &Resolution,
    span: usize,
) -> Result<(f64, f64)> {
    let per_pixel = resolution.per_pixel();
    let min_px = config
        .min_diameter
        .map(|d| d / per_pixel)
        .unwrap_or(DEFAULT_MIN_DIAMETER_PX);
    if min_px < MIN_RESOLVABLE_DIAMETER_PX {
        return Err(AnalysisError::invalid(
            "min_diameter",
            format!(
                "{:.3} px is below the {} px sampling limit",
                min_px, MIN_RESOLVABLE_DIAMETER_PX
            ),
        ));
    }

    // One scale step above the minimum is the narrowest usable range.
    let notes = config.notes.max(1) as f64;
    let smallest_max = min_px * 2f64.powf(1.0 / notes);

    match config.max_diameter {
        Some(d) => {
            let max_px = d / per_pixel;
            if max_px < smallest_max {
                return Err(AnalysisError::invalid(
                    "max_diameter",
                    format!(
                        "{:.3} px leaves less than one scale step above {:.3} px",
                        max_px, min_px
                    ),
                ));
            }
            Ok((min_px, max_px))
        }
        None => {
            let max_px = span as f64 / GRAINS_PER_LINE;
            if max_px < smallest_max {
                return Err(AnalysisError::InputSize {
                    available: span,
                    required: required_span(smallest_max),
                });
            }
            Ok((min_px, max_px))
        }
    }
}

/// Estimate the grain-size distribution of one image.
///
/// # Errors
///
/// Any [`AnalysisError`]: bad configuration, missing calibration when
/// physical units are required, an image too small for the scale range,
/// or a texture-free image.
pub fn analyse_image(image: &IntensityImage, config: &PipelineConfig) -> Result<GrainSizeReport> {
    config.validate()?;
    let source = image.name();

    if image.is_empty() {
        return Err(AnalysisError::InputSize {
            available: 0,
            required: MIN_LINE_LENGTH,
        });
    }

    let resolution = resolve_or_fallback(&config.calibration, image.scale_factor())?;
    if !resolution.is_physical() {
        log::warn!("{}: no resolution available, reporting diameters in pixels", source);
    }

    let working = preprocess(image, &config.preprocessing);
    let span = sampled_span(&working, config.spectrum.axes);
    let (min_px, max_px) = diameter_range_px(&config.spectrum, &resolution, span)?;
    let scales = WaveletScaleSet::for_diameters(min_px, max_px, config.spectrum.notes)?;
    log::debug!(
        "{}: {}x{} working image, {} scales over {:.2}..{:.2} px",
        source,
        working.height(),
        working.width(),
        scales.len(),
        min_px,
        max_px
    );

    let spectrum = compute_power_spectrum(&working, &scales, &config.spectrum)?;
    let calibrated = calibrate(&spectrum, &resolution);
    let distribution = build_distribution(&calibrated, &config.distribution)?;

    log::info!(
        "{}: mean {:.4} {}, D50 {:.4}, sorting {:.4} ({} lines)",
        source,
        distribution.mean(),
        distribution.unit(),
        distribution.median(),
        distribution.sorting(),
        spectrum.lines_used()
    );

    Ok(GrainSizeReport {
        source,
        resolution,
        spectrum,
        distribution,
    })
}
