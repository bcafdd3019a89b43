//! Pixel-to-length resolution of an image.
//!
//! The resolution comes either from an explicit length-per-pixel value or
//! from a reference object of known length measured in pixels. When neither
//! is available the caller decides between failing and reporting in pixels.

use crate::config::CalibrationConfig;
use crate::error::{AnalysisError, Result};

/// Label used for results reported in pixel units.
pub const PIXEL_UNIT: &str = "px";

/// Length represented by one working pixel.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No physical calibration; diameters are reported in source-image
    /// pixels, `per_pixel` of them per working pixel.
    Pixels { per_pixel: f64 },
    /// `per_pixel` units of `unit` per pixel.
    Physical { per_pixel: f64, unit: String },
}

impl Resolution {
    /// Pixel units at the source image's own sampling.
    pub fn pixels() -> Resolution {
        Resolution::Pixels { per_pixel: 1.0 }
    }

    /// Length per working pixel.
    pub fn per_pixel(&self) -> f64 {
        match self {
            Resolution::Pixels { per_pixel } | Resolution::Physical { per_pixel, .. } => *per_pixel,
        }
    }

    pub fn unit(&self) -> &str {
        match self {
            Resolution::Pixels { .. } => PIXEL_UNIT,
            Resolution::Physical { unit, .. } => unit,
        }
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, Resolution::Physical { .. })
    }

    /// Resolution after the image was resampled by `factor`
    /// (working pixels per original pixel).
    pub fn rescaled(&self, factor: f64) -> Resolution {
        match self {
            Resolution::Pixels { per_pixel } => Resolution::Pixels {
                per_pixel: per_pixel / factor,
            },
            Resolution::Physical { per_pixel, unit } => Resolution::Physical {
                per_pixel: per_pixel / factor,
                unit: unit.clone(),
            },
        }
    }
}

/// Determine the resolution from the calibration settings.
///
/// An explicit resolution wins over a reference object.
///
/// # Errors
///
/// `Calibration` if neither is supplied; `InvalidParameter` if a supplied
/// value is not a positive finite length.
pub fn determine_resolution(config: &CalibrationConfig) -> Result<Resolution> {
    if let Some(per_pixel) = config.resolution {
        if !(per_pixel.is_finite() && per_pixel > 0.0) {
            return Err(AnalysisError::invalid(
                "resolution",
                format!("{} is not a positive length per pixel", per_pixel),
            ));
        }
        return Ok(Resolution::Physical {
            per_pixel,
            unit: config.unit.clone(),
        });
    }

    if let Some(reference) = config.reference {
        let usable = reference.length.is_finite()
            && reference.length > 0.0
            && reference.pixels.is_finite()
            && reference.pixels > 0.0;
        if !usable {
            return Err(AnalysisError::invalid(
                "reference",
                format!("length {} over {} px is not usable", reference.length, reference.pixels),
            ));
        }
        return Ok(Resolution::Physical {
            per_pixel: reference.length / reference.pixels,
            unit: config.unit.clone(),
        });
    }

    Err(AnalysisError::Calibration(
        "no resolution or reference scale supplied".to_string(),
    ))
}

/// Resolve the working resolution for an image downscaled by `scale_factor`,
/// falling back to pixel units unless physical units are required.
pub fn resolve_or_fallback(config: &CalibrationConfig, scale_factor: f64) -> Result<Resolution> {
    match determine_resolution(config) {
        Ok(resolution) => Ok(resolution.rescaled(scale_factor)),
        Err(AnalysisError::Calibration(reason)) if !config.require_physical => {
            log::debug!("{}; reporting in pixel units", reason);
            Ok(Resolution::pixels().rescaled(scale_factor))
        }
        Err(e) => Err(e),
    }
}
