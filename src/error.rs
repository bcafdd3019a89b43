//! Error taxonomy for the per-image analysis pipeline.

use thiserror::Error;

/// Errors raised while turning one image into a grain-size distribution.
///
/// Every variant is fatal for the image being analysed; batch runs record it
/// and move on to the next image.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// No resolution could be determined and none was supplied.
    #[error("calibration error: {0}")]
    Calibration(String),

    /// The image is too small for the requested scale range.
    #[error("image too small: {available} px available, {required} px required for the scale range")]
    InputSize { available: usize, required: usize },

    /// Total spectral power is zero (or numerically indistinguishable from it).
    #[error("indeterminate distribution: total spectral power {total:e} is not above {threshold:e}")]
    IndeterminateDistribution { total: f64, threshold: f64 },

    /// Malformed density, scale bound, percentile or similar parameter.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl AnalysisError {
    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Calibration(_) => "calibration",
            AnalysisError::InputSize { .. } => "input-size",
            AnalysisError::IndeterminateDistribution { .. } => "indeterminate-distribution",
            AnalysisError::InvalidParameter { .. } => "invalid-parameter",
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(AnalysisError::Calibration("x".into()).kind(), "calibration");
        assert_eq!(
            AnalysisError::InputSize {
                available: 4,
                required: 9
            }
            .kind(),
            "input-size"
        );
        assert_eq!(
            AnalysisError::invalid("density", "must be positive").kind(),
            "invalid-parameter"
        );
    }

    #[test]
    fn test_display_mentions_parameter() {
        let err = AnalysisError::invalid("density", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid parameter `density`: must be at least 1"
        );
    }
}
