//! Configuration types for the grain-size pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, Result};

/// Image preparation before spectral analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Crop the largest centred square before analysis
    #[serde(default = "default_true")]
    pub crop_central: bool,

    /// Subtract a local-mean background and stretch to the 8-bit range
    #[serde(default = "default_true")]
    pub flatten_illumination: bool,

    /// Downscale so the longest side is at most this many pixels
    #[serde(default)]
    pub max_dimension: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            crop_central: true,
            flatten_illumination: true,
            max_dimension: None,
        }
    }
}

/// Which image axes scan lines are taken from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAxes {
    Rows,
    Columns,
    #[default]
    Both,
}

/// Wavelet spectrum estimation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumConfig {
    /// Number of scan lines sampled per axis
    #[serde(default = "default_density")]
    pub density: usize,

    /// Axes to sample scan lines from
    #[serde(default)]
    pub axes: ScanAxes,

    /// Remove a least-squares linear trend from each line (mean only when false)
    #[serde(default = "default_true")]
    pub detrend: bool,

    /// Apply a Hann taper to each line before the transform
    #[serde(default = "default_true")]
    pub taper: bool,

    /// Scales per octave
    #[serde(default = "default_notes")]
    pub notes: usize,

    /// Give every line equal weight by normalising its spectrum to unit sum
    #[serde(default)]
    pub normalize_lines: bool,

    /// Smallest grain diameter to resolve, in output units
    #[serde(default)]
    pub min_diameter: Option<f64>,

    /// Largest grain diameter to resolve, in output units
    #[serde(default)]
    pub max_diameter: Option<f64>,
}

fn default_density() -> usize {
    20
}

/// Finest scale resolution accepted, in scales per octave.
pub const MAX_NOTES: usize = 64;

fn default_notes() -> usize {
    8
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            density: default_density(),
            axes: ScanAxes::default(),
            detrend: true,
            taper: true,
            notes: default_notes(),
            normalize_lines: false,
            min_diameter: None,
            max_diameter: None,
        }
    }
}

/// A reference object of known physical length measured in the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceScale {
    /// Physical length of the object
    pub length: f64,
    /// Number of pixels the object spans in the original image
    pub pixels: f64,
}

/// Physical calibration of the image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Physical length per pixel
    #[serde(default)]
    pub resolution: Option<f64>,

    /// Reference object used when no resolution is given
    #[serde(default)]
    pub reference: Option<ReferenceScale>,

    /// Label of the physical length unit
    #[serde(default = "default_unit")]
    pub unit: String,

    /// Fail instead of falling back to pixel units
    #[serde(default)]
    pub require_physical: bool,
}

fn default_unit() -> String {
    "mm".to_string()
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            resolution: None,
            reference: None,
            unit: default_unit(),
            require_physical: false,
        }
    }
}

/// Distribution summary parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Percentiles to report (0..=100)
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,

    /// Kaiser taper shape across the spectrum, off when unset
    #[serde(default)]
    pub taper_beta: Option<f64>,
}

fn default_percentiles() -> Vec<f64> {
    vec![5.0, 10.0, 16.0, 25.0, 50.0, 75.0, 84.0, 90.0, 95.0]
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            percentiles: default_percentiles(),
            taper_beta: None,
        }
    }
}

/// Directory batch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Worker threads used to process images concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Image file extensions to pick up (case-insensitive)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Render a PNG plot per image
    #[serde(default)]
    pub plot: bool,

    /// Output directory (defaults to `<input>/outputs`)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_workers() -> usize {
    4
}

fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "tif", "tiff", "png"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            extensions: default_extensions(),
            plot: false,
            output_dir: None,
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub preprocessing: PreprocessConfig,

    #[serde(default)]
    pub spectrum: SpectrumConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub distribution: DistributionConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check parameter ranges before any image is touched.
    pub fn validate(&self) -> Result<()> {
        let spectrum = &self.spectrum;
        if spectrum.density == 0 {
            return Err(AnalysisError::invalid("density", "must be at least 1"));
        }
        if spectrum.notes == 0 || spectrum.notes > MAX_NOTES {
            return Err(AnalysisError::invalid(
                "notes",
                format!("{} is outside 1..={}", spectrum.notes, MAX_NOTES),
            ));
        }
        for (name, value) in [
            ("min_diameter", spectrum.min_diameter),
            ("max_diameter", spectrum.max_diameter),
        ] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(AnalysisError::invalid(name, format!("{} is not a positive length", v)));
                }
            }
        }
        if let (Some(lo), Some(hi)) = (spectrum.min_diameter, spectrum.max_diameter) {
            if lo >= hi {
                return Err(AnalysisError::invalid(
                    "max_diameter",
                    format!("{} must exceed min_diameter {}", hi, lo),
                ));
            }
        }

        if let Some(res) = self.calibration.resolution {
            if !(res.is_finite() && res > 0.0) {
                return Err(AnalysisError::invalid("resolution", format!("{} is not a positive length per pixel", res)));
            }
        }
        if let Some(reference) = self.calibration.reference {
            let ok = reference.length.is_finite()
                && reference.length > 0.0
                && reference.pixels.is_finite()
                && reference.pixels > 0.0;
            if !ok {
                return Err(AnalysisError::invalid(
                    "reference",
                    format!("length {} over {} px is not usable", reference.length, reference.pixels),
                ));
            }
        }

        for &p in &self.distribution.percentiles {
            if !(0.0..=100.0).contains(&p) {
                return Err(AnalysisError::invalid("percentiles", format!("{} is outside [0, 100]", p)));
            }
        }
        if let Some(beta) = self.distribution.taper_beta {
            if !(beta.is_finite() && beta >= 0.0) {
                return Err(AnalysisError::invalid("taper_beta", format!("{} is not a non-negative shape", beta)));
            }
        }

        if self.batch.workers == 0 {
            return Err(AnalysisError::invalid("workers", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.spectrum.density, 20);
        assert_eq!(config.spectrum.notes, 8);
        assert_eq!(config.spectrum.axes, ScanAxes::Both);
        assert!(config.calibration.resolution.is_none());
        assert_eq!(config.batch.workers, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "spectrum:\n  density: 50\n  axes: rows\ncalibration:\n  resolution: 0.05\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.spectrum.density, 50);
        assert_eq!(config.spectrum.axes, ScanAxes::Rows);
        assert_eq!(config.spectrum.notes, 8);
        assert_eq!(config.calibration.resolution, Some(0.05));
        assert_eq!(config.calibration.unit, "mm");
        assert_eq!(config.distribution.percentiles.len(), 9);
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = PipelineConfig::default();
        config.spectrum.density = 7;
        config.calibration.reference = Some(ReferenceScale {
            length: 10.0,
            pixels: 200.0,
        });
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.spectrum.density, 7);
        assert_eq!(loaded.calibration.reference, config.calibration.reference);
    }

    #[test]
    fn test_validate_rejects_zero_density() {
        let mut config = PipelineConfig::default();
        config.spectrum.density = 0;
        match config.validate() {
            Err(AnalysisError::InvalidParameter { name, .. }) => assert_eq!(name, "density"),
            other => panic!("Expected InvalidParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_excessive_notes() {
        let mut config = PipelineConfig::default();
        config.spectrum.notes = 1 << 40;
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidParameter { name: "notes", .. })
        ));

        config.spectrum.notes = MAX_NOTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_axes_default_to_both() {
        let config: PipelineConfig = serde_yaml::from_str("spectrum:\n  density: 5\n").unwrap();
        assert_eq!(config.spectrum.axes, ScanAxes::Both);
    }

    #[test]
    fn test_validate_rejects_inverted_diameter_bounds() {
        let mut config = PipelineConfig::default();
        config.spectrum.min_diameter = Some(2.0);
        config.spectrum.max_diameter = Some(1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_percentile() {
        let mut config = PipelineConfig::default();
        config.distribution.percentiles = vec![50.0, 101.0];
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidParameter { name: "percentiles", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_negative_resolution() {
        let mut config = PipelineConfig::default();
        config.calibration.resolution = Some(-0.1);
        assert!(config.validate().is_err());
    }
}
