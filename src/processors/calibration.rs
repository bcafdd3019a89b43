//! Wavelet scale to grain diameter calibration.

use super::rescale::Resolution;
use super::spectrum::PowerSpectrum;
use super::wavelet::Morlet;

/// Power spectrum indexed by grain diameter instead of wavelet scale.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedSpectrum {
    diameters: Vec<f64>,
    power: Vec<f64>,
    unit: String,
}

impl CalibratedSpectrum {
    /// Build from parallel arrays; diameters must be strictly increasing.
    pub fn new(diameters: Vec<f64>, power: Vec<f64>, unit: impl Into<String>) -> Self {
        debug_assert_eq!(diameters.len(), power.len());
        debug_assert!(diameters.windows(2).all(|w| w[1] > w[0]));
        Self {
            diameters,
            power,
            unit: unit.into(),
        }
    }

    /// Grain diameters, ascending.
    pub fn diameters(&self) -> &[f64] {
        &self.diameters
    }

    pub fn power(&self) -> &[f64] {
        &self.power
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn len(&self) -> usize {
        self.diameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diameters.is_empty()
    }
}

/// Relabel each scale with its grain diameter in the resolution's units.
///
/// Power values are carried over unchanged; the order follows the scale
/// set, so diameters are ascending.
pub fn calibrate(spectrum: &PowerSpectrum, resolution: &Resolution) -> CalibratedSpectrum {
    let per_pixel = resolution.per_pixel();
    let diameters = spectrum
        .scales()
        .scales()
        .iter()
        .map(|&s| Morlet::diameter_for_scale(s) * per_pixel)
        .collect();
    CalibratedSpectrum::new(diameters, spectrum.power().to_vec(), resolution.unit())
}
