//! Morlet mother wavelet and the discrete scale set it is evaluated on.
//!
//! The wavelet is fixed: the scale-to-diameter constant used by the
//! calibrator is only valid for this family and centre frequency.

use std::f64::consts::PI;

use crate::error::{AnalysisError, Result};

/// Morlet wavelet evaluated in the Fourier domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct Morlet;

impl Morlet {
    /// Non-dimensional centre frequency.
    pub const OMEGA0: f64 = 6.0;

    /// `π^{-1/4}`, unit-energy normalisation.
    pub const NORMALIZATION: f64 = 0.751_125_544_464_942_5;

    /// Grain diameter (in pixels) per unit scale for bias-rectified power.
    ///
    /// Rectified power |W|²/s of a sinusoid with angular frequency ω peaks at
    /// s = ω0/ω, so the period seen at scale s is `s · 2π/ω0`.
    pub const SCALE_TO_DIAMETER: f64 = 2.0 * PI / Self::OMEGA0;

    /// Fourier transform of the analytic Morlet at `s·ω` (zero for s·ω ≤ 0).
    #[inline]
    pub fn fourier(s_omega: f64) -> f64 {
        if s_omega <= 0.0 {
            return 0.0;
        }
        let d = s_omega - Self::OMEGA0;
        Self::NORMALIZATION * (-0.5 * d * d).exp()
    }

    /// Scale whose rectified power peaks at a feature of `diameter_px` pixels.
    #[inline]
    pub fn scale_for_diameter(diameter_px: f64) -> f64 {
        diameter_px / Self::SCALE_TO_DIAMETER
    }

    /// Inverse of [`Morlet::scale_for_diameter`].
    #[inline]
    pub fn diameter_for_scale(scale: f64) -> f64 {
        scale * Self::SCALE_TO_DIAMETER
    }
}

/// Upper bound on the number of scales in one set.
pub const MAX_SCALES: usize = 4096;

/// Strictly increasing, log-spaced wavelet scales (in pixels).
#[derive(Debug, Clone, PartialEq)]
pub struct WaveletScaleSet {
    scales: Vec<f64>,
    notes: usize,
}

impl WaveletScaleSet {
    /// Scales `min·2^(j/notes)` for every j that stays within `max`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the bounds are not positive and finite, `notes`
    /// is zero, or the range holds fewer than two scales.
    pub fn log_spaced(min_scale: f64, max_scale: f64, notes: usize) -> Result<Self> {
        if notes == 0 {
            return Err(AnalysisError::invalid("notes", "must be at least 1"));
        }
        if !(min_scale.is_finite() && min_scale > 0.0) {
            return Err(AnalysisError::invalid("min_scale", format!("{} is not a positive scale", min_scale)));
        }
        if !(max_scale.is_finite() && max_scale > min_scale) {
            return Err(AnalysisError::invalid(
                "max_scale",
                format!("{} must exceed the minimum scale {}", max_scale, min_scale),
            ));
        }

        let steps = (notes as f64 * (max_scale / min_scale).log2() + 1e-9).floor();
        if steps > MAX_SCALES as f64 {
            return Err(AnalysisError::invalid(
                "notes",
                format!("{} notes per octave over {}..{} exceeds {} scales", notes, min_scale, max_scale, MAX_SCALES),
            ));
        }
        let steps = steps as usize;
        if steps == 0 {
            return Err(AnalysisError::invalid(
                "max_scale",
                format!("range {}..{} is narrower than one step at {} notes per octave", min_scale, max_scale, notes),
            ));
        }

        let scales = (0..=steps)
            .map(|j| min_scale * 2f64.powf(j as f64 / notes as f64))
            .collect();
        Ok(Self { scales, notes })
    }

    /// Scale set covering grain diameters `min_px..=max_px` (pixels).
    pub fn for_diameters(min_px: f64, max_px: f64, notes: usize) -> Result<Self> {
        Self::log_spaced(
            Morlet::scale_for_diameter(min_px),
            Morlet::scale_for_diameter(max_px),
            notes,
        )
    }

    #[inline]
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.scales.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    pub fn notes(&self) -> usize {
        self.notes
    }

    pub fn min_scale(&self) -> f64 {
        self.scales[0]
    }

    pub fn max_scale(&self) -> f64 {
        self.scales[self.scales.len() - 1]
    }

    /// Largest grain diameter (pixels) the set resolves.
    pub fn max_diameter_px(&self) -> f64 {
        Morlet::diameter_for_scale(self.max_scale())
    }
}
