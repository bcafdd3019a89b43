//! Scan-line wavelet power spectrum of an image.
//!
//! Each sampled row/column is detrended, tapered, transformed with the
//! Morlet CWT (FFT-based convolution via `rustfft`) and reduced to one
//! bias-rectified power value per scale. Line spectra are averaged into a
//! single [`PowerSpectrum`]. Everything here runs sequentially on the
//! caller's thread; identical inputs give bit-identical output.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::config::{ScanAxes, SpectrumConfig};
use crate::core::loaders::IntensityImage;
use crate::core::transforms::{apply_hann, detrend_linear, next_pow2, remove_mean, variance};
use crate::error::{AnalysisError, Result};

use super::wavelet::{Morlet, WaveletScaleSet};

/// Lines whose prepared variance falls below this carry no texture.
pub const MIN_LINE_VARIANCE: f64 = 1e-10;

/// Shortest scan line the engine will transform.
pub const MIN_LINE_LENGTH: usize = 8;

/// Number of largest-diameter spans a scan line must hold.
pub const GRAINS_PER_LINE: f64 = 3.0;

/// Orientation of a scan line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAxis {
    Row,
    Column,
}

/// One row or column of intensities taken from the image.
#[derive(Debug, Clone)]
pub struct ScanLine {
    pub axis: ScanAxis,
    pub index: usize,
    pub samples: Vec<f64>,
}

/// Averaged wavelet power per scale.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    scales: WaveletScaleSet,
    power: Vec<f64>,
    lines_used: usize,
    lines_skipped: usize,
}

impl PowerSpectrum {
    pub fn scales(&self) -> &WaveletScaleSet {
        &self.scales
    }

    /// Non-negative power, one value per scale.
    pub fn power(&self) -> &[f64] {
        &self.power
    }

    /// Lines that contributed to the average.
    pub fn lines_used(&self) -> usize {
        self.lines_used
    }

    /// Lines dropped as degenerate (no intensity variation).
    pub fn lines_skipped(&self) -> usize {
        self.lines_skipped
    }

    pub fn total_power(&self) -> f64 {
        self.power.iter().sum()
    }

    /// Index of the strongest scale, `None` if every value is zero.
    pub fn peak_index(&self) -> Option<usize> {
        self.power
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }
}

/// Evenly spread line indices: `floor((k + 0.5)·count / m)` for
/// `k < m = min(density, count)`.
pub fn select_line_indices(count: usize, density: usize) -> Vec<usize> {
    let m = density.min(count);
    (0..m).map(|k| ((2 * k + 1) * count) / (2 * m)).collect()
}

/// Extract the scan lines to analyse, rows first then columns.
pub fn sample_scan_lines(image: &IntensityImage, density: usize, axes: ScanAxes) -> Vec<ScanLine> {
    let mut lines = Vec::new();
    if matches!(axes, ScanAxes::Rows | ScanAxes::Both) {
        for r in select_line_indices(image.height(), density) {
            lines.push(ScanLine {
                axis: ScanAxis::Row,
                index: r,
                samples: image.row(r),
            });
        }
    }
    if matches!(axes, ScanAxes::Columns | ScanAxes::Both) {
        for c in select_line_indices(image.width(), density) {
            lines.push(ScanLine {
                axis: ScanAxis::Column,
                index: c,
                samples: image.column(c),
            });
        }
    }
    lines
}

/// Shortest line length the configured axes will produce.
pub fn sampled_span(image: &IntensityImage, axes: ScanAxes) -> usize {
    match axes {
        ScanAxes::Rows => image.width(),
        ScanAxes::Columns => image.height(),
        ScanAxes::Both => image.min_dim(),
    }
}

/// Line length needed to resolve grains up to `max_diameter_px`.
pub fn required_span(max_diameter_px: f64) -> usize {
    // Tolerance absorbs rounding in the top scale of a log-spaced set.
    ((GRAINS_PER_LINE * max_diameter_px - 1e-6).ceil() as usize).max(MIN_LINE_LENGTH)
}

type PlanPair = (Arc<dyn Fft<f64>>, Arc<dyn Fft<f64>>);

/// Continuous wavelet transform and power accumulation over scan lines.
///
/// FFT plans are cached per padded length for the lifetime of one engine;
/// engines are cheap and meant to be created per image.
pub struct WaveletSpectrumEngine<'a> {
    config: &'a SpectrumConfig,
    scales: &'a WaveletScaleSet,
    planner: FftPlanner<f64>,
    plans: HashMap<usize, PlanPair>,
}

impl<'a> WaveletSpectrumEngine<'a> {
    pub fn new(config: &'a SpectrumConfig, scales: &'a WaveletScaleSet) -> Self {
        Self {
            config,
            scales,
            planner: FftPlanner::new(),
            plans: HashMap::new(),
        }
    }

    fn plans_for(&mut self, len: usize) -> PlanPair {
        let planner = &mut self.planner;
        let (fwd, inv) = self.plans.entry(len).or_insert_with(|| {
            (planner.plan_fft_forward(len), planner.plan_fft_inverse(len))
        });
        (Arc::clone(fwd), Arc::clone(inv))
    }

    /// Detrend (or centre) and optionally taper a raw scan line.
    ///
    /// Returns `None` when the line has no usable variation.
    pub fn prepare_line(&self, samples: &[f64]) -> Option<Vec<f64>> {
        if samples.len() < 2 {
            return None;
        }
        let mut line = if self.config.detrend {
            detrend_linear(samples)
        } else {
            remove_mean(samples)
        };
        if !(variance(&line) >= MIN_LINE_VARIANCE) {
            return None;
        }
        if self.config.taper {
            apply_hann(&mut line);
        }
        Some(line)
    }

    /// CWT coefficients of `signal`, shape `(num_scales, signal.len())`.
    ///
    /// The signal is zero-padded to a power of two at least twice its
    /// length so the circular convolution never wraps real samples.
    pub fn transform(&mut self, signal: &[f64]) -> Array2<Complex64> {
        let n = signal.len();
        let scale_set: &'a WaveletScaleSet = self.scales;
        let scales = scale_set.scales();
        let mut coefs = Array2::zeros((scales.len(), n));
        if n == 0 {
            return coefs;
        }

        let npad = next_pow2(2 * n);
        let (fwd, inv) = self.plans_for(npad);

        let mut spectrum: Vec<Complex64> = vec![Complex64::new(0.0, 0.0); npad];
        for (dst, &v) in spectrum.iter_mut().zip(signal) {
            *dst = Complex64::new(v, 0.0);
        }
        fwd.process(&mut spectrum);

        // Angular frequency per bin; the upper half are negative frequencies.
        let half = npad / 2;
        let omega: Vec<f64> = (0..npad)
            .map(|k| {
                let kk = if k < half { k as f64 } else { k as f64 - npad as f64 };
                2.0 * PI * kk / npad as f64
            })
            .collect();

        let mut work = vec![Complex64::new(0.0, 0.0); npad];
        for (j, &scale) in scales.iter().enumerate() {
            let norm = (2.0 * PI * scale).sqrt() / npad as f64;
            for ((w, &x), &om) in work.iter_mut().zip(&spectrum).zip(&omega) {
                *w = x * (Morlet::fourier(scale * om) * norm);
            }
            inv.process(&mut work);
            for (dst, src) in coefs.row_mut(j).iter_mut().zip(&work[..n]) {
                *dst = *src;
            }
        }
        coefs
    }

    /// Bias-rectified power per scale, averaged over positions of one line.
    pub fn line_power(&mut self, samples: &[f64]) -> Option<Vec<f64>> {
        let line = self.prepare_line(samples)?;
        let n = line.len() as f64;
        let coefs = self.transform(&line);
        let power = coefs
            .outer_iter()
            .zip(self.scales.scales())
            .map(|(row, &scale)| row.iter().map(|c| c.norm_sqr()).sum::<f64>() / (scale * n))
            .collect();
        Some(power)
    }

    /// Average the power spectra of all sampled scan lines of `image`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a zero density; `InputSize` when the sampled
    /// lines are too short for the largest scale.
    pub fn run(mut self, image: &IntensityImage) -> Result<PowerSpectrum> {
        if self.config.density == 0 {
            return Err(AnalysisError::invalid("density", "must be at least 1"));
        }

        let span = sampled_span(image, self.config.axes);
        let required = required_span(self.scales.max_diameter_px());
        if span < required {
            return Err(AnalysisError::InputSize {
                available: span,
                required,
            });
        }

        let lines = sample_scan_lines(image, self.config.density, self.config.axes);
        let mut accumulated = vec![0.0; self.scales.len()];
        let mut used = 0usize;
        let mut skipped = 0usize;

        for line in &lines {
            match self.line_power(&line.samples) {
                Some(mut power) => {
                    if self.config.normalize_lines {
                        let sum: f64 = power.iter().sum();
                        if sum > 0.0 {
                            power.iter_mut().for_each(|p| *p /= sum);
                        }
                    }
                    for (acc, p) in accumulated.iter_mut().zip(power) {
                        *acc += p;
                    }
                    used += 1;
                }
                None => skipped += 1,
            }
        }

        if used > 0 {
            accumulated.iter_mut().for_each(|p| *p /= used as f64);
        }

        log::debug!(
            "{}: {} scan lines used, {} skipped, {} scales at {} per octave ({:.2}..{:.2} px)",
            image.name(),
            used,
            skipped,
            self.scales.len(),
            self.scales.notes(),
            self.scales.min_scale(),
            self.scales.max_scale()
        );

        Ok(PowerSpectrum {
            scales: self.scales.clone(),
            power: accumulated,
            lines_used: used,
            lines_skipped: skipped,
        })
    }
}

/// Compute the wavelet power spectrum of `image` over `scales`.
pub fn compute_power_spectrum(
    image: &IntensityImage,
    scales: &WaveletScaleSet,
    config: &SpectrumConfig,
) -> Result<PowerSpectrum> {
    WaveletSpectrumEngine::new(config, scales).run(image)
}
