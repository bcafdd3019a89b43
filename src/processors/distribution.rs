//! Conversion of a calibrated power spectrum into a grain-size distribution.
//!
//! The density is the spectrum normalised to unit area over the diameter
//! axis (trapezoidal rule). Moments, percentiles and the cumulative curve are
//! all integrated with the same rule so they stay mutually consistent.

use crate::config::DistributionConfig;
use crate::core::transforms::{cumulative_trapezoid, kaiser_window, trapezoid};
use crate::error::{AnalysisError, Result};

use super::calibration::CalibratedSpectrum;

/// Summed power at or below this is treated as "no detectable texture".
pub const MIN_TOTAL_POWER: f64 = 1e-12;

/// Scalar statistics derived from a [`GrainSizeDistribution`].
#[derive(Debug, Clone, PartialEq)]
pub struct GrainSizeStatistics {
    /// Probability-weighted mean diameter.
    pub mean: f64,
    /// Probability-weighted standard deviation of diameter.
    pub sorting: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    /// Diameter with the highest density.
    pub mode: f64,
    /// `sqrt(D84 / D16)`.
    pub geometric_sorting: f64,
    /// `(percentile, diameter)` pairs in request order.
    pub percentiles: Vec<(f64, f64)>,
}

/// Normalised grain-size density over diameter with its cumulative form.
#[derive(Debug, Clone, PartialEq)]
pub struct GrainSizeDistribution {
    diameters: Vec<f64>,
    density: Vec<f64>,
    cumulative: Vec<f64>,
    unit: String,
    statistics: GrainSizeStatistics,
}

impl GrainSizeDistribution {
    pub fn diameters(&self) -> &[f64] {
        &self.diameters
    }

    /// Density per unit diameter; integrates to 1.
    pub fn density(&self) -> &[f64] {
        &self.density
    }

    /// Non-decreasing, 0 at the smallest diameter and 1 at the largest.
    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn statistics(&self) -> &GrainSizeStatistics {
        &self.statistics
    }

    pub fn mean(&self) -> f64 {
        self.statistics.mean
    }

    pub fn sorting(&self) -> f64 {
        self.statistics.sorting
    }

    pub fn mode(&self) -> f64 {
        self.statistics.mode
    }

    pub fn median(&self) -> f64 {
        interpolate_percentile(&self.diameters, &self.cumulative, 0.5)
    }

    /// Diameter below which `p` percent of the distribution lies.
    ///
    /// Requests that land exactly on a cumulative sample return that
    /// sample's diameter; others interpolate linearly between neighbours.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if `p` is not within `[0, 100]`.
    pub fn percentile(&self, p: f64) -> Result<f64> {
        check_percentile(p)?;
        Ok(interpolate_percentile(&self.diameters, &self.cumulative, p / 100.0))
    }
}

fn check_percentile(p: f64) -> Result<()> {
    if p.is_finite() && (0.0..=100.0).contains(&p) {
        Ok(())
    } else {
        Err(AnalysisError::invalid(
            "percentile",
            format!("{} is outside [0, 100]", p),
        ))
    }
}

fn interpolate_percentile(diameters: &[f64], cumulative: &[f64], q: f64) -> f64 {
    let idx = cumulative.partition_point(|&c| c < q);
    if idx == 0 {
        return diameters[0];
    }
    if idx >= cumulative.len() {
        return diameters[diameters.len() - 1];
    }
    let (c0, c1) = (cumulative[idx - 1], cumulative[idx]);
    let (d0, d1) = (diameters[idx - 1], diameters[idx]);
    if c1 == q {
        return d1;
    }
    d0 + (q - c0) / (c1 - c0) * (d1 - d0)
}

/// Normalise `spectrum` into a distribution and derive its statistics.
///
/// # Errors
///
/// `IndeterminateDistribution` when the spectrum carries no usable power;
/// `InvalidParameter` for a bad percentile request or taper shape.
pub fn build_distribution(
    spectrum: &CalibratedSpectrum,
    config: &DistributionConfig,
) -> Result<GrainSizeDistribution> {
    for &p in &config.percentiles {
        check_percentile(p)?;
    }
    if spectrum.len() < 2 {
        return Err(AnalysisError::invalid(
            "diameters",
            format!("{} diameter bins, at least 2 needed", spectrum.len()),
        ));
    }

    let diameters = spectrum.diameters().to_vec();
    let mut power = spectrum.power().to_vec();

    if let Some(beta) = config.taper_beta {
        if !(beta.is_finite() && beta >= 0.0) {
            return Err(AnalysisError::invalid(
                "taper_beta",
                format!("{} is not a non-negative shape parameter", beta),
            ));
        }
        for (p, w) in power.iter_mut().zip(kaiser_window(diameters.len(), beta)) {
            *p *= w;
        }
    }

    let total: f64 = power.iter().sum();
    let area = trapezoid(&diameters, &power);
    let usable = total.is_finite()
        && total > MIN_TOTAL_POWER
        && area.is_finite()
        && area > 0.0
        && power.iter().all(|&p| p >= 0.0);
    if !usable {
        return Err(AnalysisError::IndeterminateDistribution {
            total,
            threshold: MIN_TOTAL_POWER,
        });
    }

    let density: Vec<f64> = power.iter().map(|p| p / area).collect();
    let mut cumulative = cumulative_trapezoid(&diameters, &density);
    let last = cumulative[cumulative.len() - 1];
    cumulative.iter_mut().for_each(|c| *c /= last);

    let statistics = summarize(&diameters, &density, &cumulative, &config.percentiles);

    log::debug!(
        "distribution over {} bins ({:.4}..{:.4} {}): mean {:.4}, sorting {:.4}",
        diameters.len(),
        diameters[0],
        diameters[diameters.len() - 1],
        spectrum.unit(),
        statistics.mean,
        statistics.sorting
    );

    Ok(GrainSizeDistribution {
        diameters,
        density,
        cumulative,
        unit: spectrum.unit().to_string(),
        statistics,
    })
}

fn summarize(
    diameters: &[f64],
    density: &[f64],
    cumulative: &[f64],
    percentiles: &[f64],
) -> GrainSizeStatistics {
    let moment = |f: &dyn Fn(f64) -> f64| {
        let integrand: Vec<f64> = diameters
            .iter()
            .zip(density)
            .map(|(&d, &rho)| f(d) * rho)
            .collect();
        trapezoid(diameters, &integrand)
    };

    let mean = moment(&|d| d);
    let variance = moment(&|d| (d - mean).powi(2)).max(0.0);
    let sorting = variance.sqrt();
    let (skewness, kurtosis) = if sorting > 0.0 {
        (
            moment(&|d| (d - mean).powi(3)) / sorting.powi(3),
            moment(&|d| (d - mean).powi(4)) / variance.powi(2),
        )
    } else {
        (0.0, 0.0)
    };

    let mode = density
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| diameters[i])
        .unwrap_or(diameters[0]);

    let d16 = interpolate_percentile(diameters, cumulative, 0.16);
    let d84 = interpolate_percentile(diameters, cumulative, 0.84);
    let geometric_sorting = if d16 > 0.0 { (d84 / d16).sqrt() } else { f64::NAN };

    GrainSizeStatistics {
        mean,
        sorting,
        skewness,
        kurtosis,
        mode,
        geometric_sorting,
        percentiles: percentiles
            .iter()
            .map(|&p| (p, interpolate_percentile(diameters, cumulative, p / 100.0)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gaussian_spectrum(centre: f64, width: f64) -> CalibratedSpectrum {
        let diameters: Vec<f64> = (0..=200).map(|i| 1.0 + 0.1 * i as f64).collect();
        let power = diameters
            .iter()
            .map(|d| 40.0 * (-0.5 * ((d - centre) / width).powi(2)).exp())
            .collect();
        CalibratedSpectrum::new(diameters, power, "mm")
    }

    #[test]
    fn test_density_integrates_to_one() {
        let dist = build_distribution(&gaussian_spectrum(10.0, 2.0), &DistributionConfig::default()).unwrap();
        assert_relative_eq!(trapezoid(dist.diameters(), dist.density()), 1.0, epsilon = 1e-12);
        assert!(dist.density().iter().all(|&d| d >= 0.0));
        assert_eq!(dist.cumulative()[0], 0.0);
        assert_relative_eq!(*dist.cumulative().last().unwrap(), 1.0);
        assert!(dist.cumulative().windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(dist.unit(), "mm");
    }

    #[test]
    fn test_symmetric_peak_statistics() {
        let dist = build_distribution(&gaussian_spectrum(10.0, 2.0), &DistributionConfig::default()).unwrap();
        let stats = dist.statistics();
        assert_relative_eq!(stats.mean, 10.0, epsilon = 1e-3);
        assert_relative_eq!(stats.mode, 10.0, epsilon = 1e-9);
        assert_relative_eq!(stats.sorting, 2.0, epsilon = 1e-2);
        assert!(stats.skewness.abs() < 1e-3);
        assert_relative_eq!(stats.kurtosis, 3.0, epsilon = 1e-2);
        assert_relative_eq!(dist.median(), 10.0, epsilon = 1e-3);
        assert!(stats.geometric_sorting > 1.0);
    }

    #[test]
    fn test_percentiles_are_monotonic() {
        let dist = build_distribution(&gaussian_spectrum(6.0, 3.0), &DistributionConfig::default()).unwrap();
        let d10 = dist.percentile(10.0).unwrap();
        let d50 = dist.percentile(50.0).unwrap();
        let d90 = dist.percentile(90.0).unwrap();
        assert!(d10 <= d50 && d50 <= d90);

        let listed: Vec<f64> = dist.statistics().percentiles.iter().map(|&(_, d)| d).collect();
        assert_eq!(listed.len(), 9);
        assert!(listed.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_percentile_on_sample_boundary() {
        let spectrum = CalibratedSpectrum::new(vec![1.0, 2.0, 3.0], vec![1.0, 1.0, 1.0], "px");
        let dist = build_distribution(&spectrum, &DistributionConfig::default()).unwrap();
        assert_eq!(dist.cumulative(), &[0.0, 0.5, 1.0]);
        assert_eq!(dist.percentile(50.0).unwrap(), 2.0);
        assert_eq!(dist.percentile(0.0).unwrap(), 1.0);
        assert_eq!(dist.percentile(100.0).unwrap(), 3.0);
        assert_relative_eq!(dist.percentile(25.0).unwrap(), 1.5);
    }

    #[test]
    fn test_percentile_outside_range_is_invalid() {
        let dist = build_distribution(&gaussian_spectrum(10.0, 2.0), &DistributionConfig::default()).unwrap();
        assert!(matches!(
            dist.percentile(101.0),
            Err(AnalysisError::InvalidParameter { name: "percentile", .. })
        ));
        assert!(dist.percentile(-0.5).is_err());
        assert!(dist.percentile(f64::NAN).is_err());
    }

    #[test]
    fn test_invalid_requested_percentile_fails_build() {
        let config = DistributionConfig {
            percentiles: vec![50.0, 150.0],
            ..Default::default()
        };
        assert!(matches!(
            build_distribution(&gaussian_spectrum(10.0, 2.0), &config),
            Err(AnalysisError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_zero_power_is_indeterminate() {
        let spectrum = CalibratedSpectrum::new(vec![1.0, 2.0, 4.0], vec![0.0; 3], "px");
        let err = build_distribution(&spectrum, &DistributionConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "indeterminate-distribution");

        let tiny = CalibratedSpectrum::new(vec![1.0, 2.0, 4.0], vec![1e-15; 3], "px");
        assert!(matches!(
            build_distribution(&tiny, &DistributionConfig::default()),
            Err(AnalysisError::IndeterminateDistribution { .. })
        ));
    }

    #[test]
    fn test_nan_power_is_indeterminate() {
        let spectrum = CalibratedSpectrum::new(vec![1.0, 2.0], vec![f64::NAN, 1.0], "px");
        assert!(matches!(
            build_distribution(&spectrum, &DistributionConfig::default()),
            Err(AnalysisError::IndeterminateDistribution { .. })
        ));
    }

    #[test]
    fn test_kaiser_taper_keeps_normalization() {
        let config = DistributionConfig {
            taper_beta: Some(6.0),
            ..Default::default()
        };
        let flat = CalibratedSpectrum::new((1..=21).map(f64::from).collect(), vec![1.0; 21], "px");
        let dist = build_distribution(&flat, &config).unwrap();
        assert_relative_eq!(trapezoid(dist.diameters(), dist.density()), 1.0, epsilon = 1e-12);
        // The taper pulls mass toward the centre of the range.
        assert_relative_eq!(dist.mode(), 11.0);
        assert!(dist.density()[0] < dist.density()[10]);
    }

    #[test]
    fn test_rejects_negative_taper() {
        let config = DistributionConfig {
            taper_beta: Some(-1.0),
            ..Default::default()
        };
        assert!(build_distribution(&gaussian_spectrum(10.0, 2.0), &config).is_err());
    }
}
