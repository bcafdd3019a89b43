//! Plots of grain-size distributions.
//!
//! Renders the density (top panel) and cumulative curve (bottom panel) to a
//! PNG using the plotters bitmap backend. No text is drawn, so no font
//! support is needed at runtime.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::processors::distribution::GrainSizeDistribution;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty distribution")]
    EmptyDistribution,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1200;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 900;

const DENSITY_COLOR: RGBColor = RGBColor(55, 126, 184);
const CUMULATIVE_COLOR: RGBColor = RGBColor(228, 26, 28);
const MARKER_COLOR: RGBColor = RGBColor(77, 175, 74);

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

/// Plot density and cumulative curves of `distribution` and save as PNG.
///
/// The mean diameter is marked with a vertical line in both panels.
pub fn plot_distribution(output_path: &Path, distribution: &GrainSizeDistribution) -> Result<()> {
    let diameters = distribution.diameters();
    if diameters.len() < 2 {
        return Err(VisualizationError::EmptyDistribution);
    }
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let x_min = diameters[0];
    let x_max = diameters[diameters.len() - 1];
    let peak = distribution
        .density()
        .iter()
        .copied()
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    let mean = distribution.mean();

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let (upper, lower) = root.split_vertically(DEFAULT_HEIGHT / 2);

    let mut density_chart = ChartBuilder::on(&upper)
        .margin(20)
        .build_cartesian_2d(x_min..x_max, 0.0..peak * 1.05)
        .map_err(plot_err)?;
    density_chart
        .draw_series(
            AreaSeries::new(
                diameters.iter().copied().zip(distribution.density().iter().copied()),
                0.0,
                DENSITY_COLOR.mix(0.3),
            )
            .border_style(&DENSITY_COLOR),
        )
        .map_err(plot_err)?;
    density_chart
        .draw_series(LineSeries::new(
            [(mean, 0.0), (mean, peak * 1.05)],
            &MARKER_COLOR,
        ))
        .map_err(plot_err)?;

    let mut cumulative_chart = ChartBuilder::on(&lower)
        .margin(20)
        .build_cartesian_2d(x_min..x_max, 0.0..1.0)
        .map_err(plot_err)?;
    cumulative_chart
        .draw_series(LineSeries::new(
            diameters.iter().copied().zip(distribution.cumulative().iter().copied()),
            &CUMULATIVE_COLOR,
        ))
        .map_err(plot_err)?;
    cumulative_chart
        .draw_series(LineSeries::new([(mean, 0.0), (mean, 1.0)], &MARKER_COLOR))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistributionConfig;
    use crate::processors::calibration::CalibratedSpectrum;
    use crate::processors::distribution::build_distribution;
    use tempfile::tempdir;

    #[test]
    fn test_plot_distribution_writes_png() {
        let diameters: Vec<f64> = (1..=40).map(|i| i as f64 * 0.25).collect();
        let power = diameters.iter().map(|d| (-(d - 5.0) * (d - 5.0)).exp()).collect();
        let spectrum = CalibratedSpectrum::new(diameters, power, "mm");
        let dist = build_distribution(&spectrum, &DistributionConfig::default()).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("plots").join("sample_psd.png");
        plot_distribution(&path, &dist).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.len() > 8);
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
