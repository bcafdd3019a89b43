//! Numeric transforms on images, scan lines and sampled curves.
//!
//! Image-level preparation (central crop, illumination flattening) and the
//! 1-D helpers the wavelet engine and distribution builder share: detrending,
//! tapers, variance and trapezoidal integration.

use ndarray::{s, Array2, Axis};

use super::loaders::IntensityImage;

/// Crop the largest centred square from the image.
pub fn crop_central(image: &IntensityImage) -> IntensityImage {
    let size = image.min_dim();
    let r0 = (image.height() - size) / 2;
    let c0 = (image.width() - size) / 2;
    let square = image
        .pixels()
        .slice(s![r0..r0 + size, c0..c0 + size])
        .to_owned();
    image.with_pixels(square)
}

/// Remove slowly varying illumination and stretch the residual to 0..=255.
///
/// The background is a local mean over a square window whose side is the
/// largest odd number not exceeding `min_dim / 4`. Images too small for a
/// 3-pixel window are returned unchanged; a flat residual is returned as
/// zeros.
pub fn flatten_illumination(image: &IntensityImage) -> IntensityImage {
    let quarter = image.min_dim() / 4;
    let window = if quarter % 2 == 1 { quarter } else { quarter.saturating_sub(1) };
    if window < 3 {
        return image.clone();
    }

    let background = box_mean(image.pixels(), window / 2);
    let residual = image.pixels() - &background;
    let stretched = match rescale_range(&residual, 0.0, 255.0) {
        Some(r) => r,
        None => Array2::zeros(residual.raw_dim()),
    };
    image.with_pixels(stretched)
}

/// Linearly map values onto `[lo, hi]`. Returns `None` when the input is flat.
pub fn rescale_range(values: &Array2<f64>, lo: f64, hi: f64) -> Option<Array2<f64>> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !span.is_finite() || span <= f64::EPSILON * max.abs().max(1.0) {
        return None;
    }
    Some(values.mapv(|v| (hi - lo) * (v - min) / span + lo))
}

/// Mean over a `(2·half + 1)²` window, clipped at the image border.
pub fn box_mean(values: &Array2<f64>, half: usize) -> Array2<f64> {
    let mut out = values.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let smoothed = running_mean(&row.to_vec(), half);
        row.assign(&ndarray::Array1::from(smoothed));
    }
    for mut col in out.axis_iter_mut(Axis(1)) {
        let smoothed = running_mean(&col.to_vec(), half);
        col.assign(&ndarray::Array1::from(smoothed));
    }
    out
}

/// Centred moving average with the window clipped to the signal.
fn running_mean(signal: &[f64], half: usize) -> Vec<f64> {
    let n = signal.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &v in signal {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Subtract the least-squares straight line from `signal`.
pub fn detrend_linear(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n < 2 {
        return remove_mean(signal);
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = signal.iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &y) in signal.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;

    signal
        .iter()
        .enumerate()
        .map(|(i, &y)| y - y_mean - slope * (i as f64 - x_mean))
        .collect()
}

/// Subtract the mean from `signal`.
pub fn remove_mean(signal: &[f64]) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let mean = signal.iter().sum::<f64>() / signal.len() as f64;
    signal.iter().map(|&v| v - mean).collect()
}

/// Population variance.
pub fn variance(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let n = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / n;
    signal.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// Multiply `signal` in place by a symmetric Hann window.
pub fn apply_hann(signal: &mut [f64]) {
    let n = signal.len();
    if n < 2 {
        return;
    }
    let denom = (n - 1) as f64;
    for (i, v) in signal.iter_mut().enumerate() {
        let w = 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / denom).cos();
        *v *= w;
    }
}

/// Kaiser window of length `n` with shape parameter `beta`.
pub fn kaiser_window(n: usize, beta: f64) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = bessel_i0(beta);
            let m = (n - 1) as f64;
            (0..n)
                .map(|i| {
                    let r = 2.0 * i as f64 / m - 1.0;
                    bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
                })
                .collect()
        }
    }
}

/// Modified Bessel function of the first kind, order zero (power series).
pub fn bessel_i0(x: f64) -> f64 {
    let half_sq = (x / 2.0) * (x / 2.0);
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > sum * 1e-16 {
        term *= half_sq / (k * k);
        sum += term;
        k += 1.0;
    }
    sum
}

/// Trapezoidal integral of `y` over the sample points `x`.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}

/// Running trapezoidal integral, starting at zero at `x[0]`.
pub fn cumulative_trapezoid(x: &[f64], y: &[f64]) -> Vec<f64> {
    debug_assert_eq!(x.len(), y.len());
    let mut out = Vec::with_capacity(x.len());
    let mut acc = 0.0;
    if !x.is_empty() {
        out.push(0.0);
    }
    for (xs, ys) in x.windows(2).zip(y.windows(2)) {
        acc += 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]);
        out.push(acc);
    }
    out
}

/// Smallest power of two that is at least `n`.
pub fn next_pow2(n: usize) -> usize {
    n.max(1).next_power_of_two()
}
