//! Image loading and grayscale normalisation.
//!
//! This module provides:
//! - `IntensityImage`, the read-only 2-D intensity grid the analysis consumes
//! - `load_image` to decode a raster file into grayscale intensities
//! - `list_images` to enumerate analysable files in a directory

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use ndarray::Array2;
use thiserror::Error;

/// Errors that can occur while loading images.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to decode image '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image '{0}' has no pixels")]
    EmptyImage(PathBuf),

    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Grayscale intensity grid in row-major order (`rows × columns`).
#[derive(Debug, Clone)]
pub struct IntensityImage {
    pixels: Array2<f64>,
    /// Working pixels per original pixel (1.0 unless downscaled on load).
    scale_factor: f64,
    source_path: Option<PathBuf>,
}

impl IntensityImage {
    /// Wrap an intensity array.
    pub fn new(pixels: Array2<f64>) -> Self {
        Self {
            pixels,
            scale_factor: 1.0,
            source_path: None,
        }
    }

    /// Build an image by evaluating `f(row, col)` for every pixel.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        Self::new(Array2::from_shape_fn((rows, cols), |(r, c)| f(r, c)))
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    /// Length of the shorter side.
    #[inline]
    pub fn min_dim(&self) -> usize {
        self.height().min(self.width())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &Array2<f64> {
        &self.pixels
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Copy of row `r`.
    pub fn row(&self, r: usize) -> Vec<f64> {
        self.pixels.row(r).to_vec()
    }

    /// Copy of column `c`.
    pub fn column(&self, c: usize) -> Vec<f64> {
        self.pixels.column(c).to_vec()
    }

    /// Replace the intensities, keeping scale factor and source path.
    pub fn with_pixels(&self, pixels: Array2<f64>) -> Self {
        Self {
            pixels,
            scale_factor: self.scale_factor,
            source_path: self.source_path.clone(),
        }
    }

    /// Display name used in logs and reports.
    pub fn name(&self) -> String {
        self.source_path()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }
}

/// Load an image from disk and convert it to grayscale intensities in 0..=255.
///
/// When `max_dimension` is set and the longest side exceeds it, the image is
/// downscaled (aspect preserved) and the returned image's `scale_factor`
/// records the reduction so physical resolution can be adjusted.
///
/// # Errors
///
/// Returns an error if the file cannot be decoded or has no pixels.
pub fn load_image(path: &Path, max_dimension: Option<u32>) -> Result<IntensityImage> {
    let mut decoded = image::open(path).map_err(|e| LoaderError::Decode {
        path: path.to_path_buf(),
        source: e,
    })?;

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(LoaderError::EmptyImage(path.to_path_buf()));
    }

    let mut scale_factor = 1.0;
    if let Some(limit) = max_dimension.filter(|&m| m > 0) {
        let longest = decoded.width().max(decoded.height());
        if longest > limit {
            scale_factor = limit as f64 / longest as f64;
            let w = ((decoded.width() as f64 * scale_factor).round() as u32).max(1);
            let h = ((decoded.height() as f64 * scale_factor).round() as u32).max(1);
            decoded = decoded.resize_exact(w, h, FilterType::Triangle);
            log::debug!(
                "{}: downscaled to {}x{} (factor {:.4})",
                path.display(),
                w,
                h,
                scale_factor
            );
        }
    }

    let gray = decoded.into_luma8();
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let raw = gray.into_raw();
    let pixels = Array2::from_shape_fn((h, w), |(r, c)| raw[r * w + c] as f64);

    Ok(IntensityImage {
        pixels,
        scale_factor,
        source_path: Some(path.to_path_buf()),
    })
}

/// List image files in `dir` whose extension matches one of `extensions`
/// (case-insensitive), sorted by path.
pub fn list_images(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(LoaderError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| {
                    extensions
                        .iter()
                        .any(|wanted| ext.eq_ignore_ascii_case(wanted.as_str()))
                })
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    fn exts() -> Vec<String> {
        vec!["png".to_string(), "jpg".to_string()]
    }

    #[test]
    fn test_from_fn_shape_and_access() {
        let img = IntensityImage::from_fn(3, 5, |r, c| (r * 10 + c) as f64);
        assert_eq!(img.height(), 3);
        assert_eq!(img.width(), 5);
        assert_eq!(img.min_dim(), 3);
        assert_eq!(img.row(1), vec![10.0, 11.0, 12.0, 13.0, 14.0]);
        assert_eq!(img.column(4), vec![4.0, 14.0, 24.0]);
        assert_eq!(img.name(), "<memory>");
        assert!(img.source_path().is_none());
    }

    #[test]
    fn test_load_image_grayscale_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ramp.png");
        GrayImage::from_fn(8, 4, |x, _| Luma([(x * 30) as u8]))
            .save(&path)
            .unwrap();

        let img = load_image(&path, None).unwrap();
        assert_eq!(img.width(), 8);
        assert_eq!(img.height(), 4);
        assert_eq!(img.pixels()[[2, 3]], 90.0);
        assert_eq!(img.scale_factor(), 1.0);
        assert_eq!(img.name(), "ramp.png");
        assert_eq!(img.source_path(), Some(path.as_path()));
    }

    #[test]
    fn test_load_image_downscales_to_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.png");
        GrayImage::from_pixel(200, 100, Luma([128u8]))
            .save(&path)
            .unwrap();

        let img = load_image(&path, Some(50)).unwrap();
        assert_eq!(img.width(), 50);
        assert_eq!(img.height(), 25);
        assert!((img.scale_factor() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_load_image_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.png");
        fs::write(&path, b"definitely not a png").unwrap();

        let result = load_image(&path, None);
        assert!(matches!(result, Err(LoaderError::Decode { .. })));
    }

    #[test]
    fn test_list_images_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b.PNG", "a.png", "c.jpg", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.png")).unwrap();

        let files = list_images(dir.path(), &exts()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.PNG", "c.jpg"]);
    }

    #[test]
    fn test_list_images_missing_directory() {
        let dir = tempdir().unwrap();
        let result = list_images(&dir.path().join("nope"), &exts());
        assert!(matches!(result, Err(LoaderError::DirectoryNotFound(_))));
    }
}
