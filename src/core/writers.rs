//! CSV writers for per-image and batch results.
//!
//! This module provides functions for writing analysis results:
//! - the grain-size density and cumulative curve of one image
//! - a `statistic,value` summary of one image
//! - one row per image for a whole batch run

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched column lengths.
    #[error("column length mismatch: {diameters} diameters, {density} densities, {cumulative} cumulative values")]
    LengthMismatch {
        diameters: usize,
        density: usize,
        cumulative: usize,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// One line of `batch_summary.csv`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchRow {
    pub image: String,
    pub status: String,
    pub unit: String,
    pub mean: Option<f64>,
    pub d50: Option<f64>,
    pub sorting: Option<f64>,
    pub error_kind: String,
    pub error: String,
}

/// Creates parent directories for a file path if they don't exist.
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

fn finish(mut writer: csv::Writer<BufWriter<File>>, path: &Path) -> Result<()> {
    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write the distribution curve with columns `diameter,density,cumulative`.
///
/// # Errors
///
/// Returns an error if the columns differ in length, or the file cannot be
/// created or written.
pub fn write_distribution_csv(
    path: &Path,
    diameters: &[f64],
    density: &[f64],
    cumulative: &[f64],
) -> Result<()> {
    if diameters.len() != density.len() || diameters.len() != cumulative.len() {
        return Err(WriteError::LengthMismatch {
            diameters: diameters.len(),
            density: density.len(),
            cumulative: cumulative.len(),
        });
    }

    let mut csv_writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    csv_writer
        .write_record(["diameter", "density", "cumulative"])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for ((d, rho), cdf) in diameters.iter().zip(density).zip(cumulative) {
        csv_writer
            .write_record(&[
                format!("{:.6}", d),
                format!("{:.8}", rho),
                format!("{:.6}", cdf),
            ])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    finish(csv_writer, path)
}

/// Write `statistic,value` pairs in the given order.
pub fn write_summary_csv(path: &Path, rows: &[(String, String)]) -> Result<()> {
    let mut csv_writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    csv_writer
        .write_record(["statistic", "value"])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;
    for (name, value) in rows {
        csv_writer
            .write_record([name.as_str(), value.as_str()])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    finish(csv_writer, path)
}

/// Write one serialized [`BatchRow`] per image, headers taken from the fields.
pub fn write_batch_csv(path: &Path, rows: &[BatchRow]) -> Result<()> {
    let mut csv_writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();

    for row in rows {
        csv_writer.serialize(row).map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;
    }

    finish(csv_writer, path)
}
