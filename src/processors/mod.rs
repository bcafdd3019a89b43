//! Analysis stages and batch orchestration.

pub mod batch;
pub mod calibration;
pub mod distribution;
pub mod pipeline;
pub mod rescale;
pub mod spectrum;
pub mod wavelet;

// Re-export key types for convenience
pub use batch::{
    process_directory, process_image_file, BatchError, BatchSummary, FailureKind, ImageOutcome,
};
pub use calibration::{calibrate, CalibratedSpectrum};
pub use distribution::{build_distribution, GrainSizeDistribution, GrainSizeStatistics};
pub use pipeline::{analyse_image, GrainSizeReport};
pub use rescale::{determine_resolution, Resolution};
pub use spectrum::{compute_power_spectrum, PowerSpectrum, WaveletSpectrumEngine};
pub use wavelet::{Morlet, WaveletScaleSet};
