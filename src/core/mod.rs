//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{list_images, load_image, IntensityImage, LoaderError};
pub use writers::{write_batch_csv, write_distribution_csv, write_summary_csv, BatchRow, WriteError};
