//! TIFF writing module
//!
//! Persisted frames are written as one lossless TIFF per frame.

mod writer;
mod standard_tiff_writer;
pub mod types;

pub use writer::TiffWriter;
pub use standard_tiff_writer::StandardTiffWriter;
pub use types::TiffCompression;
