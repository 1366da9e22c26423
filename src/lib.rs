//! Frame acquisition for industrial cameras.
//!
//! The [`acquisition`] module drives a camera behind the [`acquisition::CameraDevice`]
//! trait: typed parameter access, pixel format resolution and conversion, multi-frame
//! capture into a column-major band-planar buffer, and TIFF persistence.

pub mod acquisition;
pub mod logger;
