//! Shared types used across the acquisition modules.

pub mod error;

pub use error::{CameraError, Result};
