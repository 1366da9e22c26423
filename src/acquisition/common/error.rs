use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Parameter \"{0}\" not writable. Maybe wrong datatype?")]
    NotWritable(String),

    #[error("Parameter \"{name}\" is a {actual} node, not {requested}")]
    KindMismatch {
        name: String,
        requested: &'static str,
        actual: &'static str,
    },

    #[error("Unknown pixel format: {0}")]
    UnknownFormat(String),

    #[error("Unsupported conversion: {from} -> {to}")]
    UnsupportedConversion { from: String, to: String },

    #[error("Pixel format {0} cannot be laid out without unpacking")]
    UnsupportedLayout(String),

    #[error("Timed out after {timeout:?} waiting for frame {frame}")]
    Timeout { frame: usize, timeout: Duration },

    #[error("File error: {0}")]
    File(String),

    #[error("Invalid path template {0:?}: expected exactly one %d style placeholder")]
    InvalidTemplate(String),

    #[error("Invalid frame count: {0}")]
    InvalidFrameCount(usize),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(usize, usize),

    #[error("Frame {frame} has {actual} bytes, expected {expected}")]
    FrameSizeMismatch {
        frame: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Frame buffer mismatch: {0}")]
    BufferMismatch(String),

    #[error("Failed to encode TIFF image {path:?}: {message}")]
    Encode { path: Option<PathBuf>, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CameraError>;
