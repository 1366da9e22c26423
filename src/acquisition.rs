//! Camera frame acquisition module
//!
//! Parameter access, pixel format resolution and conversion, multi-frame capture
//! into a column-major band-planar buffer, and per-frame TIFF persistence, all
//! against the abstract [`CameraDevice`] interface.

pub mod common;
pub mod config;
pub mod convert;
pub mod device;
pub mod layout;
pub mod naming;
pub mod parameters;
pub mod pipeline;
pub mod pixel_format;
pub mod runner;
pub mod simulated;
pub mod tiff;

#[cfg(test)]
mod tests;

pub use common::{
    CameraError,
    Result,
};

pub use config::{
    AcquisitionConfig,
    AcquisitionConfigBuilder,
    WriteFailurePolicy,
    DEFAULT_TIMEOUT,
};

pub use device::{
    AccessMode,
    CameraDevice,
    CameraHandle,
    CapturedFrame,
    DeviceInfo,
    NodeInfo,
    ParameterKind,
    ParameterValue,
    TransportLayer,
    Visibility,
    list_cameras,
    open_camera,
};

pub use convert::{
    PixelFormatConverter,
    StandardConverter,
};

pub use layout::{
    ElementType,
    FrameBuffer,
    FrameData,
    FrameLayout,
};

pub use naming::{
    PathTemplate,
    prepare_output_dir,
};

pub use parameters::NodeDescription;

pub use pipeline::{
    AcquisitionPipeline,
    Capture,
    CaptureReport,
    FailedWrite,
    FrameStatus,
    SaveReport,
};

pub use pixel_format::{
    PixelFormat,
    needs_conversion,
};

pub use runner::{
    SaveSession,
    SessionHandle,
};

pub use simulated::{
    FrameOutcome,
    SimulatedCamera,
    SimulatedTransport,
};

pub use tiff::{
    StandardTiffWriter,
    TiffCompression,
    TiffWriter,
};
