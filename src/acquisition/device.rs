//! Camera device interfaces
//!
//! The acquisition engine never talks to a vendor SDK directly. A backend
//! implements [`TransportLayer`] for discovery and [`CameraDevice`] for a
//! single opened camera: its node map of named parameters and its grab engine.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::acquisition::common::error::{CameraError, Result};
use crate::acquisition::pixel_format::PixelFormat;
use crate::report;

/// The four value kinds a parameter node can be read and written as.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Float,
    Integer,
    Boolean,
    /// Enumeration entries and plain strings, both accessed by their symbolic text.
    String,
}

impl ParameterKind {
    pub fn name(&self) -> &'static str {
        match self {
            ParameterKind::Float => "Float",
            ParameterKind::Integer => "Int",
            ParameterKind::Boolean => "Bool",
            ParameterKind::String => "String",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterKind {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Float" => Ok(ParameterKind::Float),
            "Int" | "Integer" => Ok(ParameterKind::Integer),
            "Bool" | "Boolean" => Ok(ParameterKind::Boolean),
            "String" | "Enumeration" => Ok(ParameterKind::String),
            other => Err(CameraError::Camera(anyhow::anyhow!(
                "Cannot detect type of parameter value: {other}"
            ))),
        }
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::Integer(_) => ParameterKind::Integer,
            ParameterValue::Boolean(_) => ParameterKind::Boolean,
            ParameterValue::String(_) => ParameterKind::String,
        }
    }

    /// Parses `text` as a value of the given kind.
    pub fn parse(kind: ParameterKind, text: &str) -> Result<Self> {
        let text = text.trim();
        let invalid = |e: &dyn fmt::Display| {
            CameraError::Camera(anyhow::anyhow!("invalid {kind} value {text:?}: {e}"))
        };
        Ok(match kind {
            ParameterKind::Float => ParameterValue::Float(text.parse().map_err(|e| invalid(&e))?),
            ParameterKind::Integer => {
                ParameterValue::Integer(text.parse().map_err(|e| invalid(&e))?)
            }
            ParameterKind::Boolean => match text {
                "1" | "true" | "True" | "on" => ParameterValue::Boolean(true),
                "0" | "false" | "False" | "off" => ParameterValue::Boolean(false),
                _ => return Err(invalid(&"expected true/false")),
            },
            ParameterKind::String => ParameterValue::String(text.to_string()),
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{v}"),
            ParameterValue::Integer(v) => write!(f, "{v}"),
            ParameterValue::Boolean(v) => write!(f, "{v}"),
            ParameterValue::String(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccessMode {
    NotAvailable,
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn is_readable(&self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Audience level of a node, in GenICam order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Visibility {
    Beginner = 0,
    Expert = 1,
    Guru = 2,
    Invisible = 3,
}

/// Static description of a node in the device's node map.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub name: String,
    /// `None` for nodes that carry no value (commands, categories).
    pub kind: Option<ParameterKind>,
    pub access: AccessMode,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub model_name: String,
    pub serial_number: String,
    pub vendor_name: String,
}

/// One grab result handed out by [`CameraDevice::retrieve_frame`].
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: usize,
    pub height: usize,
    pub pixel_format: PixelFormat,
    /// Row-major pixel data with interleaved bands, little-endian multi-byte samples.
    pub data: Vec<u8>,
    /// Device-side sequence counter, used to name persisted frames.
    pub image_number: u64,
    pub grab_succeeded: bool,
}

impl CapturedFrame {
    pub fn expected_len(&self) -> usize {
        self.pixel_format.frame_bytes(self.width, self.height)
    }
}

/// An opened camera.
///
/// Implementations are not expected to be shareable between threads; a
/// session owns its device exclusively for its whole lifetime.
pub trait CameraDevice: Send {
    fn info(&self) -> &DeviceInfo;

    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn is_open(&self) -> bool;

    /// Looks up a node, failing with [`CameraError::NodeNotFound`].
    fn node(&self, name: &str) -> Result<NodeInfo>;
    fn node_names(&self) -> Result<Vec<String>>;
    fn read_node(&self, name: &str) -> Result<ParameterValue>;
    fn write_node(&mut self, name: &str, value: &ParameterValue) -> Result<()>;

    /// Arms the grab engine for exactly `num_frames` frames.
    fn start_grab(&mut self, num_frames: usize) -> Result<()>;
    /// Blocks up to `timeout` for the next frame, failing with [`CameraError::Timeout`].
    fn retrieve_frame(&mut self, timeout: Duration) -> Result<CapturedFrame>;
    fn stop_grab(&mut self) -> Result<()>;
}

/// Discovery and creation of devices.
pub trait TransportLayer: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>>;
    fn create_device(&self, index: usize) -> Result<Box<dyn CameraDevice>>;
}

/// Lists attached cameras as `(index, info)` pairs without opening them.
pub fn list_cameras(transport: &dyn TransportLayer) -> Result<Vec<(usize, DeviceInfo)>> {
    Ok(transport.enumerate()?.into_iter().enumerate().collect())
}

/// Opens the camera at `index`. The device is closed when the handle drops.
pub fn open_camera(
    transport: &dyn TransportLayer,
    index: usize,
    verbose: bool,
) -> Result<CameraHandle> {
    let devices = transport.enumerate()?;
    if devices.is_empty() {
        return Err(CameraError::DeviceNotFound("No camera found.".to_string()));
    }
    if index >= devices.len() {
        return Err(CameraError::DeviceNotFound(
            "No camera with this index exists.".to_string(),
        ));
    }

    let mut device = transport.create_device(index)?;
    device.open()?;
    report!(verbose, "Using camera \"{}\"", device.info().model_name);

    Ok(CameraHandle::from_opened(device))
}

/// Exclusive ownership of an opened device.
pub struct CameraHandle {
    device: Box<dyn CameraDevice>,
    closed: bool,
}

impl CameraHandle {
    /// Wraps a device that has already been opened.
    pub fn from_opened(device: Box<dyn CameraDevice>) -> Self {
        Self { device, closed: false }
    }

    /// Closes the device, surfacing any error instead of logging it.
    ///
    /// The close is attempted once; a failure is not retried on drop.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.device.close()
    }
}

impl Deref for CameraHandle {
    type Target = dyn CameraDevice;

    fn deref(&self) -> &Self::Target {
        self.device.as_ref()
    }
}

impl DerefMut for CameraHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.device.as_mut()
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        if !self.closed && self.device.is_open() {
            if let Err(e) = self.device.close() {
                warn!("Failed to close camera \"{}\": {}", self.device.info().model_name, e);
            }
        }
    }
}
