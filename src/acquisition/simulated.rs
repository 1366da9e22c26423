//! In-memory camera backend
//!
//! `SimulatedCamera` exposes a GenICam-like node map and produces deterministic
//! test-pattern frames, so the whole acquisition path can run without hardware.
//! Per-frame outcomes can be scripted to exercise dropped grabs and timeouts.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, trace};

use crate::acquisition::common::error::{CameraError, Result};
use crate::acquisition::device::{
    AccessMode, CameraDevice, CapturedFrame, DeviceInfo, NodeInfo, ParameterValue,
    TransportLayer, Visibility,
};
use crate::acquisition::pixel_format::PixelFormat;

/// What the simulated grab engine does for one frame of a grab.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Deliver,
    GrabFailed,
    Timeout,
}

#[derive(Debug, Clone)]
struct SimNode {
    info: NodeInfo,
    value: Option<ParameterValue>,
    /// Valid entries for enumeration nodes.
    entries: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
struct GrabState {
    requested: usize,
    delivered: usize,
}

/// Nodes that a real camera locks while the grab engine is armed.
const LOCKED_WHILE_GRABBING: [&str; 3] = ["Width", "Height", "PixelFormat"];

#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    info: DeviceInfo,
    nodes: BTreeMap<String, SimNode>,
    open: bool,
    script: Vec<FrameOutcome>,
    frame_delay: Duration,
    grab: Option<GrabState>,
    next_image_number: u64,
}

impl SimulatedCamera {
    pub fn new(model_name: &str, width: usize, height: usize, pixel_format: PixelFormat) -> Self {
        let info = DeviceInfo {
            model_name: model_name.to_string(),
            serial_number: format!("SIM{:08}", model_name.len() * 7919),
            vendor_name: "Simulated".to_string(),
        };

        let mut camera = Self {
            info,
            nodes: BTreeMap::new(),
            open: false,
            script: Vec::new(),
            frame_delay: Duration::ZERO,
            grab: None,
            next_image_number: 1,
        };

        let ro = AccessMode::ReadOnly;
        let rw = AccessMode::ReadWrite;
        camera.insert("DeviceModelName", ro, Visibility::Beginner, ParameterValue::String(model_name.to_string()));
        let serial = camera.info.serial_number.clone();
        let vendor = camera.info.vendor_name.clone();
        camera.insert("DeviceSerialNumber", ro, Visibility::Beginner, ParameterValue::String(serial));
        camera.insert("DeviceVendorName", ro, Visibility::Beginner, ParameterValue::String(vendor));
        camera.insert("SensorWidth", ro, Visibility::Expert, ParameterValue::Integer(width as i64));
        camera.insert("SensorHeight", ro, Visibility::Expert, ParameterValue::Integer(height as i64));
        camera.insert("Width", rw, Visibility::Beginner, ParameterValue::Integer(width as i64));
        camera.insert("Height", rw, Visibility::Beginner, ParameterValue::Integer(height as i64));
        camera.insert("PixelFormat", rw, Visibility::Beginner, ParameterValue::String(pixel_format.to_string()));
        camera.insert("ExposureTime", rw, Visibility::Beginner, ParameterValue::Float(10_000.0));
        camera.insert("Gain", rw, Visibility::Beginner, ParameterValue::Float(0.0));
        camera.insert("ReverseX", rw, Visibility::Expert, ParameterValue::Boolean(false));
        camera.insert("AcquisitionFrameRateEnable", rw, Visibility::Expert, ParameterValue::Boolean(false));
        camera.insert("AcquisitionFrameRate", rw, Visibility::Expert, ParameterValue::Float(30.0));
        camera.insert("DeviceTemperature", ro, Visibility::Guru, ParameterValue::Float(41.5));

        if let Some(node) = camera.nodes.get_mut("PixelFormat") {
            node.entries = Some(PixelFormat::ALL.iter().map(|f| f.name().to_string()).collect());
        }

        camera.insert_valueless("AcquisitionStart", AccessMode::WriteOnly, Visibility::Beginner);
        camera.insert_valueless("AcquisitionStop", AccessMode::WriteOnly, Visibility::Beginner);
        camera.insert_valueless("AnalogControl", AccessMode::ReadOnly, Visibility::Beginner);

        camera
    }

    /// Scripts the outcome of each frame of every grab; unscripted frames are delivered.
    pub fn with_script(mut self, script: Vec<FrameOutcome>) -> Self {
        self.script = script;
        self
    }

    /// Simulated readout time per frame.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn with_first_image_number(mut self, image_number: u64) -> Self {
        self.next_image_number = image_number;
        self
    }

    /// Overrides the access mode of an existing node.
    pub fn with_access(mut self, name: &str, access: AccessMode) -> Self {
        if let Some(node) = self.nodes.get_mut(name) {
            node.info.access = access;
        }
        self
    }

    fn insert(&mut self, name: &str, access: AccessMode, visibility: Visibility, value: ParameterValue) {
        let info = NodeInfo {
            name: name.to_string(),
            kind: Some(value.kind()),
            access,
            visibility,
        };
        self.nodes.insert(name.to_string(), SimNode { info, value: Some(value), entries: None });
    }

    fn insert_valueless(&mut self, name: &str, access: AccessMode, visibility: Visibility) {
        let info = NodeInfo {
            name: name.to_string(),
            kind: None,
            access,
            visibility,
        };
        self.nodes.insert(name.to_string(), SimNode { info, value: None, entries: None });
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(CameraError::Camera(anyhow::anyhow!(
                "camera \"{}\" is not open",
                self.info.model_name
            )))
        }
    }

    fn lookup(&self, name: &str) -> Result<&SimNode> {
        self.nodes
            .get(name)
            .ok_or_else(|| CameraError::NodeNotFound(name.to_string()))
    }

    fn integer(&self, name: &str) -> Result<usize> {
        match self.lookup(name)?.value {
            Some(ParameterValue::Integer(v)) if v > 0 => Ok(v as usize),
            _ => Err(CameraError::Camera(anyhow::anyhow!("{name} is not a positive integer"))),
        }
    }

    fn current_format(&self) -> Result<PixelFormat> {
        match &self.lookup("PixelFormat")?.value {
            Some(ParameterValue::String(name)) => PixelFormat::resolve(name),
            _ => Err(CameraError::Camera(anyhow::anyhow!("PixelFormat has no value"))),
        }
    }

    fn render_frame(&self, image_number: u64) -> Result<CapturedFrame> {
        let width = self.integer("Width")?;
        let height = self.integer("Height")?;
        let pixel_format = self.current_format()?;
        let data = render_test_pattern(image_number, width, height, pixel_format);
        Ok(CapturedFrame {
            width,
            height,
            pixel_format,
            data,
            image_number,
            grab_succeeded: true,
        })
    }
}

/// The value the simulator stores for one sample of frame `image_number`.
///
/// Integer formats use the low `bit_depth` bits; `Mono32f` maps into `[0, 1]`.
pub fn test_pattern_sample(
    image_number: u64,
    row: usize,
    col: usize,
    band: usize,
    bit_depth: u32,
) -> u32 {
    let raw = image_number as usize * 37 + row * 13 + col * 7 + band * 101;
    let bits = bit_depth.min(16);
    (raw % (1usize << bits)) as u32
}

/// Renders a full frame of [`test_pattern_sample`] values in `format`'s byte layout.
pub fn render_test_pattern(
    image_number: u64,
    width: usize,
    height: usize,
    format: PixelFormat,
) -> Vec<u8> {
    let bands = format.samples_per_pixel();
    let depth = format.bit_depth();
    let mut data = Vec::with_capacity(format.frame_bytes(width, height));

    if format.is_packed() {
        let samples: Vec<u16> = (0..height)
            .flat_map(|row| (0..width).map(move |col| (row, col)))
            .map(|(row, col)| test_pattern_sample(image_number, row, col, 0, depth) as u16)
            .collect();
        for pair in samples.chunks(2) {
            let p0 = pair[0];
            let p1 = pair.get(1).copied().unwrap_or(0);
            data.push((p0 & 0xFF) as u8);
            data.push(((p0 >> 8) & 0x0F) as u8 | ((p1 & 0x0F) << 4) as u8);
            if pair.len() == 2 {
                data.push((p1 >> 4) as u8);
            }
        }
        return data;
    }

    for row in 0..height {
        for col in 0..width {
            for band in 0..bands {
                let value = test_pattern_sample(image_number, row, col, band, depth);
                if format.is_float() {
                    data.extend_from_slice(&(value as f32 / u16::MAX as f32).to_le_bytes());
                } else if format.bytes_per_sample() == 1 {
                    data.push(value as u8);
                } else {
                    data.extend_from_slice(&(value as u16).to_le_bytes());
                }
            }
        }
    }
    data
}

impl CameraDevice for SimulatedCamera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self) -> Result<()> {
        debug!("Opening simulated camera \"{}\"", self.info.model_name);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug!("Closing simulated camera \"{}\"", self.info.model_name);
        self.grab = None;
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn node(&self, name: &str) -> Result<NodeInfo> {
        self.ensure_open()?;
        Ok(self.lookup(name)?.info.clone())
    }

    fn node_names(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.nodes.keys().cloned().collect())
    }

    fn read_node(&self, name: &str) -> Result<ParameterValue> {
        self.ensure_open()?;
        let node = self.lookup(name)?;
        if !node.info.access.is_readable() {
            return Err(CameraError::Camera(anyhow::anyhow!("Node \"{name}\" is not readable")));
        }
        node.value
            .clone()
            .ok_or_else(|| CameraError::Camera(anyhow::anyhow!("Node \"{name}\" has no value")))
    }

    fn write_node(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        self.ensure_open()?;
        let grabbing = self.grab.is_some();
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| CameraError::NodeNotFound(name.to_string()))?;

        if !node.info.access.is_writable()
            || node.info.kind != Some(value.kind())
            || (grabbing && LOCKED_WHILE_GRABBING.contains(&name))
        {
            return Err(CameraError::NotWritable(name.to_string()));
        }

        match value {
            ParameterValue::String(entry) => {
                if let Some(entries) = &node.entries {
                    if !entries.iter().any(|e| e == entry) {
                        return Err(CameraError::Camera(anyhow::anyhow!(
                            "\"{entry}\" is not a valid entry of {name}"
                        )));
                    }
                }
            }
            ParameterValue::Integer(v) if matches!(name, "Width" | "Height") && *v <= 0 => {
                return Err(CameraError::Camera(anyhow::anyhow!("{name} must be positive")));
            }
            _ => {}
        }

        trace!("{} <- {}", name, value);
        node.value = Some(value.clone());
        Ok(())
    }

    fn start_grab(&mut self, num_frames: usize) -> Result<()> {
        self.ensure_open()?;
        debug!("Simulated grab armed for {} frame(s)", num_frames);
        self.grab = Some(GrabState {
            requested: num_frames,
            delivered: 0,
        });
        Ok(())
    }

    fn retrieve_frame(&mut self, timeout: Duration) -> Result<CapturedFrame> {
        let index = match &self.grab {
            Some(grab) if grab.delivered < grab.requested => grab.delivered,
            Some(_) => {
                return Err(CameraError::Camera(anyhow::anyhow!(
                    "all requested frames were already retrieved"
                )));
            }
            None => return Err(CameraError::Camera(anyhow::anyhow!("grab is not started"))),
        };

        let outcome = self.script.get(index).copied().unwrap_or(FrameOutcome::Deliver);
        if outcome == FrameOutcome::Timeout || self.frame_delay > timeout {
            if self.frame_delay > Duration::ZERO {
                std::thread::sleep(timeout.min(self.frame_delay));
            }
            return Err(CameraError::Timeout { frame: index, timeout });
        }
        if self.frame_delay > Duration::ZERO {
            std::thread::sleep(self.frame_delay);
        }

        let image_number = self.next_image_number;
        self.next_image_number += 1;
        if let Some(grab) = self.grab.as_mut() {
            grab.delivered += 1;
        }

        match outcome {
            FrameOutcome::GrabFailed => {
                debug!("Simulated grab failure for frame {}", index);
                Ok(CapturedFrame {
                    width: self.integer("Width")?,
                    height: self.integer("Height")?,
                    pixel_format: self.current_format()?,
                    data: Vec::new(),
                    image_number,
                    grab_succeeded: false,
                })
            }
            _ => self.render_frame(image_number),
        }
    }

    fn stop_grab(&mut self) -> Result<()> {
        if let Some(grab) = self.grab.take() {
            debug!(
                "Simulated grab stopped after {}/{} frame(s)",
                grab.delivered, grab.requested
            );
        }
        Ok(())
    }
}

/// A transport with a fixed set of simulated cameras.
///
/// Every [`TransportLayer::create_device`] call hands out a fresh copy of the
/// configured camera, so sessions never share device state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    cameras: Vec<SimulatedCamera>,
}

impl SimulatedTransport {
    pub fn new(cameras: Vec<SimulatedCamera>) -> Self {
        Self { cameras }
    }

    /// Two cameras: a monochrome one and a Bayer colour one.
    pub fn demo() -> Self {
        Self::new(vec![
            SimulatedCamera::new("acA1300-200um", 640, 480, PixelFormat::Mono8),
            SimulatedCamera::new("acA1920-40uc", 640, 480, PixelFormat::BayerRG8),
        ])
    }
}

impl TransportLayer for SimulatedTransport {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.cameras.iter().map(|c| c.info.clone()).collect())
    }

    fn create_device(&self, index: usize) -> Result<Box<dyn CameraDevice>> {
        let camera = self.cameras.get(index).ok_or_else(|| {
            CameraError::DeviceNotFound("No camera with this index exists.".to_string())
        })?;
        Ok(Box::new(camera.clone()))
    }
}
