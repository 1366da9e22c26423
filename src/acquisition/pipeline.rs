use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::acquisition::{
    common::error::{CameraError, Result},
    config::{AcquisitionConfig, WriteFailurePolicy},
    convert::{PixelFormatConverter, StandardConverter},
    device::{CameraDevice, CapturedFrame},
    layout::{ElementType, FrameBuffer},
    naming::PathTemplate,
    parameters,
    pixel_format::{PixelFormat, needs_conversion},
    tiff::{StandardTiffWriter, TiffWriter},
};
use crate::report;

/// Outcome of one frame slot of a capture run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    Succeeded,
    /// The device reported a failed grab; the slot was left untouched.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub statuses: Vec<FrameStatus>,
}

impl CaptureReport {
    pub fn succeeded(&self) -> usize {
        self.statuses.iter().filter(|s| **s == FrameStatus::Succeeded).count()
    }

    /// Indices of frames whose buffer slots are unspecified.
    pub fn failed_frames(&self) -> Vec<usize> {
        self.statuses
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == FrameStatus::Failed)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.statuses.iter().all(|s| *s == FrameStatus::Succeeded)
    }
}

/// A filled buffer together with the per-frame outcome.
#[derive(Debug, Clone)]
pub struct Capture {
    pub buffer: FrameBuffer,
    pub report: CaptureReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedWrite {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub written: Vec<PathBuf>,
    /// Frame indices whose grab failed; nothing was written for them.
    pub failed_grabs: Vec<usize>,
    pub failed_writes: Vec<FailedWrite>,
}

/// Everything read from the device before the grab starts.
#[derive(Debug, Clone, Copy)]
struct SessionPlan {
    width: usize,
    height: usize,
    source: PixelFormat,
    target: PixelFormat,
    num_frames: usize,
}

/// Armed grab engine. Dropping the session stops the grab.
struct GrabSession<'a> {
    device: &'a mut dyn CameraDevice,
    active: bool,
}

impl<'a> GrabSession<'a> {
    fn start(device: &'a mut dyn CameraDevice, num_frames: usize) -> Result<Self> {
        device.start_grab(num_frames)?;
        debug!("Grab session started for {} frame(s)", num_frames);
        Ok(Self { device, active: true })
    }

    fn retrieve(&mut self, index: usize, timeout: Duration) -> Result<CapturedFrame> {
        self.device.retrieve_frame(timeout).map_err(|e| match e {
            CameraError::Timeout { timeout, .. } => CameraError::Timeout { frame: index, timeout },
            other => other,
        })
    }

    fn stop(mut self) -> Result<()> {
        self.active = false;
        debug!("Grab session stopped");
        self.device.stop_grab()
    }
}

impl Drop for GrabSession<'_> {
    fn drop(&mut self) {
        if self.active {
            debug!("Grab session aborted, stopping grab");
            if let Err(e) = self.device.stop_grab() {
                warn!("Failed to stop grab: {}", e);
            }
        }
    }
}

pub struct AcquisitionPipeline<C: PixelFormatConverter, W: TiffWriter> {
    converter: C,
    writer: W,
    config: AcquisitionConfig,
}

impl AcquisitionPipeline<StandardConverter, StandardTiffWriter> {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self {
            converter: StandardConverter,
            writer: StandardTiffWriter,
            config,
        }
    }
}

impl<C: PixelFormatConverter, W: TiffWriter> AcquisitionPipeline<C, W> {
    pub fn with_custom(converter: C, writer: W, config: AcquisitionConfig) -> Self {
        Self {
            converter,
            writer,
            config,
        }
    }

    fn validate_dimensions(&self, width: usize, height: usize) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidDimensions(width, height));
        }

        Ok(())
    }

    fn dimension(&self, device: &dyn CameraDevice, name: &str) -> Result<usize> {
        let value = parameters::get_int(device, name, self.config.verbose)?;
        usize::try_from(value)
            .map_err(|_| CameraError::Camera(anyhow::anyhow!("{name} is negative: {value}")))
    }

    /// Reads the session geometry and resolves formats; nothing is grabbed yet.
    fn plan(
        &self,
        device: &dyn CameraDevice,
        num_frames: usize,
        target: Option<PixelFormat>,
    ) -> Result<SessionPlan> {
        if num_frames == 0 {
            return Err(CameraError::InvalidFrameCount(num_frames));
        }

        let width = self.dimension(device, "Width")?;
        let height = self.dimension(device, "Height")?;
        self.validate_dimensions(width, height)?;

        let source = PixelFormat::resolve(&parameters::get_string(
            device,
            "PixelFormat",
            self.config.verbose,
        )?)?;
        let target = target.unwrap_or(source);
        let convert = needs_conversion(source, target)?;
        if convert {
            report!(self.config.verbose, "Using output data type \"{}\"", target);
        }

        Ok(SessionPlan {
            width,
            height,
            source,
            target,
            num_frames,
        })
    }

    /// Converts a retrieved frame to the session's target format if needed.
    fn prepare_frame(
        &self,
        index: usize,
        frame: CapturedFrame,
        plan: &SessionPlan,
    ) -> Result<CapturedFrame> {
        if frame.width != plan.width || frame.height != plan.height {
            return Err(CameraError::FrameSizeMismatch {
                frame: index,
                expected: plan.source.frame_bytes(plan.width, plan.height),
                actual: frame.data.len(),
            });
        }

        if !needs_conversion(frame.pixel_format, plan.target)? {
            return Ok(frame);
        }

        let _span = tracing::info_span!("convert",
            frame = index,
            from = %frame.pixel_format,
            to = %plan.target
        ).entered();
        self.converter.convert(&frame, plan.target)
    }

    fn check_buffer(&self, buffer: &FrameBuffer, plan: &SessionPlan) -> Result<()> {
        let layout = buffer.layout();
        let element = ElementType::for_format(plan.target)?;
        if layout.height != plan.height
            || layout.width != plan.width
            || layout.samples_per_pixel != plan.target.samples_per_pixel()
            || buffer.element_type() != element
        {
            return Err(CameraError::BufferMismatch(format!(
                "buffer {:?} {:?} cannot hold {}x{} {} frames",
                layout.dims(),
                buffer.element_type(),
                plan.height,
                plan.width,
                plan.target
            )));
        }
        Ok(())
    }

    fn run_capture(
        &self,
        device: &mut dyn CameraDevice,
        buffer: &mut FrameBuffer,
        plan: &SessionPlan,
    ) -> Result<CaptureReport> {
        report!(self.config.verbose, "Capturing {} frame(s)", plan.num_frames);

        let mut report = CaptureReport::default();
        let mut session = GrabSession::start(device, plan.num_frames)?;

        for index in 0..plan.num_frames {
            let frame = session.retrieve(index, self.config.timeout)?;
            if !frame.grab_succeeded {
                warn!("Grab of frame {} failed, leaving its buffer slot unset", index);
                report.statuses.push(FrameStatus::Failed);
                continue;
            }

            let frame = self.prepare_frame(index, frame, plan)?;
            {
                let _span = tracing::debug_span!("write_frame", frame = index).entered();
                buffer.write_frame(index, &frame)?;
            }
            report.statuses.push(FrameStatus::Succeeded);
        }

        session.stop()?;
        Ok(report)
    }

    /// Captures into a caller-allocated buffer.
    ///
    /// The buffer's frame count is the number of frames grabbed. On a timeout
    /// the frames already written stay in place and the error is returned.
    #[instrument(skip(self, device, buffer), fields(num_frames = buffer.layout().num_frames))]
    pub fn capture_into(
        &self,
        device: &mut dyn CameraDevice,
        buffer: &mut FrameBuffer,
        target: Option<PixelFormat>,
    ) -> Result<CaptureReport> {
        let plan = self.plan(device, buffer.layout().num_frames, target)?;
        self.check_buffer(buffer, &plan)?;
        let report = self.run_capture(device, buffer, &plan)?;
        info!(
            succeeded = report.succeeded(),
            failed = report.failed_frames().len(),
            "Capture complete"
        );
        Ok(report)
    }

    /// Allocates a buffer sized for `num_frames` frames and captures into it.
    #[instrument(skip(self, device))]
    pub fn capture_images(
        &self,
        device: &mut dyn CameraDevice,
        num_frames: usize,
        target: Option<PixelFormat>,
    ) -> Result<Capture> {
        let plan = self.plan(device, num_frames, target)?;
        let mut buffer = FrameBuffer::for_format(plan.width, plan.height, plan.target, num_frames)?;
        let report = self.run_capture(device, &mut buffer, &plan)?;
        info!(
            width = plan.width,
            height = plan.height,
            format = %plan.target,
            succeeded = report.succeeded(),
            "Capture complete"
        );
        Ok(Capture { buffer, report })
    }

    /// Encodes the whole frame before touching the file system, so a failed
    /// encode never leaves a file behind.
    fn write_frame_file(&self, frame: &CapturedFrame, path: &Path) -> Result<()> {
        let mut encoded = Vec::new();
        self.writer
            .write_tiff(frame, &mut encoded, &self.config)
            .map_err(|e| match e {
                CameraError::Encode { message, .. } => CameraError::Encode {
                    path: Some(path.to_path_buf()),
                    message,
                },
                other => other,
            })?;

        std::fs::write(path, &encoded).map_err(|e| {
            if path.is_file() {
                if let Err(cleanup) = std::fs::remove_file(path) {
                    warn!("Failed to remove partial file {}: {}", path.display(), cleanup);
                }
            }
            CameraError::File(format!("{}: {}", path.display(), e))
        })
    }

    /// Grabs `num_frames` frames and writes each one to a TIFF file named by
    /// substituting the frame's image number into `template`.
    ///
    /// The template's directory must already exist.
    #[instrument(skip(self, device, template))]
    pub fn save_images(
        &self,
        device: &mut dyn CameraDevice,
        template: &PathTemplate,
        num_frames: usize,
        target: Option<PixelFormat>,
    ) -> Result<SaveReport> {
        let plan = self.plan(device, num_frames, target)?;
        report!(self.config.verbose, "Capturing {} frame(s)", plan.num_frames);

        let mut report = SaveReport::default();
        let mut session = GrabSession::start(device, plan.num_frames)?;

        for index in 0..plan.num_frames {
            let frame = session.retrieve(index, self.config.timeout)?;
            if !frame.grab_succeeded {
                warn!("Grab of frame {} failed, nothing written", index);
                report.failed_grabs.push(index);
                continue;
            }

            let frame = self.prepare_frame(index, frame, &plan)?;
            let path = template.render(frame.image_number);

            let written = {
                let _span = tracing::info_span!("encode_tiff", frame = index).entered();
                self.write_frame_file(&frame, &path)
            };
            match written {
                Ok(()) => {
                    debug!("Wrote {}", path.display());
                    report.written.push(path);
                }
                Err(e) => match self.config.write_failure {
                    WriteFailurePolicy::Abort => return Err(e),
                    WriteFailurePolicy::Skip => {
                        warn!("Failed to write frame {} to {}: {}", index, path.display(), e);
                        report.failed_writes.push(FailedWrite {
                            path,
                            error: e.to_string(),
                        });
                    }
                },
            }
        }

        session.stop()?;
        info!(
            written = report.written.len(),
            failed_grabs = report.failed_grabs.len(),
            failed_writes = report.failed_writes.len(),
            "Save complete"
        );
        Ok(report)
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: AcquisitionConfig) {
        self.config = config;
    }
}
