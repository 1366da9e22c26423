//! Background execution of save runs.
//!
//! A [`SaveSession`] opens its own device on the session thread and closes it
//! when the run ends, so a device handle is never shared between sessions.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use crate::acquisition::{
    common::error::{CameraError, Result},
    config::AcquisitionConfig,
    device::{TransportLayer, open_camera},
    naming::PathTemplate,
    pipeline::{AcquisitionPipeline, SaveReport},
    pixel_format::PixelFormat,
};
use crate::report;

pub struct SaveSession {
    transport: Arc<dyn TransportLayer>,
    camera_index: usize,
    template: PathTemplate,
    num_frames: usize,
    target: Option<PixelFormat>,
    config: AcquisitionConfig,
}

impl SaveSession {
    pub fn new(
        transport: Arc<dyn TransportLayer>,
        camera_index: usize,
        template: PathTemplate,
        num_frames: usize,
    ) -> Self {
        Self {
            transport,
            camera_index,
            template,
            num_frames,
            target: None,
            config: AcquisitionConfig::default(),
        }
    }

    pub fn with_target(mut self, target: Option<PixelFormat>) -> Self {
        self.target = target;
        self
    }

    pub fn with_config(mut self, config: AcquisitionConfig) -> Self {
        self.config = config;
        self
    }

    fn execute(self) -> Result<SaveReport> {
        let verbose = self.config.verbose;
        let mut camera = open_camera(self.transport.as_ref(), self.camera_index, verbose)?;
        if let Some(dir) = self.template.parent_dir() {
            report!(verbose, "Saving to \"{}\"", dir.display());
        }

        let pipeline = AcquisitionPipeline::new(self.config);
        let report =
            pipeline.save_images(&mut *camera, &self.template, self.num_frames, self.target)?;
        camera.close()?;
        Ok(report)
    }

    /// Starts the run on its own thread.
    pub fn spawn(self) -> Result<SessionHandle> {
        let handle = thread::Builder::new()
            .name("camgrab-session".to_string())
            .spawn(move || {
                let result = self.execute();
                if let Err(e) = &result {
                    error!("Acquisition session failed: {}", e);
                }
                result
            })?;
        Ok(SessionHandle { handle })
    }

    /// Runs the session on a background thread.
    ///
    /// Detached runs return `Ok(None)` immediately; their outcome is only
    /// visible in the log. Joined runs block and return the report or error.
    pub fn run(self, detached: bool) -> Result<Option<SaveReport>> {
        let handle = self.spawn()?;
        if detached {
            handle.detach();
            Ok(None)
        } else {
            handle.join().map(Some)
        }
    }
}

/// Handle to a running save session.
#[must_use = "dropping the handle detaches the session"]
pub struct SessionHandle {
    handle: JoinHandle<Result<SaveReport>>,
}

impl SessionHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the run completes and surfaces its error, if any.
    pub fn join(self) -> Result<SaveReport> {
        self.handle
            .join()
            .map_err(|_| CameraError::Camera(anyhow::anyhow!("acquisition session panicked")))?
    }

    pub fn detach(self) {
        info!("Acquisition session detached");
        drop(self.handle);
    }
}
