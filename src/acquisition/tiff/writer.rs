use std::io::Write;
use crate::acquisition::common::error::Result;
use crate::acquisition::config::AcquisitionConfig;
use crate::acquisition::device::CapturedFrame;

pub trait TiffWriter {
    fn write_tiff(&self, frame: &CapturedFrame, output: &mut dyn Write, config: &AcquisitionConfig) -> Result<()>;
}
