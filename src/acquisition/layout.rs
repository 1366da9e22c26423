//! Destination buffer layout
//!
//! Frames arrive row-major with interleaved bands. The destination is a 4-D
//! array `(height, width, bands, frames)` stored column-major within each
//! band plane, band planes one after another, frames outermost:
//!
//! ```text
//! offset = frame * (height * width * bands)
//!        + band * (height * width)
//!        + row
//!        + col * height
//! ```

use crate::acquisition::common::error::{CameraError, Result};
use crate::acquisition::device::CapturedFrame;
use crate::acquisition::pixel_format::PixelFormat;

/// Storage type of one buffer element, chosen from the bit depth.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ElementType {
    U8,
    U16,
    F32,
}

impl ElementType {
    pub fn for_bit_depth(bit_depth: u32) -> Self {
        match bit_depth {
            0..=8 => ElementType::U8,
            9..=16 => ElementType::U16,
            _ => ElementType::F32,
        }
    }

    /// Element type for frames in `format`; packed formats must be converted first.
    pub fn for_format(format: PixelFormat) -> Result<Self> {
        if format.is_packed() {
            return Err(CameraError::UnsupportedLayout(format.to_string()));
        }
        Ok(Self::for_bit_depth(format.bit_depth()))
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::U16 => 2,
            ElementType::F32 => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub height: usize,
    pub width: usize,
    pub samples_per_pixel: usize,
    pub num_frames: usize,
}

impl FrameLayout {
    pub fn new(height: usize, width: usize, samples_per_pixel: usize, num_frames: usize) -> Result<Self> {
        if width == 0 || height == 0 || samples_per_pixel == 0 {
            return Err(CameraError::InvalidDimensions(width, height));
        }
        if num_frames == 0 {
            return Err(CameraError::InvalidFrameCount(num_frames));
        }
        Ok(Self {
            height,
            width,
            samples_per_pixel,
            num_frames,
        })
    }

    /// Elements in one band plane.
    pub fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// Elements in one frame.
    pub fn frame_len(&self) -> usize {
        self.plane_len() * self.samples_per_pixel
    }

    pub fn len(&self) -> usize {
        self.frame_len() * self.num_frames
    }

    /// `[height, width, bands, frames]`
    pub fn dims(&self) -> [usize; 4] {
        [self.height, self.width, self.samples_per_pixel, self.num_frames]
    }

    #[inline]
    pub fn offset(&self, frame: usize, band: usize, row: usize, col: usize) -> usize {
        frame * self.frame_len() + band * self.plane_len() + row + col * self.height
    }

    /// Index of a sample in a row-major, band-interleaved source frame.
    #[inline]
    pub fn source_index(&self, band: usize, row: usize, col: usize) -> usize {
        band + self.samples_per_pixel * (row * self.width + col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

/// The destination of a whole capture run, allocated once at its final size.
///
/// Slots of frames whose grab failed keep whatever they held before; callers
/// must treat them as unspecified.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    layout: FrameLayout,
    data: FrameData,
}

impl FrameBuffer {
    pub fn allocate(layout: FrameLayout, element: ElementType) -> Self {
        let len = layout.len();
        let data = match element {
            ElementType::U8 => FrameData::U8(vec![0; len]),
            ElementType::U16 => FrameData::U16(vec![0; len]),
            ElementType::F32 => FrameData::F32(vec![0.0; len]),
        };
        Self { layout, data }
    }

    /// Allocates a buffer for `num_frames` frames of the given size and format.
    pub fn for_format(width: usize, height: usize, format: PixelFormat, num_frames: usize) -> Result<Self> {
        let element = ElementType::for_format(format)?;
        let layout = FrameLayout::new(height, width, format.samples_per_pixel(), num_frames)?;
        Ok(Self::allocate(layout, element))
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn element_type(&self) -> ElementType {
        match self.data {
            FrameData::U8(_) => ElementType::U8,
            FrameData::U16(_) => ElementType::U16,
            FrameData::F32(_) => ElementType::F32,
        }
    }

    pub fn data(&self) -> &FrameData {
        &self.data
    }

    pub fn into_data(self) -> FrameData {
        self.data
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.data {
            FrameData::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match &self.data {
            FrameData::U16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            FrameData::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Reads one element as `f64`, or `None` outside the buffer.
    pub fn get(&self, row: usize, col: usize, band: usize, frame: usize) -> Option<f64> {
        let l = &self.layout;
        if row >= l.height || col >= l.width || band >= l.samples_per_pixel || frame >= l.num_frames {
            return None;
        }
        let offset = l.offset(frame, band, row, col);
        Some(match &self.data {
            FrameData::U8(v) => v[offset] as f64,
            FrameData::U16(v) => v[offset] as f64,
            FrameData::F32(v) => v[offset] as f64,
        })
    }

    /// Transposes `frame` into slot `frame_index`.
    pub fn write_frame(&mut self, frame_index: usize, frame: &CapturedFrame) -> Result<()> {
        let layout = self.layout;
        if frame_index >= layout.num_frames {
            return Err(CameraError::BufferMismatch(format!(
                "frame index {frame_index} outside buffer of {} frame(s)",
                layout.num_frames
            )));
        }
        if frame.width != layout.width
            || frame.height != layout.height
            || frame.pixel_format.samples_per_pixel() != layout.samples_per_pixel
        {
            return Err(CameraError::BufferMismatch(format!(
                "{}x{}x{} frame does not fit {}x{}x{} buffer",
                frame.height,
                frame.width,
                frame.pixel_format.samples_per_pixel(),
                layout.height,
                layout.width,
                layout.samples_per_pixel
            )));
        }
        let element = ElementType::for_format(frame.pixel_format)?;
        if element != self.element_type() {
            return Err(CameraError::BufferMismatch(format!(
                "{} frame cannot be stored in a {:?} buffer",
                frame.pixel_format,
                self.element_type()
            )));
        }
        let expected = layout.frame_len() * element.size_bytes();
        if frame.data.len() < expected {
            return Err(CameraError::FrameSizeMismatch {
                frame: frame_index,
                expected,
                actual: frame.data.len(),
            });
        }

        let src = &frame.data;
        match &mut self.data {
            FrameData::U8(dst) => transpose(dst, &layout, frame_index, |i| src[i]),
            FrameData::U16(dst) => transpose(dst, &layout, frame_index, |i| {
                u16::from_le_bytes([src[2 * i], src[2 * i + 1]])
            }),
            FrameData::F32(dst) => transpose(dst, &layout, frame_index, |i| {
                f32::from_le_bytes([src[4 * i], src[4 * i + 1], src[4 * i + 2], src[4 * i + 3]])
            }),
        }
        Ok(())
    }
}

fn transpose<T: Copy>(
    dst: &mut [T],
    layout: &FrameLayout,
    frame: usize,
    sample: impl Fn(usize) -> T,
) {
    for band in 0..layout.samples_per_pixel {
        for row in 0..layout.height {
            for col in 0..layout.width {
                dst[layout.offset(frame, band, row, col)] = sample(layout.source_index(band, row, col));
            }
        }
    }
}
