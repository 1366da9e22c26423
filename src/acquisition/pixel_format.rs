//! Pixel format resolution
//!
//! Maps the symbolic pixel format names reported by a camera's `PixelFormat`
//! node (PFNC names) onto their sample layout, and decides when a frame has to
//! go through the converter before it can be written out.

use std::fmt;
use std::str::FromStr;

use crate::acquisition::common::error::{CameraError, Result};

/// Colour filter arrangement of a Bayer sensor, named by its top-left 2x2 tile.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BayerPattern {
    RG,
    BG,
    GB,
    GR,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Mono8,
    Mono10,
    Mono12,
    /// 12-bit luminance, two pixels packed into three bytes.
    Mono12p,
    Mono16,
    Mono32f,
    BayerRG8,
    BayerBG8,
    BayerGB8,
    BayerGR8,
    BayerRG12,
    BayerBG12,
    BayerGB12,
    BayerGR12,
    BayerRG16,
    BayerBG16,
    BayerGB16,
    BayerGR16,
    RGB8,
    BGR8,
    RGB16,
    BGRA8,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 22] = [
        PixelFormat::Mono8,
        PixelFormat::Mono10,
        PixelFormat::Mono12,
        PixelFormat::Mono12p,
        PixelFormat::Mono16,
        PixelFormat::Mono32f,
        PixelFormat::BayerRG8,
        PixelFormat::BayerBG8,
        PixelFormat::BayerGB8,
        PixelFormat::BayerGR8,
        PixelFormat::BayerRG12,
        PixelFormat::BayerBG12,
        PixelFormat::BayerGB12,
        PixelFormat::BayerGR12,
        PixelFormat::BayerRG16,
        PixelFormat::BayerBG16,
        PixelFormat::BayerGB16,
        PixelFormat::BayerGR16,
        PixelFormat::RGB8,
        PixelFormat::BGR8,
        PixelFormat::RGB16,
        PixelFormat::BGRA8,
    ];

    /// Resolves a symbolic name such as `"Mono8"` or `"RGB8Packed"`.
    pub fn resolve(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        let canonical = match trimmed {
            "RGB8Packed" => "RGB8",
            "BGR8Packed" => "BGR8",
            "BGRA8Packed" => "BGRA8",
            other => other,
        };
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == canonical)
            .ok_or_else(|| CameraError::UnknownFormat(trimmed.to_string()))
    }

    pub fn name(&self) -> &'static str {
        use PixelFormat::*;
        match self {
            Mono8 => "Mono8",
            Mono10 => "Mono10",
            Mono12 => "Mono12",
            Mono12p => "Mono12p",
            Mono16 => "Mono16",
            Mono32f => "Mono32f",
            BayerRG8 => "BayerRG8",
            BayerBG8 => "BayerBG8",
            BayerGB8 => "BayerGB8",
            BayerGR8 => "BayerGR8",
            BayerRG12 => "BayerRG12",
            BayerBG12 => "BayerBG12",
            BayerGB12 => "BayerGB12",
            BayerGR12 => "BayerGR12",
            BayerRG16 => "BayerRG16",
            BayerBG16 => "BayerBG16",
            BayerGB16 => "BayerGB16",
            BayerGR16 => "BayerGR16",
            RGB8 => "RGB8",
            BGR8 => "BGR8",
            RGB16 => "RGB16",
            BGRA8 => "BGRA8",
        }
    }

    /// Significant bits per sample (per band).
    pub fn bit_depth(&self) -> u32 {
        use PixelFormat::*;
        match self {
            Mono8 | BayerRG8 | BayerBG8 | BayerGB8 | BayerGR8 | RGB8 | BGR8 | BGRA8 => 8,
            Mono10 => 10,
            Mono12 | Mono12p | BayerRG12 | BayerBG12 | BayerGB12 | BayerGR12 => 12,
            Mono16 | BayerRG16 | BayerBG16 | BayerGB16 | BayerGR16 | RGB16 => 16,
            Mono32f => 32,
        }
    }

    /// Number of bands per pixel.
    pub fn samples_per_pixel(&self) -> usize {
        use PixelFormat::*;
        match self {
            RGB8 | BGR8 | RGB16 => 3,
            BGRA8 => 4,
            _ => 1,
        }
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.bit_depth() * self.samples_per_pixel() as u32
    }

    pub fn is_packed(&self) -> bool {
        matches!(self, PixelFormat::Mono12p)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PixelFormat::Mono32f)
    }

    /// Bytes used to store one unpacked sample in a frame.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bit_depth() as usize).div_ceil(8)
    }

    /// Size in bytes of a full `width` x `height` frame in this format.
    pub fn frame_bytes(&self, width: usize, height: usize) -> usize {
        let pixels = width * height;
        if self.is_packed() {
            (pixels * self.bit_depth() as usize).div_ceil(8)
        } else {
            pixels * self.samples_per_pixel() * self.bytes_per_sample()
        }
    }

    pub fn bayer_pattern(&self) -> Option<BayerPattern> {
        use PixelFormat::*;
        match self {
            BayerRG8 | BayerRG12 | BayerRG16 => Some(BayerPattern::RG),
            BayerBG8 | BayerBG12 | BayerBG16 => Some(BayerPattern::BG),
            BayerGB8 | BayerGB12 | BayerGB16 => Some(BayerPattern::GB),
            BayerGR8 | BayerGR12 | BayerGR16 => Some(BayerPattern::GR),
            _ => None,
        }
    }

    /// Whether the converter can produce frames in this format.
    pub fn is_conversion_output(&self) -> bool {
        use PixelFormat::*;
        matches!(self, Mono8 | Mono16 | Mono32f | RGB8 | BGR8 | RGB16)
    }
}

/// Decides whether frames in `source` must be converted to produce `target`.
///
/// Identical formats never convert. Differing formats convert only if the
/// target is a supported conversion output; anything else is an error rather
/// than a silent pass-through of mislabelled data.
pub fn needs_conversion(source: PixelFormat, target: PixelFormat) -> Result<bool> {
    if source == target {
        return Ok(false);
    }
    if !target.is_conversion_output() {
        return Err(CameraError::UnsupportedConversion {
            from: source.to_string(),
            to: target.to_string(),
        });
    }
    Ok(true)
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}
