//! Pixel format conversion
//!
//! Every source frame is first normalised to 16-bit samples with one (mono)
//! or three (RGB) bands, then re-encoded into the target format. Bayer sources
//! are demosaiced with the `bayer` crate.

use std::io::Cursor;

use anyhow::anyhow;
use bayer::{BayerDepth, CFA, Demosaic, RasterDepth, RasterMut};
use tracing::{debug, trace};

use crate::acquisition::common::error::{CameraError, Result};
use crate::acquisition::device::CapturedFrame;
use crate::acquisition::pixel_format::{BayerPattern, PixelFormat};

pub trait PixelFormatConverter {
    /// Converts `source` into `target`, keeping its dimensions and image number.
    fn convert(&self, source: &CapturedFrame, target: PixelFormat) -> Result<CapturedFrame>;
}

/// CPU converter covering every known source format.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardConverter;

/// Luma weights (ITU-R BT.601) used when dropping colour.
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

struct Canonical {
    bands: usize,
    samples: Vec<u16>,
}

impl PixelFormatConverter for StandardConverter {
    fn convert(&self, source: &CapturedFrame, target: PixelFormat) -> Result<CapturedFrame> {
        if !target.is_conversion_output() {
            return Err(CameraError::UnsupportedConversion {
                from: source.pixel_format.to_string(),
                to: target.to_string(),
            });
        }
        let expected = source.expected_len();
        if source.data.len() < expected {
            return Err(CameraError::FrameSizeMismatch {
                frame: source.image_number as usize,
                expected,
                actual: source.data.len(),
            });
        }

        debug!(
            "Converting frame {} from {} to {}",
            source.image_number, source.pixel_format, target
        );
        let canonical = to_canonical(source)?;
        let data = from_canonical(&canonical, target);
        trace!("Converted frame is {} bytes", data.len());

        Ok(CapturedFrame {
            width: source.width,
            height: source.height,
            pixel_format: target,
            data,
            image_number: source.image_number,
            grab_succeeded: source.grab_succeeded,
        })
    }
}

fn scale_to_16(value: u32, bit_depth: u32) -> u16 {
    if bit_depth >= 16 {
        return value.min(u16::MAX as u32) as u16;
    }
    let max = (1u32 << bit_depth) - 1;
    (value.min(max) * u16::MAX as u32 / max) as u16
}

fn scale_from_16(value: u16, bit_depth: u32) -> u32 {
    let max = (1u32 << bit_depth) - 1;
    (value as u32 * max + u16::MAX as u32 / 2) / u16::MAX as u32
}

fn read_u16_samples(data: &[u8], count: usize) -> Vec<u16> {
    data.chunks_exact(2)
        .take(count)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Unpacks PFNC `Mono12p` data: two pixels in three bytes, least significant bits first.
pub fn unpack_mono12p(data: &[u8], pixel_count: usize) -> Vec<u16> {
    let mut out = Vec::with_capacity(pixel_count);
    for chunk in data.chunks(3) {
        if out.len() >= pixel_count {
            break;
        }
        let b0 = chunk[0] as u16;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u16;
        out.push(b0 | ((b1 & 0x0F) << 8));
        if out.len() < pixel_count {
            let b2 = chunk.get(2).copied().unwrap_or(0) as u16;
            out.push((b1 >> 4) | (b2 << 4));
        }
    }
    out
}

fn cfa_for(pattern: BayerPattern) -> CFA {
    match pattern {
        BayerPattern::RG => CFA::RGGB,
        BayerPattern::BG => CFA::BGGR,
        BayerPattern::GB => CFA::GBRG,
        BayerPattern::GR => CFA::GRBG,
    }
}

fn demosaic(frame: &CapturedFrame, pattern: BayerPattern) -> anyhow::Result<Vec<u16>> {
    let (width, height) = (frame.width, frame.height);
    let depth = frame.pixel_format.bit_depth();
    let (bayer_depth, raster_depth, bytes_per_sample) = if depth <= 8 {
        (BayerDepth::Depth8, RasterDepth::Depth8, 1)
    } else {
        (BayerDepth::Depth16LE, RasterDepth::Depth16, 2)
    };

    let mut output_buf = vec![0u8; width * height * 3 * bytes_per_sample];
    {
        let mut cursor = Cursor::new(&frame.data[..]);
        let mut output_raster = RasterMut::new(width, height, raster_depth, &mut output_buf);
        bayer::run_demosaic(
            &mut cursor,
            bayer_depth,
            cfa_for(pattern),
            Demosaic::Linear,
            &mut output_raster,
        )
        .map_err(|e| anyhow!("Demosaic failed: {:?}", e))?;
    }

    let samples = if bytes_per_sample == 1 {
        output_buf.iter().map(|&v| scale_to_16(v as u32, 8)).collect()
    } else {
        read_u16_samples(&output_buf, width * height * 3)
            .into_iter()
            .map(|v| scale_to_16(v as u32, depth))
            .collect()
    };
    Ok(samples)
}

fn to_canonical(frame: &CapturedFrame) -> Result<Canonical> {
    let format = frame.pixel_format;
    let pixels = frame.width * frame.height;
    let depth = format.bit_depth();

    if let Some(pattern) = format.bayer_pattern() {
        let _span = tracing::debug_span!("demosaic", pattern = ?pattern).entered();
        let samples = demosaic(frame, pattern)?;
        return Ok(Canonical { bands: 3, samples });
    }

    let canonical = match format {
        PixelFormat::Mono12p => Canonical {
            bands: 1,
            samples: unpack_mono12p(&frame.data, pixels)
                .into_iter()
                .map(|v| scale_to_16(v as u32, depth))
                .collect(),
        },
        PixelFormat::Mono32f => Canonical {
            bands: 1,
            samples: frame
                .data
                .chunks_exact(4)
                .take(pixels)
                .map(|b| {
                    let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16
                })
                .collect(),
        },
        PixelFormat::BGRA8 => Canonical {
            bands: 3,
            samples: frame
                .data
                .chunks_exact(4)
                .take(pixels)
                .flat_map(|p| [p[2], p[1], p[0]])
                .map(|v| scale_to_16(v as u32, 8))
                .collect(),
        },
        PixelFormat::BGR8 => Canonical {
            bands: 3,
            samples: frame
                .data
                .chunks_exact(3)
                .take(pixels)
                .flat_map(|p| [p[2], p[1], p[0]])
                .map(|v| scale_to_16(v as u32, 8))
                .collect(),
        },
        _ => {
            let bands = format.samples_per_pixel();
            let count = pixels * bands;
            let raw: Vec<u32> = if format.bytes_per_sample() == 1 {
                frame.data.iter().take(count).map(|&v| v as u32).collect()
            } else {
                read_u16_samples(&frame.data, count)
                    .into_iter()
                    .map(u32::from)
                    .collect()
            };
            Canonical {
                bands,
                samples: raw.into_iter().map(|v| scale_to_16(v, depth)).collect(),
            }
        }
    };
    Ok(canonical)
}

fn luma(rgb: &[u16]) -> u16 {
    let y = LUMA[0] * rgb[0] as f32 + LUMA[1] * rgb[1] as f32 + LUMA[2] * rgb[2] as f32;
    y.round().clamp(0.0, u16::MAX as f32) as u16
}

fn mono_samples(canonical: &Canonical) -> Vec<u16> {
    if canonical.bands == 1 {
        canonical.samples.clone()
    } else {
        canonical.samples.chunks_exact(3).map(luma).collect()
    }
}

fn rgb_samples(canonical: &Canonical) -> Vec<u16> {
    if canonical.bands == 3 {
        canonical.samples.clone()
    } else {
        canonical.samples.iter().flat_map(|&v| [v, v, v]).collect()
    }
}

fn from_canonical(canonical: &Canonical, target: PixelFormat) -> Vec<u8> {
    match target {
        PixelFormat::Mono8 => mono_samples(canonical)
            .into_iter()
            .map(|v| scale_from_16(v, 8) as u8)
            .collect(),
        PixelFormat::Mono16 => mono_samples(canonical)
            .into_iter()
            .flat_map(u16::to_le_bytes)
            .collect(),
        PixelFormat::Mono32f => mono_samples(canonical)
            .into_iter()
            .flat_map(|v| (v as f32 / u16::MAX as f32).to_le_bytes())
            .collect(),
        PixelFormat::RGB8 => rgb_samples(canonical)
            .into_iter()
            .map(|v| scale_from_16(v, 8) as u8)
            .collect(),
        PixelFormat::BGR8 => rgb_samples(canonical)
            .chunks_exact(3)
            .flat_map(|p| [p[2], p[1], p[0]])
            .map(|v| scale_from_16(v, 8) as u8)
            .collect(),
        // Only reachable for RGB16; other targets are rejected before conversion.
        _ => rgb_samples(canonical)
            .into_iter()
            .flat_map(u16::to_le_bytes)
            .collect(),
    }
}
