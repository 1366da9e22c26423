use std::io::Write;

use ::tiff::encoder::{colortype, compression::DeflateLevel, Compression, TiffEncoder};
use ::tiff::tags::Predictor;
use tracing::debug;

use crate::acquisition::common::error::{CameraError, Result};
use crate::acquisition::config::AcquisitionConfig;
use crate::acquisition::convert::unpack_mono12p;
use crate::acquisition::device::CapturedFrame;
use crate::acquisition::pixel_format::PixelFormat;
use crate::acquisition::tiff::types::TiffCompression;
use crate::acquisition::tiff::writer::TiffWriter;

/// Writes frames with the `tiff` crate, choosing the colour type from the pixel format.
///
/// Bayer frames are stored as single-channel grey images; BGR orderings are
/// swapped to RGB since TIFF has no BGR photometric interpretation.
pub struct StandardTiffWriter;

fn encode_error(e: impl std::fmt::Display) -> CameraError {
    CameraError::Encode { path: None, message: e.to_string() }
}

fn u16_samples(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect()
}

impl TiffWriter for StandardTiffWriter {
    fn write_tiff(&self, frame: &CapturedFrame, output: &mut dyn Write, config: &AcquisitionConfig) -> Result<()> {
        debug!(
            "Encoding TIFF image {}: {}x{} {}",
            frame.image_number, frame.width, frame.height, frame.pixel_format
        );

        let expected = frame.expected_len();
        if frame.data.len() < expected {
            return Err(CameraError::FrameSizeMismatch {
                frame: frame.image_number as usize,
                expected,
                actual: frame.data.len(),
            });
        }
        let data = &frame.data[..expected];
        let pixels = frame.width * frame.height;
        let width = u32::try_from(frame.width).map_err(encode_error)?;
        let height = u32::try_from(frame.height).map_err(encode_error)?;

        let mut buffer = Vec::new();

        let compression = match config.compression {
            TiffCompression::None => Compression::Uncompressed,
            TiffCompression::Lzw => Compression::Lzw,
            TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        };

        let written = {
            let mut encoder = TiffEncoder::new(std::io::Cursor::new(&mut buffer))
                .map_err(encode_error)?
                .with_compression(compression);

            if let Some(predictor_val) = config.predictor {
                let predictor = match predictor_val {
                    2 => Predictor::Horizontal,
                    _ => Predictor::None,
                };
                encoder = encoder.with_predictor(predictor);
            }

            let format = frame.pixel_format;
            match format {
                PixelFormat::Mono12p => {
                    let samples = unpack_mono12p(data, pixels);
                    encoder.write_image::<colortype::Gray16>(width, height, &samples)
                }
                PixelFormat::Mono32f => {
                    let samples: Vec<f32> = data
                        .chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect();
                    encoder.write_image::<colortype::Gray32Float>(width, height, &samples)
                }
                PixelFormat::RGB8 => encoder.write_image::<colortype::RGB8>(width, height, data),
                PixelFormat::BGR8 => {
                    let rgb: Vec<u8> = data.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]).collect();
                    encoder.write_image::<colortype::RGB8>(width, height, &rgb)
                }
                PixelFormat::BGRA8 => {
                    let rgba: Vec<u8> = data
                        .chunks_exact(4)
                        .flat_map(|p| [p[2], p[1], p[0], p[3]])
                        .collect();
                    encoder.write_image::<colortype::RGBA8>(width, height, &rgba)
                }
                PixelFormat::RGB16 => {
                    encoder.write_image::<colortype::RGB16>(width, height, &u16_samples(data))
                }
                _ if format.bytes_per_sample() == 1 => {
                    encoder.write_image::<colortype::Gray8>(width, height, data)
                }
                _ => encoder.write_image::<colortype::Gray16>(width, height, &u16_samples(data)),
            }
        };
        written.map_err(encode_error)?;

        output.write_all(&buffer)?;

        debug!("TIFF encoding complete ({} bytes)", buffer.len());
        Ok(())
    }
}
