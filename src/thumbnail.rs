use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat};

use crate::decoder::Downsampled;
use crate::error::ThumbnailError;

/// Downsampled single-sample frame awaiting encoding.
pub enum GraySamples {
    Wide(Downsampled<u16>),
    Narrow(Downsampled<u8>),
}

impl GraySamples {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            GraySamples::Wide(frame) => (frame.width, frame.height),
            GraySamples::Narrow(frame) => (frame.width, frame.height),
        }
    }
}

pub struct ThumbnailPipeline;

impl ThumbnailPipeline {
    /// Encodes a greyscale frame as PNG, stretching 16-bit data to the full
    /// 8-bit range. `invert` flips the ramp for MONOCHROME1 images.
    pub fn encode_png(samples: &GraySamples, invert: bool) -> Result<Vec<u8>, ThumbnailError> {
        let (width, height) = samples.dimensions();
        if width == 0 || height == 0 {
            return Err(ThumbnailError::InvalidGeometry {
                width: width.into(),
                height: height.into(),
            });
        }

        let mut gray = match samples {
            GraySamples::Narrow(frame) => frame.pixels.clone(),
            GraySamples::Wide(frame) => {
                let (min, max) = min_max_u16(&frame.pixels).unwrap_or((0, 0));
                frame
                    .pixels
                    .iter()
                    .map(|&value| normalize_u16(value, min, max))
                    .collect()
            }
        };
        if invert {
            for value in &mut gray {
                *value = 255 - *value;
            }
        }

        let image = GrayImage::from_raw(width, height, gray).ok_or(
            ThumbnailError::InvalidGeometry {
                width: width.into(),
                height: height.into(),
            },
        )?;

        let mut encoded = Vec::new();
        DynamicImage::ImageLuma8(image).write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;
        Ok(encoded)
    }
}

fn min_max_u16(values: &[u16]) -> Option<(u16, u16)> {
    values.iter().copied().fold(None, |acc, value| match acc {
        None => Some((value, value)),
        Some((min, max)) => Some((min.min(value), max.max(value))),
    })
}

fn normalize_u16(value: u16, min: u16, max: u16) -> u8 {
    if max <= min {
        return 0;
    }

    let range = (max - min) as f32;
    let normalized = (value.saturating_sub(min)) as f32 / range;
    (normalized * 255.0).clamp(0.0, 255.0).round() as u8
}
