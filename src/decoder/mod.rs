//! Decoder capability consumed by the loader.
//!
//! A decoder is a stateful object bound to one file at a time. It is driven
//! from blocking worker threads, always under the handle's exclusive lock.

mod dicom_file;

pub(crate) use dicom_file::DICM_MAGIC;
pub use dicom_file::{DicomFileDecoder, DicomFileDecoderFactory};

use std::path::Path;

use dicom::core::Tag;

/// Pixel buffer reduced so that neither side exceeds a requested bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downsampled<T> {
    pub pixels: Vec<T>,
    pub width: u32,
    pub height: u32,
}

pub trait Decoder: Send + 'static {
    /// Points the decoder at `path` and decodes it synchronously.
    fn set_source_path(&mut self, path: &Path);

    fn read_succeeded(&self) -> bool;

    /// Whether the file carried the DICM signature after its preamble.
    fn is_dicom(&self) -> bool;

    fn width(&self) -> i32;

    fn height(&self) -> i32;

    /// Tag value as text, empty when the tag is absent.
    fn tag_value(&self, tag: Tag) -> String;

    fn pixels16(&self) -> Option<Vec<u16>>;

    fn pixels8(&self) -> Option<Vec<u8>>;

    /// Interleaved RGB samples, three bytes per pixel.
    fn pixels24(&self) -> Option<Vec<u8>>;

    fn downsampled_pixels16(&self, max_dimension: u32) -> Option<Downsampled<u16>>;

    fn downsampled_pixels8(&self, max_dimension: u32) -> Option<Downsampled<u8>>;
}

/// Builds a fresh, unloaded decoder for every file operation.
pub trait DecoderFactory: Send + Sync + 'static {
    type Decoder: Decoder;

    fn create(&self) -> Self::Decoder;
}

/// Nearest-neighbour reduction of a single-sample frame.
///
/// The larger side of the result is at most `max_dimension`; frames that
/// already fit are returned unchanged. Returns `None` for empty geometry or a
/// buffer shorter than `width * height`.
pub fn downsample_nearest<T: Copy>(
    samples: &[T],
    width: u32,
    height: u32,
    max_dimension: u32,
) -> Option<Downsampled<T>> {
    if width == 0 || height == 0 || max_dimension == 0 {
        return None;
    }
    let pixel_count = width as usize * height as usize;
    if samples.len() < pixel_count {
        return None;
    }

    let longest = width.max(height);
    if longest <= max_dimension {
        return Some(Downsampled {
            pixels: samples[..pixel_count].to_vec(),
            width,
            height,
        });
    }

    let scaled = |side: u32| ((side as u64 * max_dimension as u64) / longest as u64).max(1) as u32;
    let out_width = scaled(width);
    let out_height = scaled(height);

    let mut pixels = Vec::with_capacity(out_width as usize * out_height as usize);
    for y in 0..out_height {
        let src_y = (y as u64 * height as u64 / out_height as u64) as usize;
        let row = &samples[src_y * width as usize..(src_y + 1) * width as usize];
        for x in 0..out_width {
            let src_x = (x as u64 * width as u64 / out_width as u64) as usize;
            pixels.push(row[src_x]);
        }
    }

    Some(Downsampled {
        pixels,
        width: out_width,
        height: out_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_within_bound_is_unchanged() {
        let samples: Vec<u8> = (0..12).collect();
        let out = downsample_nearest(&samples, 4, 3, 8).unwrap();
        assert_eq!((out.width, out.height), (4, 3));
        assert_eq!(out.pixels, samples);
    }

    #[test]
    fn larger_side_is_bounded_and_aspect_kept() {
        let samples: Vec<u16> = (0..(8 * 4)).collect();
        let out = downsample_nearest(&samples, 8, 4, 4).unwrap();
        assert_eq!((out.width, out.height), (4, 2));
        // every other column of rows 0 and 2
        assert_eq!(out.pixels, vec![0, 2, 4, 6, 16, 18, 20, 22]);
    }

    #[test]
    fn thin_frames_keep_at_least_one_pixel() {
        let samples = vec![1_u8; 100];
        let out = downsample_nearest(&samples, 100, 1, 10).unwrap();
        assert_eq!((out.width, out.height), (10, 1));
    }

    #[test]
    fn rejects_empty_or_short_buffers() {
        assert!(downsample_nearest::<u8>(&[], 0, 4, 4).is_none());
        assert!(downsample_nearest(&[0_u8; 3], 2, 2, 4).is_none());
        assert!(downsample_nearest(&[0_u8; 4], 2, 2, 0).is_none());
    }
}
