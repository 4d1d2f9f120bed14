use super::{downsample_nearest, Decoder, DecoderFactory, Downsampled};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject};
use dicom::pixeldata::{
    DecodedPixelData, PhotometricInterpretation, PixelDecoder, PlanarConfiguration,
};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub(crate) const PREAMBLE_LEN: usize = 128;
pub(crate) const DICM_MAGIC: [u8; 4] = *b"DICM";

/// Decoder backed by dicom-rs, reading the first frame of a Part 10 file.
#[derive(Default)]
pub struct DicomFileDecoder {
    object: Option<DefaultDicomObject>,
    signature_found: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DicomFileDecoderFactory;

impl DecoderFactory for DicomFileDecoderFactory {
    type Decoder = DicomFileDecoder;

    fn create(&self) -> DicomFileDecoder {
        DicomFileDecoder::default()
    }
}

impl Decoder for DicomFileDecoder {
    fn set_source_path(&mut self, path: &Path) {
        log::info!("Loading DICOM file: {}", path.display());
        self.signature_found = has_dicm_signature(path);
        self.object = match open_file(path) {
            Ok(object) => Some(object),
            Err(err) => {
                log::error!("{}: failed to open DICOM file ({err})", path.display());
                None
            }
        };
    }

    fn read_succeeded(&self) -> bool {
        self.object.is_some()
    }

    fn is_dicom(&self) -> bool {
        self.signature_found
    }

    fn width(&self) -> i32 {
        self.int_attribute(tags::COLUMNS)
    }

    fn height(&self) -> i32 {
        self.int_attribute(tags::ROWS)
    }

    fn tag_value(&self, tag: Tag) -> String {
        self.object
            .as_ref()
            .and_then(|object| attribute_text(object, tag))
            .unwrap_or_default()
    }

    fn pixels16(&self) -> Option<Vec<u16>> {
        let decoded = self.decode_wide()?;
        decoded
            .to_vec_frame::<u16>(0)
            .map_err(|err| log::warn!("Failed to materialize 16-bit frame: {err}"))
            .ok()
    }

    fn pixels8(&self) -> Option<Vec<u8>> {
        let decoded = self.decode_single_sample()?;
        if decoded.bits_allocated() > 8 {
            return None;
        }
        decoded
            .to_vec_frame::<u8>(0)
            .map_err(|err| log::warn!("Failed to materialize 8-bit frame: {err}"))
            .ok()
    }

    fn pixels24(&self) -> Option<Vec<u8>> {
        let decoded = self.decode()?;
        if !matches!(
            decoded.photometric_interpretation(),
            PhotometricInterpretation::Rgb
        ) || decoded.bits_allocated() > 8
        {
            return None;
        }
        let samples = decoded
            .to_vec_frame::<u8>(0)
            .map_err(|err| log::warn!("Failed to materialize RGB frame: {err}"))
            .ok()?;
        match decoded.planar_configuration() {
            PlanarConfiguration::Standard => Some(samples),
            PlanarConfiguration::PixelFirst => {
                let pixel_count = decoded.columns() as usize * decoded.rows() as usize;
                rgb_planar_to_interleaved(&samples, pixel_count)
            }
        }
    }

    fn downsampled_pixels16(&self, max_dimension: u32) -> Option<Downsampled<u16>> {
        let decoded = self.decode_wide()?;
        let samples = decoded
            .to_vec_frame::<u16>(0)
            .map_err(|err| log::warn!("Failed to materialize 16-bit frame: {err}"))
            .ok()?;
        downsample_nearest(&samples, decoded.columns(), decoded.rows(), max_dimension)
    }

    fn downsampled_pixels8(&self, max_dimension: u32) -> Option<Downsampled<u8>> {
        let decoded = self.decode_single_sample()?;
        if decoded.bits_allocated() > 8 {
            return None;
        }
        let samples = decoded
            .to_vec_frame::<u8>(0)
            .map_err(|err| log::warn!("Failed to materialize 8-bit frame: {err}"))
            .ok()?;
        downsample_nearest(&samples, decoded.columns(), decoded.rows(), max_dimension)
    }
}

impl DicomFileDecoder {
    fn int_attribute(&self, tag: Tag) -> i32 {
        self.object
            .as_ref()
            .and_then(|object| object.element(tag).ok())
            .and_then(|element| element.to_int::<i32>().ok())
            .unwrap_or(0)
    }

    fn decode(&self) -> Option<DecodedPixelData<'_>> {
        let object = self.object.as_ref()?;
        let decoded = object
            .decode_pixel_data()
            .map_err(|err| log::warn!("Failed to decode pixel data: {err}"))
            .ok()?;
        if decoded.number_of_frames() == 0 {
            return None;
        }
        Some(decoded)
    }

    fn decode_single_sample(&self) -> Option<DecodedPixelData<'_>> {
        self.decode().filter(|decoded| decoded.samples_per_pixel() == 1)
    }

    /// Single-sample data stored in more than 8 bits.
    fn decode_wide(&self) -> Option<DecodedPixelData<'_>> {
        self.decode_single_sample()
            .filter(|decoded| decoded.bits_allocated() > 8)
    }
}

fn has_dicm_signature(path: &Path) -> bool {
    let mut header = [0u8; PREAMBLE_LEN + DICM_MAGIC.len()];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut header))
        .map(|_| header[PREAMBLE_LEN..] == DICM_MAGIC)
        .unwrap_or(false)
}

fn attribute_text(object: &DefaultDicomObject, tag: Tag) -> Option<String> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_str().ok())
        .map(|value| value.trim_end_matches([' ', '\0']).trim().to_string())
        .filter(|value| !value.is_empty())
}

fn rgb_planar_to_interleaved(samples: &[u8], pixel_count: usize) -> Option<Vec<u8>> {
    if samples.len() < pixel_count * 3 {
        log::warn!(
            "RGB buffer length {} is too small for {pixel_count} pixels",
            samples.len()
        );
        return None;
    }
    let (r_plane, rest) = samples.split_at(pixel_count);
    let (g_plane, b_plane) = rest.split_at(pixel_count);

    let mut rgb = Vec::with_capacity(pixel_count * 3);
    for idx in 0..pixel_count {
        rgb.extend_from_slice(&[r_plane[idx], g_plane[idx], b_plane[idx]]);
    }
    Some(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR};
    use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_secondary_capture(path: &Path) {
        let mut object = InMemDicomObject::new_empty();
        object.put(DataElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from("Doe^Jane"),
        ));
        object.put(DataElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3"),
        ));
        object.put(DataElement::new(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3.1"),
        ));
        object.put(DataElement::new(
            tags::SAMPLES_PER_PIXEL,
            VR::US,
            PrimitiveValue::from(1_u16),
        ));
        object.put(DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ));
        object.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(4_u16)));
        object.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(4_u16)));
        object.put(DataElement::new(
            tags::BITS_ALLOCATED,
            VR::US,
            PrimitiveValue::from(8_u16),
        ));
        object.put(DataElement::new(
            tags::BITS_STORED,
            VR::US,
            PrimitiveValue::from(8_u16),
        ));
        object.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(7_u16)));
        object.put(DataElement::new(
            tags::PIXEL_REPRESENTATION,
            VR::US,
            PrimitiveValue::from(0_u16),
        ));
        object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::from((0..16).collect::<Vec<u8>>()),
        ));

        let file_object = object
            .with_meta(
                FileMetaTableBuilder::new()
                    .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
                    .media_storage_sop_instance_uid("1.2.3.1.1")
                    .transfer_syntax("1.2.840.10008.1.2.1"),
            )
            .unwrap();
        file_object.write_to_file(path).unwrap();
    }

    #[test]
    fn reads_tags_and_pixels_from_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sc.dcm");
        write_secondary_capture(&path);

        let mut decoder = DicomFileDecoderFactory.create();
        decoder.set_source_path(&path);

        assert!(decoder.read_succeeded());
        assert!(decoder.is_dicom());
        assert_eq!((decoder.width(), decoder.height()), (4, 4));
        assert_eq!(decoder.tag_value(tags::STUDY_INSTANCE_UID), "1.2.3");
        assert_eq!(decoder.tag_value(tags::PATIENT_NAME), "Doe^Jane");
        assert_eq!(decoder.tag_value(tags::INSTITUTION_NAME), "");

        let pixels = decoder.pixels8().unwrap();
        assert_eq!(pixels.len(), 16);
        assert!(decoder.pixels24().is_none());
        assert!(decoder.pixels16().is_none());
        assert!(decoder.downsampled_pixels16(2).is_none());

        let small = decoder.downsampled_pixels8(2).unwrap();
        assert_eq!((small.width, small.height), (2, 2));
        assert_eq!(small.pixels, vec![0, 2, 8, 10]);
    }

    #[test]
    fn plain_bytes_are_not_recognized() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x42; 300]).unwrap();

        let mut decoder = DicomFileDecoder::default();
        decoder.set_source_path(file.path());

        assert!(!decoder.read_succeeded());
        assert!(!decoder.is_dicom());
        assert_eq!(decoder.tag_value(tags::PATIENT_ID), "");
        assert!(decoder.pixels16().is_none());
        assert_eq!(decoder.width(), 0);
    }

    #[test]
    fn signature_without_dataset_is_recognized_but_unreadable() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; PREAMBLE_LEN]).unwrap();
        file.write_all(&DICM_MAGIC).unwrap();
        file.write_all(&[0xFF; 16]).unwrap();

        let mut decoder = DicomFileDecoder::default();
        decoder.set_source_path(file.path());

        assert!(decoder.is_dicom());
        assert!(!decoder.read_succeeded());
    }

    #[test]
    fn planar_rgb_is_interleaved() {
        let planar = [1, 2, 10, 20, 100, 200];
        assert_eq!(
            rgb_planar_to_interleaved(&planar, 2).unwrap(),
            vec![1, 10, 100, 2, 20, 200]
        );
        assert!(rgb_planar_to_interleaved(&planar, 3).is_none());
    }
}
