use std::path::PathBuf;

pub const UNKNOWN_PATIENT: &str = "Unknown Patient";
pub const UNKNOWN_ID: &str = "Unknown ID";
pub const UNKNOWN: &str = "Unknown";
pub const UNKNOWN_DATE: &str = "Unknown Date";
pub const UNKNOWN_LOCATION: &str = "Unknown Location";
pub const OTHER_MODALITY: &str = "OT";

/// Descriptive attributes of one DICOM instance.
///
/// Built once per successful extraction and never mutated afterwards. Records
/// handed out by the service always carry non-empty study and series UIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomMetadata {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub patient_name: String,
    pub patient_id: String,
    /// Kept as read, possibly empty.
    pub patient_sex: String,
    pub patient_age: String,
    pub study_date: String,
    pub study_description: String,
    pub modality: String,
    pub instance_number: i32,
    pub body_part_examined: String,
    pub institution_name: String,
    pub file_path: PathBuf,
}

/// Raw tag text as read from a decoder, before fallbacks are applied.
#[derive(Debug, Clone, Default)]
pub struct RawAttributes {
    pub patient_name: String,
    pub patient_id: String,
    pub patient_sex: String,
    pub patient_age: String,
    pub study_instance_uid: String,
    pub study_date: String,
    pub study_description: String,
    pub series_instance_uid: String,
    pub modality: String,
    pub instance_number: String,
    pub body_part_examined: String,
    pub institution_name: String,
}

impl DicomMetadata {
    pub fn from_raw(raw: RawAttributes, file_path: PathBuf) -> Self {
        Self {
            study_instance_uid: raw.study_instance_uid.trim().to_string(),
            series_instance_uid: raw.series_instance_uid.trim().to_string(),
            patient_name: or_fallback(raw.patient_name, UNKNOWN_PATIENT),
            patient_id: or_fallback(raw.patient_id, UNKNOWN_ID),
            patient_sex: raw.patient_sex,
            patient_age: or_fallback(raw.patient_age, UNKNOWN),
            study_date: or_fallback(raw.study_date, UNKNOWN_DATE),
            study_description: raw.study_description,
            modality: or_fallback(raw.modality, OTHER_MODALITY),
            instance_number: raw.instance_number.trim().parse().unwrap_or(0),
            body_part_examined: raw.body_part_examined,
            institution_name: or_fallback(raw.institution_name, UNKNOWN_LOCATION),
            file_path,
        }
    }
}

fn or_fallback(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Identity and modality projection of a [`DicomMetadata`] record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientModel {
    pub name: String,
    pub patient_id: String,
    pub sex: String,
    pub age: String,
    pub modality: String,
    pub study_date: String,
}

impl From<&DicomMetadata> for PatientModel {
    fn from(metadata: &DicomMetadata) -> Self {
        Self {
            name: metadata.patient_name.clone(),
            patient_id: metadata.patient_id.clone(),
            sex: metadata.patient_sex.clone(),
            age: metadata.patient_age.clone(),
            modality: metadata.modality.clone(),
            study_date: metadata.study_date.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawAttributes {
        RawAttributes {
            study_instance_uid: "1.2.3".into(),
            series_instance_uid: "1.2.3.1".into(),
            ..RawAttributes::default()
        }
    }

    #[test]
    fn empty_attributes_take_fallbacks() {
        let record = DicomMetadata::from_raw(raw(), PathBuf::from("a.dcm"));
        assert_eq!(record.patient_name, UNKNOWN_PATIENT);
        assert_eq!(record.patient_id, UNKNOWN_ID);
        assert_eq!(record.patient_age, UNKNOWN);
        assert_eq!(record.study_date, UNKNOWN_DATE);
        assert_eq!(record.modality, "OT");
        assert_eq!(record.institution_name, UNKNOWN_LOCATION);
        assert_eq!(record.patient_sex, "");
        assert_eq!(record.study_description, "");
        assert_eq!(record.body_part_examined, "");
        assert_eq!(record.instance_number, 0);
        assert_eq!(record.study_instance_uid, "1.2.3");
    }

    #[test]
    fn present_attributes_are_kept() {
        let record = DicomMetadata::from_raw(
            RawAttributes {
                patient_name: "Doe^Jane".into(),
                patient_sex: "F".into(),
                modality: "MR".into(),
                instance_number: " 17 ".into(),
                ..raw()
            },
            PathBuf::from("a.dcm"),
        );
        assert_eq!(record.patient_name, "Doe^Jane");
        assert_eq!(record.patient_sex, "F");
        assert_eq!(record.modality, "MR");
        assert_eq!(record.instance_number, 17);
    }

    #[test]
    fn unparsable_instance_number_defaults_to_zero() {
        let record = DicomMetadata::from_raw(
            RawAttributes {
                instance_number: "twelve".into(),
                ..raw()
            },
            PathBuf::from("a.dcm"),
        );
        assert_eq!(record.instance_number, 0);
    }

    #[test]
    fn blank_uids_are_trimmed_to_empty() {
        let record = DicomMetadata::from_raw(
            RawAttributes {
                series_instance_uid: "  ".into(),
                ..raw()
            },
            PathBuf::from("a.dcm"),
        );
        assert!(record.series_instance_uid.is_empty());
    }

    #[test]
    fn patient_projection_copies_identity() {
        let record = DicomMetadata::from_raw(raw(), PathBuf::from("a.dcm"));
        let patient = PatientModel::from(&record);
        assert_eq!(patient.name, UNKNOWN_PATIENT);
        assert_eq!(patient.modality, "OT");
    }
}
