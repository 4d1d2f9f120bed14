pub mod metadata;
pub mod study;
pub mod validation;

pub use metadata::{DicomMetadata, PatientModel, RawAttributes};
pub use study::{group_by_study, series_count, StudyGroups};
pub use validation::ValidationResult;
