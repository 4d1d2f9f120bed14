pub const ISSUE_NOT_FOUND: &str = "File does not exist";
pub const ISSUE_ATTRIBUTES: &str = "Could not read file attributes";
pub const ISSUE_TOO_SMALL: &str = "File is too small to be valid DICOM";
pub const ISSUE_SIGNATURE: &str = "Missing header signature (expected DICM at offset 128)";
pub const ISSUE_STUDY_UID: &str = "Missing Study Instance UID";
pub const ISSUE_SERIES_UID: &str = "Missing Series Instance UID";

/// Outcome of validating one file; every problem found is listed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub file_size: u64,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<String>, file_size: u64) -> Self {
        Self {
            is_valid: issues.is_empty(),
            issues,
            file_size,
        }
    }
}
