//! Error types and the severity/category classifier.
//!
//! Classification only routes presentation and logging; it never decides
//! whether an operation is retried or aborted.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Every failure the pipeline (and its collaborators) can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // File operations
    FileNotFound,
    FileReadError,
    CorruptedFile,
    // Format parsing
    InvalidFormat,
    MissingRequiredTag,
    UnsupportedTransferSyntax,
    InvalidPixelData,
    // Medical data semantics
    InvalidWindowLevel,
    InvalidPatientData,
    MissingStudyInformation,
    InvalidModality,
    // Reserved for network-facing collaborators
    NetworkUnavailable,
    ServerError,
    AuthenticationFailed,
    // System
    MemoryAllocationFailed,
    ProcessingFailed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    File,
    Format,
    MedicalData,
    Network,
    System,
}

impl ErrorKind {
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::MissingRequiredTag
            | ErrorKind::InvalidWindowLevel
            | ErrorKind::InvalidPatientData
            | ErrorKind::InvalidModality
            | ErrorKind::NetworkUnavailable => Severity::Warning,
            ErrorKind::CorruptedFile
            | ErrorKind::AuthenticationFailed
            | ErrorKind::MemoryAllocationFailed => Severity::Critical,
            ErrorKind::FileNotFound
            | ErrorKind::FileReadError
            | ErrorKind::InvalidFormat
            | ErrorKind::UnsupportedTransferSyntax
            | ErrorKind::InvalidPixelData
            | ErrorKind::MissingStudyInformation
            | ErrorKind::ServerError
            | ErrorKind::ProcessingFailed
            | ErrorKind::Unknown => Severity::Error,
        }
    }

    pub fn category(self) -> Category {
        match self {
            ErrorKind::FileNotFound | ErrorKind::FileReadError | ErrorKind::CorruptedFile => {
                Category::File
            }
            ErrorKind::InvalidFormat
            | ErrorKind::MissingRequiredTag
            | ErrorKind::UnsupportedTransferSyntax
            | ErrorKind::InvalidPixelData => Category::Format,
            ErrorKind::InvalidWindowLevel
            | ErrorKind::InvalidPatientData
            | ErrorKind::MissingStudyInformation
            | ErrorKind::InvalidModality => Category::MedicalData,
            ErrorKind::NetworkUnavailable
            | ErrorKind::ServerError
            | ErrorKind::AuthenticationFailed => Category::Network,
            ErrorKind::MemoryAllocationFailed | ErrorKind::ProcessingFailed | ErrorKind::Unknown => {
                Category::System
            }
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "File not found",
            ErrorKind::FileReadError => "File could not be read",
            ErrorKind::CorruptedFile => "File is corrupted",
            ErrorKind::InvalidFormat => "Not a valid DICOM file",
            ErrorKind::MissingRequiredTag => "Required DICOM attribute is missing",
            ErrorKind::UnsupportedTransferSyntax => "Unsupported transfer syntax",
            ErrorKind::InvalidPixelData => "Pixel data is invalid",
            ErrorKind::InvalidWindowLevel => "Window/level values are invalid",
            ErrorKind::InvalidPatientData => "Patient data is invalid",
            ErrorKind::MissingStudyInformation => "Study information is missing",
            ErrorKind::InvalidModality => "Modality is invalid",
            ErrorKind::NetworkUnavailable => "Network unavailable",
            ErrorKind::ServerError => "Server error",
            ErrorKind::AuthenticationFailed => "Authentication failed",
            ErrorKind::MemoryAllocationFailed => "Memory allocation failed",
            ErrorKind::ProcessingFailed => "Processing failed",
            ErrorKind::Unknown => "Unknown error",
        }
    }

    pub fn recovery_suggestion(self) -> &'static str {
        match self.category() {
            Category::File => "Check that the file exists and is readable.",
            Category::Format => "Verify the file is a DICOM Part 10 file with a DICM preamble.",
            Category::MedicalData => "Check the study, series and patient attributes of the file.",
            Category::Network => "Check connectivity and credentials, then try again.",
            Category::System => "Try again; if the problem persists, reduce the batch size.",
        }
    }

    /// Log level used when a failure of this kind is reported.
    pub fn log_level(self) -> log::Level {
        match self.severity() {
            Severity::Warning => log::Level::Warn,
            Severity::Error | Severity::Critical => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::File => "file",
            Category::Format => "format",
            Category::MedicalData => "medical-data",
            Category::Network => "network",
            Category::System => "system",
        })
    }
}

/// Errors that can be mapped onto the classifier.
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    fn severity(&self) -> Severity {
        self.kind().severity()
    }

    fn category(&self) -> Category {
        self.kind().category()
    }
}

/// Why a decoder reported that a file could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatDiagnostic {
    MissingSignature,
    InvalidDimensions { width: i32, height: i32 },
    Unparseable,
}

impl fmt::Display for FormatDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatDiagnostic::MissingSignature => {
                write!(f, "missing DICM signature at offset 128")
            }
            FormatDiagnostic::InvalidDimensions { width, height } => {
                write!(f, "invalid dimensions {width}x{height}")
            }
            FormatDiagnostic::Unparseable => write!(f, "file could not be parsed as DICOM"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("{}: file not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("{}: invalid DICOM format ({reason})", path.display())]
    InvalidFormat {
        path: PathBuf,
        reason: FormatDiagnostic,
    },

    #[error("decoder read attempted before a successful load")]
    NotLoaded,

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoder task failed: {0}")]
    TaskFailed(String),
}

impl Classify for LoaderError {
    fn kind(&self) -> ErrorKind {
        match self {
            LoaderError::FileNotFound(_) => ErrorKind::FileNotFound,
            LoaderError::InvalidFormat {
                reason: FormatDiagnostic::InvalidDimensions { .. },
                ..
            } => ErrorKind::InvalidPixelData,
            LoaderError::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            LoaderError::Io(_) => ErrorKind::FileReadError,
            LoaderError::NotLoaded | LoaderError::Cancelled | LoaderError::TaskFailed(_) => {
                ErrorKind::ProcessingFailed
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error("{}: missing Study Instance UID", .0.display())]
    MissingStudyUid(PathBuf),

    #[error("{}: missing Series Instance UID", .0.display())]
    MissingSeriesUid(PathBuf),
}

impl ExtractError {
    /// Whether the extraction was abandoned by cancellation rather than failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractError::Load(LoaderError::Cancelled))
    }
}

impl Classify for ExtractError {
    fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Load(err) => err.kind(),
            ExtractError::MissingStudyUid(_) => ErrorKind::MissingStudyInformation,
            ExtractError::MissingSeriesUid(_) => ErrorKind::MissingRequiredTag,
        }
    }
}

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error("decoder produced no downsampled pixel data")]
    NoPixelData,

    #[error("invalid thumbnail geometry {width}x{height}")]
    InvalidGeometry { width: i64, height: i64 },

    #[error("failed to encode thumbnail: {0}")]
    Encode(#[from] image::ImageError),
}

impl Classify for ThumbnailError {
    fn kind(&self) -> ErrorKind {
        match self {
            ThumbnailError::Load(err) => err.kind(),
            ThumbnailError::NoPixelData | ThumbnailError::InvalidGeometry { .. } => {
                ErrorKind::InvalidPixelData
            }
            ThumbnailError::Encode(_) => ErrorKind::ProcessingFailed,
        }
    }
}
