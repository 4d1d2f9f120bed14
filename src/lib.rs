//! Concurrent DICOM metadata extraction.
//!
//! [`MetadataService`] loads files through an [`AsyncLoader`], which drives a
//! blocking [`Decoder`] on worker threads behind an [`ExclusiveLock`]. Batches
//! fan out with a bounded number of files in flight, tolerate per-file
//! failures, and can be grouped by study afterwards.

pub mod app;
pub mod config;
pub mod decoder;
pub mod error;
pub mod loader;
pub mod lock;
pub mod model;
pub mod service;
pub mod thumbnail;

pub use config::ServiceConfig;
pub use decoder::{
    Decoder, DecoderFactory, DicomFileDecoder, DicomFileDecoderFactory, Downsampled,
};
pub use error::{
    Category, Classify, ErrorKind, ExtractError, LoaderError, Severity, ThumbnailError,
};
pub use loader::{AsyncLoader, DecoderHandle, HandleState};
pub use lock::ExclusiveLock;
pub use model::{DicomMetadata, PatientModel, StudyGroups, ValidationResult};
pub use service::{BatchReport, MetadataService};
