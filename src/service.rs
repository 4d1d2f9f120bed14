//! Metadata extraction, validation, grouping and thumbnails.

use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dicom::dictionary_std::tags;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::decoder::{DecoderFactory, DICM_MAGIC};
use crate::error::{Classify, ExtractError, ThumbnailError};
use crate::loader::AsyncLoader;
use crate::model::validation::{
    ISSUE_ATTRIBUTES, ISSUE_NOT_FOUND, ISSUE_SERIES_UID, ISSUE_SIGNATURE, ISSUE_STUDY_UID,
    ISSUE_TOO_SMALL,
};
use crate::model::{
    group_by_study, series_count, DicomMetadata, PatientModel, RawAttributes, StudyGroups,
    ValidationResult,
};
use crate::thumbnail::{GraySamples, ThumbnailPipeline};

/// Length of the Part 10 preamble plus the DICM signature.
pub const MIN_DICOM_FILE_SIZE: u64 = 132;
const SIGNATURE_OFFSET: u64 = 128;

/// Outcome of a batch extraction.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Successfully extracted records, in completion order.
    pub records: Vec<DicomMetadata>,
    pub requested: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.records.len()
    }

    /// Files that were never attempted or were aborted by cancellation.
    pub fn not_processed(&self) -> usize {
        self.requested
            .saturating_sub(self.succeeded())
            .saturating_sub(self.failed)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} files succeeded",
            self.succeeded(),
            self.requested
        )?;
        if self.cancelled {
            write!(f, " (cancelled, {} not processed)", self.not_processed())?;
        }
        Ok(())
    }
}

pub struct MetadataService<F> {
    loader: AsyncLoader<F>,
    config: Arc<ServiceConfig>,
}

impl<F> Clone for MetadataService<F> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<F: DecoderFactory> MetadataService<F> {
    pub fn new(factory: F, config: ServiceConfig) -> Self {
        Self {
            loader: AsyncLoader::new(factory),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn loader(&self) -> &AsyncLoader<F> {
        &self.loader
    }

    /// Extracts one file's metadata, or `None` (logged) if it cannot be read
    /// or lacks a study or series UID.
    pub async fn extract_one(&self, path: &Path) -> Option<DicomMetadata> {
        self.extract_one_with_cancel(path, &CancellationToken::new())
            .await
    }

    pub async fn extract_one_with_cancel(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Option<DicomMetadata> {
        self.try_extract(path, cancel)
            .await
            .map_err(|err| log_skipped(path, &err))
            .ok()
    }

    pub async fn try_extract(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<DicomMetadata, ExtractError> {
        let handle = self.loader.load_with_cancel(path, cancel).await?;
        let [
            patient_name,
            patient_id,
            patient_sex,
            patient_age,
            study_instance_uid,
            study_date,
            study_description,
            series_instance_uid,
            modality,
            instance_number,
            body_part_examined,
            institution_name,
        ] = self
            .loader
            .read_tags(
                &handle,
                [
                    tags::PATIENT_NAME,
                    tags::PATIENT_ID,
                    tags::PATIENT_SEX,
                    tags::PATIENT_AGE,
                    tags::STUDY_INSTANCE_UID,
                    tags::STUDY_DATE,
                    tags::STUDY_DESCRIPTION,
                    tags::SERIES_INSTANCE_UID,
                    tags::MODALITY,
                    tags::INSTANCE_NUMBER,
                    tags::BODY_PART_EXAMINED,
                    tags::INSTITUTION_NAME,
                ],
            )
            .await?;

        let metadata = DicomMetadata::from_raw(
            RawAttributes {
                patient_name,
                patient_id,
                patient_sex,
                patient_age,
                study_instance_uid,
                study_date,
                study_description,
                series_instance_uid,
                modality,
                instance_number,
                body_part_examined,
                institution_name,
            },
            path.to_path_buf(),
        );

        if metadata.study_instance_uid.is_empty() {
            return Err(ExtractError::MissingStudyUid(path.to_path_buf()));
        }
        if metadata.series_instance_uid.is_empty() {
            return Err(ExtractError::MissingSeriesUid(path.to_path_buf()));
        }
        Ok(metadata)
    }

    /// Extracts every path concurrently and keeps the successes.
    ///
    /// Result order is unspecified. Failures are logged and dropped without
    /// affecting sibling files.
    pub async fn extract_batch(
        &self,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Vec<DicomMetadata> {
        self.extract_batch_with_cancel(paths, &CancellationToken::new())
            .await
            .records
    }

    /// Bounded fan-out over `paths` that can be cancelled as a whole.
    ///
    /// At most `max_concurrent_files` files are in flight. Once `cancel` fires
    /// no further files are admitted and every running unit is aborted; the
    /// batch still joins all of its children before returning. Units cut short
    /// by cancellation count as not processed, never as failed.
    pub async fn extract_batch_with_cancel(
        &self,
        paths: impl IntoIterator<Item = PathBuf>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        let mut report = BatchReport {
            requested: paths.len(),
            ..BatchReport::default()
        };
        if paths.is_empty() {
            return report;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_files.max(1)));
        let mut tasks = JoinSet::new();

        for path in paths {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let service = self.clone();
            let unit_cancel = cancel.child_token();
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = service.try_extract(&path, &unit_cancel).await;
                if let Err(err) = &outcome {
                    log_skipped(&path, err);
                }
                outcome
            });
        }

        if cancel.is_cancelled() {
            tasks.abort_all();
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled(), if !report.cancelled => {
                    report.cancelled = true;
                    tasks.abort_all();
                    continue;
                }
                joined = tasks.join_next() => joined,
            };
            match joined {
                Some(Ok(Ok(metadata))) => report.records.push(metadata),
                Some(Ok(Err(err))) if err.is_cancelled() => {}
                Some(Ok(Err(_))) => report.failed += 1,
                Some(Err(err)) if err.is_cancelled() => {}
                Some(Err(err)) => {
                    log::error!("Extraction unit panicked: {err}");
                    report.failed += 1;
                }
                None => break,
            }
        }
        report.cancelled |= cancel.is_cancelled();

        log::info!(
            "Extracted metadata from {} of {} files",
            report.succeeded(),
            report.requested
        );
        report
    }

    /// Checks a file without failing: existence, attributes, size, signature
    /// and required identifiers.
    ///
    /// Only the first two checks short-circuit; everything after them is
    /// accumulated into the issue list.
    pub async fn validate(&self, path: &Path) -> ValidationResult {
        let attributes = match tokio::fs::try_exists(path).await {
            Ok(false) => {
                return ValidationResult::from_issues(vec![ISSUE_NOT_FOUND.to_string()], 0)
            }
            Ok(true) => tokio::fs::metadata(path).await,
            Err(err) => Err(err),
        };
        let file_size = match attributes {
            Ok(attributes) => attributes.len(),
            Err(err) => {
                log::warn!("{}: cannot read attributes ({err})", path.display());
                return ValidationResult::from_issues(vec![ISSUE_ATTRIBUTES.to_string()], 0);
            }
        };

        let mut issues = Vec::new();
        if file_size < MIN_DICOM_FILE_SIZE {
            issues.push(ISSUE_TOO_SMALL.to_string());
        } else {
            match read_signature(path).await {
                Ok(signature) if signature == DICM_MAGIC => {}
                Ok(_) => issues.push(ISSUE_SIGNATURE.to_string()),
                Err(err) => {
                    log::warn!("{}: cannot read signature ({err})", path.display());
                    issues.push(ISSUE_SIGNATURE.to_string());
                }
            }
        }

        let identifiers = match self.loader.load(path).await {
            Ok(handle) => {
                self.loader
                    .read_tags(&handle, [tags::STUDY_INSTANCE_UID, tags::SERIES_INSTANCE_UID])
                    .await
            }
            Err(err) => Err(err),
        };
        let [study_uid, series_uid] = identifiers.unwrap_or_else(|err| {
            log::debug!("{}: identifiers unavailable ({err})", path.display());
            issues.push(err.to_string());
            Default::default()
        });
        if study_uid.trim().is_empty() {
            issues.push(ISSUE_STUDY_UID.to_string());
        }
        if series_uid.trim().is_empty() {
            issues.push(ISSUE_SERIES_UID.to_string());
        }

        ValidationResult::from_issues(issues, file_size)
    }

    /// Partitions `records` by Study Instance UID, logging series counts.
    pub fn group_by_study(&self, records: &[DicomMetadata]) -> StudyGroups {
        let groups = group_by_study(records);
        for (study, members) in &groups {
            log::debug!(
                "Study {study}: {} instance(s) across {} series",
                members.len(),
                series_count(members)
            );
        }
        groups
    }

    pub fn build_patient_summary(&self, metadata: &DicomMetadata) -> PatientModel {
        PatientModel::from(metadata)
    }

    /// PNG thumbnail bounded by the larger side of `max_size`, or `None`
    /// (logged) when any step fails.
    pub async fn extract_thumbnail(&self, path: &Path, max_size: (u32, u32)) -> Option<Vec<u8>> {
        match self.try_extract_thumbnail(path, max_size).await {
            Ok(png) => Some(png),
            Err(err) => {
                log::log!(
                    err.kind().log_level(),
                    "No thumbnail for {}: {err}",
                    path.display()
                );
                None
            }
        }
    }

    /// Thumbnail bounded by the configured `thumbnail_size`.
    pub async fn extract_default_thumbnail(&self, path: &Path) -> Option<Vec<u8>> {
        self.extract_thumbnail(path, self.config.thumbnail_size)
            .await
    }

    pub async fn try_extract_thumbnail(
        &self,
        path: &Path,
        max_size: (u32, u32),
    ) -> Result<Vec<u8>, ThumbnailError> {
        let max_dimension = max_size.0.max(max_size.1);
        if max_dimension == 0 {
            return Err(ThumbnailError::InvalidGeometry {
                width: max_size.0.into(),
                height: max_size.1.into(),
            });
        }

        let handle = self.loader.load(path).await?;
        let samples = match self.loader.read_downsampled16(&handle, max_dimension).await? {
            Some(frame) => GraySamples::Wide(frame),
            None => match self.loader.read_downsampled8(&handle, max_dimension).await? {
                Some(frame) => GraySamples::Narrow(frame),
                None => return Err(ThumbnailError::NoPixelData),
            },
        };

        let (width, height) = self.loader.read_geometry(&handle).await?;
        if width <= 0 || height <= 0 {
            return Err(ThumbnailError::InvalidGeometry {
                width: width.into(),
                height: height.into(),
            });
        }

        let photometric = self
            .loader
            .read_tag(&handle, tags::PHOTOMETRIC_INTERPRETATION)
            .await?;
        ThumbnailPipeline::encode_png(&samples, photometric == "MONOCHROME1")
    }
}

fn log_skipped(path: &Path, err: &ExtractError) {
    if err.is_cancelled() {
        log::debug!("Extraction of {} cancelled", path.display());
        return;
    }
    log::warn!(
        "Skipping {} [{}/{}]: {err}",
        path.display(),
        err.severity(),
        err.category()
    );
}

async fn read_signature(path: &Path) -> std::io::Result<[u8; 4]> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(SIGNATURE_OFFSET)).await?;
    let mut signature = [0u8; 4];
    file.read_exact(&mut signature).await?;
    Ok(signature)
}
