//! Suspendable load and read operations over a blocking decoder.
//!
//! Every decoder call runs on tokio's blocking pool while holding the handle's
//! [`ExclusiveLock`]. `load` builds a fresh handle per call, so concurrent loads
//! never share decoder state; reads issued concurrently against one loaded
//! handle contend on its lock.
//!
//! # Cancellation
//!
//! A cancelled token observed before dispatch prevents the decoder from being
//! created at all. After dispatch, cancelling resolves the awaiting caller with
//! [`LoaderError::Cancelled`] straight away, but the blocking decode keeps
//! running to completion and its result is discarded. A cancelled load never
//! hands out a handle.

use std::path::Path;
use std::sync::Arc;

use dicom::core::Tag;
use tokio_util::sync::CancellationToken;

use crate::decoder::{Decoder, DecoderFactory, Downsampled};
use crate::error::{FormatDiagnostic, LoaderError};
use crate::lock::ExclusiveLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unloaded,
    Loaded,
}

struct HandleSlot<D> {
    decoder: D,
    state: HandleState,
}

/// Shared reference to one file's decoder.
///
/// Clones refer to the same decoder; all access is serialized by the lock.
pub struct DecoderHandle<D> {
    slot: Arc<ExclusiveLock<HandleSlot<D>>>,
}

impl<D> Clone for DecoderHandle<D> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<D: Decoder> DecoderHandle<D> {
    /// Wraps a decoder that has not been pointed at any file yet.
    pub fn unloaded(decoder: D) -> Self {
        Self {
            slot: Arc::new(ExclusiveLock::new(HandleSlot {
                decoder,
                state: HandleState::Unloaded,
            })),
        }
    }

    pub async fn state(&self) -> Result<HandleState, LoaderError> {
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || slot.scoped_execute(|slot| slot.state))
            .await
            .map_err(|err| LoaderError::TaskFailed(err.to_string()))
    }

    pub fn lock_acquisitions(&self) -> u64 {
        self.slot.acquisitions()
    }

    pub fn lock_releases(&self) -> u64 {
        self.slot.releases()
    }

    async fn with_loaded<R, F>(&self, op: F) -> Result<R, LoaderError>
    where
        R: Send + 'static,
        F: FnOnce(&D) -> R + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || {
            slot.scoped_execute(|slot| match slot.state {
                HandleState::Loaded => Ok(op(&slot.decoder)),
                HandleState::Unloaded => Err(LoaderError::NotLoaded),
            })
        })
        .await
        .map_err(|err| LoaderError::TaskFailed(err.to_string()))?
    }
}

pub struct AsyncLoader<F> {
    factory: Arc<F>,
}

impl<F> Clone for AsyncLoader<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<F: DecoderFactory> AsyncLoader<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }

    pub async fn load(&self, path: &Path) -> Result<DecoderHandle<F::Decoder>, LoaderError> {
        self.load_with_cancel(path, &CancellationToken::new()).await
    }

    pub async fn load_with_cancel(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<DecoderHandle<F::Decoder>, LoaderError> {
        if !tokio::fs::try_exists(path).await? {
            return Err(LoaderError::FileNotFound(path.to_path_buf()));
        }
        if cancel.is_cancelled() {
            return Err(LoaderError::Cancelled);
        }

        let handle = DecoderHandle::unloaded(self.factory.create());
        let slot = Arc::clone(&handle.slot);
        let source = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || {
            slot.scoped_execute(|slot| {
                slot.decoder.set_source_path(&source);
                if slot.decoder.read_succeeded() {
                    slot.state = HandleState::Loaded;
                    Ok(())
                } else {
                    Err(diagnose(&slot.decoder))
                }
            })
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Load of {} cancelled while in flight", path.display());
                return Err(LoaderError::Cancelled);
            }
            joined = task => joined.map_err(|err| LoaderError::TaskFailed(err.to_string()))?,
        };

        match outcome {
            Ok(()) => Ok(handle),
            Err(reason) => Err(LoaderError::InvalidFormat {
                path: path.to_path_buf(),
                reason,
            }),
        }
    }

    pub async fn read_tag(
        &self,
        handle: &DecoderHandle<F::Decoder>,
        tag: Tag,
    ) -> Result<String, LoaderError> {
        handle.with_loaded(move |decoder| decoder.tag_value(tag)).await
    }

    /// Reads several tags under a single lock acquisition.
    pub async fn read_tags<const N: usize>(
        &self,
        handle: &DecoderHandle<F::Decoder>,
        tags: [Tag; N],
    ) -> Result<[String; N], LoaderError> {
        handle
            .with_loaded(move |decoder| tags.map(|tag| decoder.tag_value(tag)))
            .await
    }

    /// Width and height as reported by the decoder's geometry attributes.
    pub async fn read_geometry(
        &self,
        handle: &DecoderHandle<F::Decoder>,
    ) -> Result<(i32, i32), LoaderError> {
        handle
            .with_loaded(|decoder| (decoder.width(), decoder.height()))
            .await
    }

    pub async fn read_pixels16(
        &self,
        handle: &DecoderHandle<F::Decoder>,
    ) -> Result<Option<Vec<u16>>, LoaderError> {
        handle.with_loaded(|decoder| decoder.pixels16()).await
    }

    pub async fn read_pixels8(
        &self,
        handle: &DecoderHandle<F::Decoder>,
    ) -> Result<Option<Vec<u8>>, LoaderError> {
        handle.with_loaded(|decoder| decoder.pixels8()).await
    }

    pub async fn read_pixels24(
        &self,
        handle: &DecoderHandle<F::Decoder>,
    ) -> Result<Option<Vec<u8>>, LoaderError> {
        handle.with_loaded(|decoder| decoder.pixels24()).await
    }

    pub async fn read_downsampled16(
        &self,
        handle: &DecoderHandle<F::Decoder>,
        max_dimension: u32,
    ) -> Result<Option<Downsampled<u16>>, LoaderError> {
        handle
            .with_loaded(move |decoder| decoder.downsampled_pixels16(max_dimension))
            .await
    }

    pub async fn read_downsampled8(
        &self,
        handle: &DecoderHandle<F::Decoder>,
        max_dimension: u32,
    ) -> Result<Option<Downsampled<u8>>, LoaderError> {
        handle
            .with_loaded(move |decoder| decoder.downsampled_pixels8(max_dimension))
            .await
    }
}

fn diagnose<D: Decoder>(decoder: &D) -> FormatDiagnostic {
    if !decoder.is_dicom() {
        return FormatDiagnostic::MissingSignature;
    }
    let (width, height) = (decoder.width(), decoder.height());
    if width <= 0 || height <= 0 {
        return FormatDiagnostic::InvalidDimensions { width, height };
    }
    FormatDiagnostic::Unparseable
}
