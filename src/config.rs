//! Service configuration.
//!
//! Defaults can be overridden from the environment:
//! - `DICOMSCAN_MAX_CONCURRENCY`: files processed at once by a batch
//! - `DICOMSCAN_THUMBNAIL_SIZE`: side of the square thumbnail bounding box

use std::num::NonZeroUsize;

pub const ENV_MAX_CONCURRENCY: &str = "DICOMSCAN_MAX_CONCURRENCY";
pub const ENV_THUMBNAIL_SIZE: &str = "DICOMSCAN_THUMBNAIL_SIZE";

const DEFAULT_THUMBNAIL_SIDE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound on files extracted concurrently by a batch.
    pub max_concurrent_files: usize,
    pub thumbnail_size: (u32, u32),
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            max_concurrent_files: cores * 2,
            thumbnail_size: (DEFAULT_THUMBNAIL_SIDE, DEFAULT_THUMBNAIL_SIDE),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    pub fn with_max_concurrent_files(mut self, limit: usize) -> Self {
        self.max_concurrent_files = limit.max(1);
        self
    }

    pub fn with_thumbnail_size(mut self, width: u32, height: u32) -> Self {
        self.thumbnail_size = (width, height);
        self
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_MAX_CONCURRENCY) {
            match raw.trim().parse::<usize>() {
                Ok(limit) if limit > 0 => self.max_concurrent_files = limit,
                _ => log::warn!("Ignoring {ENV_MAX_CONCURRENCY}={raw:?}: expected a positive integer"),
            }
        }
        if let Some(raw) = lookup(ENV_THUMBNAIL_SIZE) {
            match raw.trim().parse::<u32>() {
                Ok(side) if side > 0 => self.thumbnail_size = (side, side),
                _ => log::warn!("Ignoring {ENV_THUMBNAIL_SIZE}={raw:?}: expected a positive integer"),
            }
        }
        self
    }
}
