//! Progress reporting trait for long-running downloads.
//!
//! Decouples progress reporting from any specific rendering backend
//! (e.g. `indicatif` progress bars, log-only reporting, or silence).
//! Implementations are provided upstream in crates that choose a
//! rendering strategy.

use std::sync::Arc;

/// A single throttled progress update from the fetcher.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Bytes written to disk so far, including any resumed prefix.
    pub bytes_downloaded: u64,
    /// Total expected bytes, when known.
    pub total_bytes: Option<u64>,
    /// Instantaneous transfer rate over the last reporting interval.
    pub bytes_per_second: f64,
    /// Estimated seconds remaining, when the total is known.
    pub eta_seconds: Option<f64>,
    /// Completion percentage, when the total is known.
    pub percent: Option<f64>,
    /// `true` when this attempt resumed an existing partial file.
    pub is_resuming: bool,
    /// The byte offset the current attempt resumed from.
    pub bytes_resumed_from: u64,
    /// Retry attempt number (0 for the first attempt).
    pub attempt: u32,
}

/// Trait for receiving download progress updates.
///
/// Implementations must be `Send + Sync` to support use across spawned
/// tokio tasks and `Arc`-based sharing.
pub trait ProgressCallback: Send + Sync {
    /// Called with a throttled progress update.
    fn on_progress(&self, progress: &DownloadProgress);
}

/// A no-op implementation of [`ProgressCallback`] that silently ignores
/// all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn on_progress(&self, _progress: &DownloadProgress) {}
}

/// Returns a shared [`NullProgress`] instance for convenient use.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
