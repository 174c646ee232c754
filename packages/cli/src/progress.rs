//! `indicatif`-backed progress bar for archive downloads.
//!
//! Wraps [`indicatif::ProgressBar`] behind the fetcher's
//! [`ProgressCallback`] trait so that progress rendering stays out of
//! the download path itself.

use addresskit_fetch::progress::{DownloadProgress, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// A download progress bar that starts as a spinner and becomes a
/// byte bar once the total size is known.
pub struct DownloadBar {
    bar: ProgressBar,
    /// Style to switch to once the total length is known.
    bar_style: ProgressStyle,
}

impl DownloadBar {
    /// Creates the bar in its spinner state.
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("downloading");

        let bar_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.cyan/dim} {bytes}/{total_bytes} {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, bar_style }
    }
}

impl Default for DownloadBar {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for DownloadBar {
    fn on_progress(&self, progress: &DownloadProgress) {
        if let Some(total) = progress.total_bytes {
            if self.bar.length() != Some(total) {
                self.bar.set_length(total);
                self.bar.set_style(self.bar_style.clone());
            }
        }
        self.bar.set_position(progress.bytes_downloaded);

        let mut message = format!("{:.1} MB/s", progress.bytes_per_second / 1_048_576.0);
        if progress.is_resuming {
            message.push_str(&format!(
                " (resumed at {} MB)",
                progress.bytes_resumed_from / 1_048_576
            ));
        }
        if progress.attempt > 0 {
            message.push_str(&format!(" retry {}", progress.attempt));
        }
        self.bar.set_message(message);
    }
}
