//! Resumable, retrying file downloader.
//!
//! Streams a single artifact from an HTTPS URL to a destination path.
//! Partial downloads are resumed with `Range` requests after inspecting
//! the on-disk size, transient failures retry with jittered exponential
//! backoff, and two corruption checks (session overflow and final size
//! mismatch) guard against truncated or duplicated chunks producing a
//! plausible-looking but broken archive.

use std::error::Error as _;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;

use crate::backoff::Backoff;
use crate::progress::{DownloadProgress, ProgressCallback};

/// Maximum redirect hops followed within a single attempt.
const MAX_REDIRECTS: u32 = 10;

/// Maximum delete-and-restart cycles triggered by HTTP 416.
const MAX_RESTARTS: u32 = 3;

/// Options for a single [`fetch_file`] call.
pub struct FetchOptions {
    /// Expected artifact size in bytes, when the manifest reports one.
    pub expected_size: Option<u64>,
    /// Retry schedule for transient failures.
    pub backoff: Backoff,
    /// Bound from request issue to first byte.
    pub connect_timeout: Duration,
    /// Bound on inactivity between received chunks.
    pub inactivity_timeout: Duration,
    /// Optional progress receiver.
    pub progress: Option<Arc<dyn ProgressCallback>>,
    /// Minimum interval between progress reports.
    pub progress_interval: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            expected_size: None,
            backoff: Backoff::default(),
            connect_timeout: Duration::from_secs(300),
            inactivity_timeout: Duration::from_secs(300),
            progress: None,
            progress_interval: Duration::from_millis(100),
        }
    }
}

/// Terminal discriminant of a failed download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Transport closed before the expected bytes arrived.
    ConnectionReset,
    /// TCP connect refused.
    ConnectionRefused,
    /// OS-level connection timeout.
    TimedOut,
    /// DNS resolution failure.
    DnsFailure,
    /// Network unreachable.
    NetworkUnreachable,
    /// Host unreachable.
    HostUnreachable,
    /// Write side of the socket closed.
    BrokenPipe,
    /// TLS or HTTP protocol error.
    Protocol,
    /// Inactivity timeout fired between chunks.
    SocketTimeout,
    /// No first byte within the connect timeout.
    ConnectTimeout,
    /// Session bytes exceeded the expected size plus tolerance.
    DataOverflow,
    /// Final on-disk size differed from the known total.
    SizeMismatch,
    /// Terminal HTTP status.
    HttpStatus(u16),
    /// Redirect chain exceeded the hop limit.
    TooManyRedirects,
    /// Delete-and-restart cycles exceeded the restart limit.
    TooManyRestarts,
    /// Local filesystem error.
    Io,
}

impl ErrorCode {
    /// Whether the fetcher may retry after this code.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::ConnectionReset
            | Self::ConnectionRefused
            | Self::TimedOut
            | Self::DnsFailure
            | Self::NetworkUnreachable
            | Self::HostUnreachable
            | Self::BrokenPipe
            | Self::Protocol
            | Self::SocketTimeout
            | Self::ConnectTimeout
            | Self::DataOverflow
            | Self::SizeMismatch => true,
            Self::HttpStatus(status) => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            Self::TooManyRedirects | Self::TooManyRestarts | Self::Io => false,
        }
    }
}

/// A failed download, after all local recovery was exhausted.
#[derive(Debug, thiserror::Error)]
#[error(
    "download failed ({code:?}) after {attempts} attempt(s), {bytes_transferred} bytes transferred"
)]
pub struct DownloadError {
    /// Terminal code discriminant.
    pub code: ErrorCode,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Whether the terminal code was in the retryable class.
    pub retryable: bool,
    /// Bytes written during the failing session.
    pub bytes_transferred: u64,
}

/// Outcome of one attempt, consumed by the retry loop.
enum AttemptFailure {
    /// Server ignored the `Range` request; restart fresh, not a retry.
    ServerIgnoredRange,
    /// HTTP 416; the partial exceeded the remote length.
    RangeNotSatisfiable,
    /// A classified error, possibly retryable.
    Failed { code: ErrorCode, bytes: u64 },
}

/// Downloads `url` to `dest`, resuming and retrying as needed.
///
/// Returns the total bytes on disk at completion.
///
/// # Errors
///
/// Returns [`DownloadError`] once the retry budget is exhausted or a
/// non-retryable condition is hit.
pub async fn fetch_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    options: &FetchOptions,
) -> Result<u64, DownloadError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(&e, 0))?;
    }

    let mut attempts: u32 = 1;
    let mut retries: u32 = 0;
    let mut restarts: u32 = 0;

    loop {
        let resume_from = resume_offset(dest, options.expected_size)
            .await
            .map_err(|e| io_error(&e, 0))?;

        match run_attempt(client, url, dest, resume_from, options, retries).await {
            Ok(total) => {
                log::info!("Downloaded {url} -> {} ({total} bytes)", dest.display());
                return Ok(total);
            }
            Err(AttemptFailure::ServerIgnoredRange) => {
                log::warn!("Server ignored range request; restarting from scratch");
                remove_quietly(dest).await;
                attempts += 1;
            }
            Err(AttemptFailure::RangeNotSatisfiable) => {
                restarts += 1;
                if restarts > MAX_RESTARTS {
                    return Err(DownloadError {
                        code: ErrorCode::TooManyRestarts,
                        attempts,
                        retryable: false,
                        bytes_transferred: 0,
                    });
                }
                log::warn!(
                    "HTTP 416: partial exceeds remote length; restarting ({restarts}/{MAX_RESTARTS})"
                );
                remove_quietly(dest).await;
                attempts += 1;
            }
            Err(AttemptFailure::Failed { code, bytes }) => {
                if !code.is_retryable() {
                    return Err(DownloadError {
                        code,
                        attempts,
                        retryable: false,
                        bytes_transferred: bytes,
                    });
                }

                retries += 1;
                let Some(delay) = options.backoff.delay(retries) else {
                    return Err(DownloadError {
                        code,
                        attempts,
                        retryable: true,
                        bytes_transferred: bytes,
                    });
                };

                log::warn!(
                    "Transient download error {code:?} ({bytes} bytes); retry {retries}/{} in {delay:?}",
                    options.backoff.max_retries
                );
                tokio::time::sleep(delay).await;
                attempts += 1;
            }
        }
    }
}

/// Inspects the on-disk partial and decides the resume offset.
///
/// A partial at or beyond the expected size is presumed corrupt or
/// complete and is deleted. With no expected size the existing size is
/// trusted.
async fn resume_offset(dest: &Path, expected: Option<u64>) -> std::io::Result<u64> {
    let size = match tokio::fs::metadata(dest).await {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    if size == 0 {
        return Ok(0);
    }

    if let Some(expected) = expected {
        if size >= expected {
            log::warn!(
                "Partial at {} is {size} bytes, expected {expected}; deleting",
                dest.display()
            );
            tokio::fs::remove_file(dest).await?;
            return Ok(0);
        }
    }

    Ok(size)
}

/// One attempt: send the request (following redirects manually), then
/// stream the body to disk with inactivity and corruption checks.
async fn run_attempt(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    resume_from: u64,
    options: &FetchOptions,
    attempt: u32,
) -> Result<u64, AttemptFailure> {
    let is_resuming = resume_from > 0;
    if is_resuming {
        log::info!("Resuming {url} at byte {resume_from}");
    }

    let response = send_following_redirects(client, url, resume_from, options).await?;
    let status = response.status();

    let appending = match status.as_u16() {
        206 => true,
        200 => {
            if is_resuming {
                return Err(AttemptFailure::ServerIgnoredRange);
            }
            false
        }
        416 => return Err(AttemptFailure::RangeNotSatisfiable),
        code => {
            return Err(AttemptFailure::Failed {
                code: ErrorCode::HttpStatus(code),
                bytes: 0,
            });
        }
    };

    let known_total = options.expected_size.or_else(|| {
        response
            .content_length()
            .map(|len| if appending { len + resume_from } else { len })
    });

    write_body(response, dest, resume_from, known_total, options, attempt).await
}

/// Sends the request, following `3xx` responses with a `Location`
/// header recursively while preserving the `Range` header.
async fn send_following_redirects(
    client: &reqwest::Client,
    url: &str,
    resume_from: u64,
    options: &FetchOptions,
) -> Result<reqwest::Response, AttemptFailure> {
    let mut target = url.to_string();

    for _ in 0..=MAX_REDIRECTS {
        let mut request = client.get(&target);
        if resume_from > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={resume_from}-"));
        }

        let response = tokio::time::timeout(options.connect_timeout, request.send())
            .await
            .map_err(|_| AttemptFailure::Failed {
                code: ErrorCode::ConnectTimeout,
                bytes: 0,
            })?
            .map_err(|e| AttemptFailure::Failed {
                code: classify_reqwest(&e),
                bytes: 0,
            })?;

        if !response.status().is_redirection() {
            return Ok(response);
        }

        let Some(location) = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            let code = response.status().as_u16();
            return Err(AttemptFailure::Failed {
                code: ErrorCode::HttpStatus(code),
                bytes: 0,
            });
        };

        target = response
            .url()
            .join(location)
            .map(String::from)
            .unwrap_or_else(|_| location.to_string());
        log::debug!("Following redirect to {target}");
    }

    Err(AttemptFailure::Failed {
        code: ErrorCode::TooManyRedirects,
        bytes: 0,
    })
}

/// Streams the response body to disk.
#[allow(clippy::too_many_lines)]
async fn write_body(
    response: reqwest::Response,
    dest: &Path,
    resume_from: u64,
    known_total: Option<u64>,
    options: &FetchOptions,
    attempt: u32,
) -> Result<u64, AttemptFailure> {
    let mut file = if resume_from > 0 {
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(dest)
            .await
            .map_err(|e| io_failure(&e, 0))?
    } else {
        tokio::fs::File::create(dest)
            .await
            .map_err(|e| io_failure(&e, 0))?
    };

    // Session overflow tolerance: 1% or 1 KiB, whichever is larger.
    let overflow_limit = known_total.map(|total| {
        let one_percent = total + total / 100;
        one_percent.max(total + 1024)
    });

    let mut written = resume_from;
    let mut session_bytes: u64 = 0;
    let mut stream = response.bytes_stream();

    let started = Instant::now();
    let mut last_report = started;
    let mut last_report_bytes = written;

    loop {
        let next = tokio::time::timeout(options.inactivity_timeout, stream.next()).await;

        let chunk = match next {
            Err(_) => {
                return Err(AttemptFailure::Failed {
                    code: ErrorCode::SocketTimeout,
                    bytes: session_bytes,
                });
            }
            Ok(Some(Err(e))) => {
                return Err(AttemptFailure::Failed {
                    code: classify_reqwest(&e),
                    bytes: session_bytes,
                });
            }
            Ok(Some(Ok(chunk))) => chunk,
            Ok(None) => break,
        };

        file.write_all(&chunk)
            .await
            .map_err(|e| io_failure(&e, session_bytes))?;
        written += chunk.len() as u64;
        session_bytes += chunk.len() as u64;

        if let Some(limit) = overflow_limit {
            if written > limit {
                drop(file);
                remove_quietly(dest).await;
                return Err(AttemptFailure::Failed {
                    code: ErrorCode::DataOverflow,
                    bytes: session_bytes,
                });
            }
        }

        if let Some(progress) = &options.progress {
            let now = Instant::now();
            if now.duration_since(last_report) >= options.progress_interval {
                let interval = now.duration_since(last_report).as_secs_f64();
                #[allow(clippy::cast_precision_loss)]
                let rate = (written - last_report_bytes) as f64 / interval;
                progress.on_progress(&report(
                    written,
                    known_total,
                    rate,
                    resume_from,
                    attempt,
                ));
                last_report = now;
                last_report_bytes = written;
            }
        }
    }

    file.flush().await.map_err(|e| io_failure(&e, session_bytes))?;
    drop(file);

    if let Some(total) = known_total {
        if written < total {
            // Transport closed early; the partial stays for resume.
            return Err(AttemptFailure::Failed {
                code: ErrorCode::ConnectionReset,
                bytes: session_bytes,
            });
        }

        let on_disk = tokio::fs::metadata(dest)
            .await
            .map(|m| m.len())
            .map_err(|e| io_failure(&e, session_bytes))?;
        if on_disk != total {
            remove_quietly(dest).await;
            return Err(AttemptFailure::Failed {
                code: ErrorCode::SizeMismatch,
                bytes: session_bytes,
            });
        }
    }

    if let Some(progress) = &options.progress {
        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        #[allow(clippy::cast_precision_loss)]
        let rate = session_bytes as f64 / elapsed;
        progress.on_progress(&report(written, known_total, rate, resume_from, attempt));
    }

    Ok(written)
}

/// Builds a progress update.
fn report(
    written: u64,
    known_total: Option<u64>,
    rate: f64,
    resume_from: u64,
    attempt: u32,
) -> DownloadProgress {
    #[allow(clippy::cast_precision_loss)]
    let percent = known_total
        .filter(|total| *total > 0)
        .map(|total| written as f64 / total as f64 * 100.0);
    #[allow(clippy::cast_precision_loss)]
    let eta_seconds = known_total
        .filter(|_| rate > 0.0)
        .map(|total| total.saturating_sub(written) as f64 / rate);

    DownloadProgress {
        bytes_downloaded: written,
        total_bytes: known_total,
        bytes_per_second: rate,
        eta_seconds,
        percent,
        is_resuming: resume_from > 0,
        bytes_resumed_from: resume_from,
        attempt,
    }
}

/// Maps a transport error to its retry class.
fn classify_reqwest(error: &reqwest::Error) -> ErrorCode {
    if error.is_timeout() {
        return ErrorCode::SocketTimeout;
    }

    // Walk the source chain for the underlying I/O error kind.
    let mut source: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return classify_io_kind(io.kind());
        }
        source = inner.source();
    }

    if error.is_connect() {
        return ErrorCode::ConnectionRefused;
    }
    if error.is_body() || error.is_decode() {
        // Truncated body mid-transfer.
        return ErrorCode::ConnectionReset;
    }

    ErrorCode::Protocol
}

const fn classify_io_kind(kind: std::io::ErrorKind) -> ErrorCode {
    match kind {
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => {
            ErrorCode::ConnectionReset
        }
        std::io::ErrorKind::ConnectionRefused => ErrorCode::ConnectionRefused,
        std::io::ErrorKind::TimedOut => ErrorCode::TimedOut,
        std::io::ErrorKind::NotFound => ErrorCode::DnsFailure,
        std::io::ErrorKind::NetworkUnreachable => ErrorCode::NetworkUnreachable,
        std::io::ErrorKind::HostUnreachable => ErrorCode::HostUnreachable,
        std::io::ErrorKind::BrokenPipe => ErrorCode::BrokenPipe,
        std::io::ErrorKind::InvalidData => ErrorCode::Protocol,
        _ => ErrorCode::ConnectionReset,
    }
}

fn io_failure(error: &std::io::Error, bytes: u64) -> AttemptFailure {
    log::warn!("Local I/O failure during download: {error}");
    AttemptFailure::Failed {
        code: ErrorCode::Io,
        bytes,
    }
}

fn io_error(error: &std::io::Error, bytes: u64) -> DownloadError {
    log::warn!("Local I/O failure before download: {error}");
    DownloadError {
        code: ErrorCode::Io,
        attempts: 0,
        retryable: false,
        bytes_transferred: bytes,
    }
}

async fn remove_quietly(dest: &Path) {
    if let Err(e) = tokio::fs::remove_file(dest).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {e}", dest.display());
        }
    }
}
