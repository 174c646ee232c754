//! Ingestion orchestrator: manifest → fetch → extract → load.
//!
//! Drives one full ingestion run. Fetching and extraction are
//! idempotent (size checks make re-entry safe); loading writes to the
//! backend with deterministic document ids, so a re-run converges on
//! the same corpus. Within a region, files load in fixed dependency
//! order — satellites before address-detail rows — and each file
//! streams through bounded chunks that drain into the bulk sink
//! before more source is read.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use addresskit_fetch::cache::FileCache;
use addresskit_fetch::download::{self, DownloadError, FetchOptions};
use addresskit_fetch::manifest::{self, ManifestError};
use addresskit_fetch::progress::ProgressCallback;
use addresskit_index::bulk::{BulkConfig, BulkSink};
use addresskit_index::{BackendError, BulkOp, SearchBackend};
use addresskit_models::Region;

use crate::authority::{AuthorityError, AuthorityIndex};
use crate::config::Config;
use crate::counts::ExpectedCounts;
use crate::extract::{self, ExtractError};
use crate::layout::{self, GnafFile};
use crate::mapper::{self, GeocodeRecord, JoinedRecords, LocalityRecord, StreetRecord};
use crate::psv::{self, PsvError, Row, PSV_DELIMITER};

/// File name of the persistent package manifest cache.
const PACKAGE_CACHE_FILE: &str = "package-cache.json";

/// Errors that abort an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Manifest resolution failed with no usable cache.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Archive download exhausted its retries.
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Archive extraction failed.
    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Authority tables could not be loaded.
    #[error("authority error: {0}")]
    Authority(#[from] AuthorityError),

    /// A constituent file could not be parsed at all.
    #[error("parse error: {0}")]
    Psv(#[from] PsvError),

    /// The backend rejected an operation outside the bulk retry loop.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Async task join error.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The package manifest has no active zip resource.
    #[error("package has no active application/zip resource")]
    NoActiveResource,

    /// The extracted tree does not look like a G-NAF release.
    #[error("no G-NAF release root under {0}")]
    ReleaseRootNotFound(String),
}

/// Everything an ingestion run needs, injected explicitly.
pub struct LoadContext {
    /// Resolved configuration.
    pub config: Config,
    /// The search backend handle.
    pub backend: Arc<dyn SearchBackend>,
    /// HTTP client for manifest and archive fetches.
    pub client: reqwest::Client,
    /// Drop and recreate the index (with synonyms) before loading.
    pub clear: bool,
    /// Progress receiver for the archive download.
    pub progress: Arc<dyn ProgressCallback>,
}

/// Per-file loading statistics.
#[derive(Debug, Clone)]
pub struct FileLoad {
    /// Region the file belongs to.
    pub region: Region,
    /// Constituent file name.
    pub file: String,
    /// Rows streamed from the file.
    pub rows: u64,
    /// Documents submitted to the backend (detail files only).
    pub documents: u64,
    /// Wall-clock time spent on the file.
    pub duration: Duration,
}

/// The final timing report of an ingestion run.
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// Per-file statistics in load order.
    pub files: Vec<FileLoad>,
    /// Total documents submitted.
    pub documents: u64,
    /// Total wall-clock time.
    pub duration: Duration,
}

impl LoadSummary {
    fn log_report(&self) {
        log::info!(
            "Ingestion complete: {} documents from {} files in {:.1}s",
            self.documents,
            self.files.len(),
            self.duration.as_secs_f64()
        );
        for file in &self.files {
            log::info!(
                "  {} {}: {} rows ({} documents) in {:.1}s",
                file.region.code(),
                file.file,
                file.rows,
                file.documents,
                file.duration.as_secs_f64()
            );
        }
    }
}

/// Runs a full ingestion: manifest, archive, extraction, load.
///
/// # Errors
///
/// Returns [`LoadError`] when a stage fails beyond local recovery.
pub async fn load_gnaf(ctx: &LoadContext) -> Result<LoadSummary, LoadError> {
    let config = &ctx.config;
    tokio::fs::create_dir_all(&config.gnaf_dir).await?;

    let mut cache = FileCache::open(config.gnaf_dir.join(PACKAGE_CACHE_FILE));
    let package = manifest::fetch_package(&ctx.client, &mut cache, &config.package_url).await?;
    let resource = manifest::select_archive_resource(&package)
        .ok_or(LoadError::NoActiveResource)?
        .clone();
    log::info!(
        "Release archive: {} ({} bytes)",
        resource.url,
        resource.size.unwrap_or(0)
    );

    let archive_name = layout::archive_basename(&resource.url);
    let archive_path = config.gnaf_dir.join(&archive_name);
    fetch_archive(ctx, &resource.url, resource.size, &archive_path).await?;

    let extract_dir = config
        .gnaf_dir
        .join(layout::extraction_dir_name(&archive_name));
    {
        let zip_path = archive_path.clone();
        let dest = extract_dir.clone();
        tokio::task::spawn_blocking(move || extract::extract_archive(&zip_path, &dest)).await??;
    }

    load_extracted(ctx, &extract_dir).await
}

/// Loads an already-extracted release tree into the backend.
///
/// This is the re-entry point when the archive is on disk: steps 1–4
/// of [`load_gnaf`] are skipped entirely.
///
/// # Errors
///
/// Returns [`LoadError`] when a stage fails beyond local recovery.
pub async fn load_extracted(ctx: &LoadContext, extract_dir: &Path) -> Result<LoadSummary, LoadError> {
    let started = Instant::now();
    let config = &ctx.config;

    let root = layout::find_release_root(extract_dir)
        .ok_or_else(|| LoadError::ReleaseRootNotFound(extract_dir.display().to_string()))?;

    let authority = {
        let dir = root.join(layout::AUTHORITY_DIR);
        tokio::task::spawn_blocking(move || AuthorityIndex::load(&dir)).await??
    };

    if ctx.clear {
        log::info!("Recreating backend index");
        ctx.backend.create_index(&authority.synonyms()).await?;
    }

    let counts = ExpectedCounts::load(&root.join(layout::COUNTS_FILE));
    let sink = BulkSink::new(
        Arc::clone(&ctx.backend),
        BulkConfig {
            backoff: config.index_backoff,
            backoff_increment: config.index_backoff_increment,
            backoff_max: config.index_backoff_max,
            timeout: config.index_timeout,
        },
    );

    let standard_dir = root.join(layout::STANDARD_DIR);
    let mut summary = LoadSummary::default();

    for &region in &config.covered_states {
        load_region(
            ctx,
            region,
            &standard_dir,
            &authority,
            &counts,
            &sink,
            &mut summary,
        )
        .await?;
    }

    sink.refresh().await?;

    summary.duration = started.elapsed();
    summary.log_report();
    Ok(summary)
}

/// Fetches the archive unless it is already on disk at the expected
/// size. Downloads land in `incomplete/` and are renamed into place.
async fn fetch_archive(
    ctx: &LoadContext,
    url: &str,
    expected_size: Option<u64>,
    archive_path: &Path,
) -> Result<(), LoadError> {
    if let (Ok(metadata), Some(expected)) =
        (tokio::fs::metadata(archive_path).await, expected_size)
    {
        if metadata.len() == expected {
            log::info!(
                "Archive already on disk at {} ({expected} bytes); skipping download",
                archive_path.display()
            );
            return Ok(());
        }
    }

    let staging = ctx
        .config
        .gnaf_dir
        .join("incomplete")
        .join(archive_path.file_name().map_or("gnaf.zip".as_ref(), |name| name));

    download::fetch_file(
        &ctx.client,
        url,
        &staging,
        &FetchOptions {
            expected_size,
            progress: Some(Arc::clone(&ctx.progress)),
            ..FetchOptions::default()
        },
    )
    .await?;

    tokio::fs::rename(&staging, archive_path).await?;
    Ok(())
}

/// Loads one region: satellites into keyed maps, then detail rows
/// streamed through the mapper into the sink.
async fn load_region(
    ctx: &LoadContext,
    region: Region,
    standard_dir: &Path,
    authority: &AuthorityIndex,
    counts: &ExpectedCounts,
    sink: &BulkSink,
    summary: &mut LoadSummary,
) -> Result<(), LoadError> {
    let config = &ctx.config;
    log::info!("Loading region {}", region.code());

    let localities = collect_keyed(
        region,
        standard_dir,
        GnafFile::Locality,
        config,
        counts,
        summary,
        "LOCALITY_PID",
        LocalityRecord::from_row,
    )
    .await?;

    let streets = collect_keyed(
        region,
        standard_dir,
        GnafFile::StreetLocality,
        config,
        counts,
        summary,
        "STREET_LOCALITY_PID",
        StreetRecord::from_row,
    )
    .await?;

    let (site_geocodes, default_geocodes) = if config.enable_geo {
        let site = collect_multi(
            region,
            standard_dir,
            GnafFile::AddressSiteGeocode,
            config,
            counts,
            summary,
            "ADDRESS_SITE_PID",
            GeocodeRecord::from_site_row,
        )
        .await?;
        let default = collect_multi(
            region,
            standard_dir,
            GnafFile::AddressDefaultGeocode,
            config,
            counts,
            summary,
            "ADDRESS_DETAIL_PID",
            GeocodeRecord::from_default_row,
        )
        .await?;
        (site, default)
    } else {
        log::info!("  geocoding disabled; skipping geocode files");
        (HashMap::new(), HashMap::new())
    };

    let file_name = GnafFile::AddressDetail.file_name(region);
    let path = standard_dir.join(&file_name);
    let file_started = Instant::now();

    let mut stream = psv::stream_chunks(&path, PSV_DELIMITER, config.loading_chunk_bytes);
    let mut rows = 0u64;
    let mut documents = 0u64;

    while let Some(chunk) = stream.next_chunk().await {
        let chunk = chunk?;
        let mut ops = Vec::with_capacity(chunk.len());

        for row in &chunk {
            rows += 1;
            let joined = JoinedRecords {
                locality: row.get("LOCALITY_PID").and_then(|pid| localities.get(pid)),
                street: row
                    .get("STREET_LOCALITY_PID")
                    .and_then(|pid| streets.get(pid)),
                site_geocodes: row
                    .get("ADDRESS_SITE_PID")
                    .and_then(|pid| site_geocodes.get(pid))
                    .map_or(&[], Vec::as_slice),
                default_geocodes: row
                    .get("ADDRESS_DETAIL_PID")
                    .and_then(|pid| default_geocodes.get(pid))
                    .map_or(&[], Vec::as_slice),
            };

            match mapper::map_address(region, row, &joined, authority, config.enable_geo) {
                Ok(document) => ops.push(BulkOp::index(document)),
                Err(e) => log::warn!("{file_name} line {}: {e}", row.line()),
            }
        }

        documents += ops.len() as u64;
        // The parser is stalled on its bounded channel until this
        // submission returns: one chunk in flight at a time.
        sink.submit(&ops, false).await?;
    }

    counts.check(&file_name, rows);
    summary.documents += documents;
    summary.files.push(FileLoad {
        region,
        file: file_name,
        rows,
        documents,
        duration: file_started.elapsed(),
    });

    Ok(())
}

/// Streams a satellite file into a map keyed by `key_column`.
#[allow(clippy::too_many_arguments)]
async fn collect_keyed<T>(
    region: Region,
    standard_dir: &Path,
    file: GnafFile,
    config: &Config,
    counts: &ExpectedCounts,
    summary: &mut LoadSummary,
    key_column: &str,
    from_row: impl Fn(&Row) -> T,
) -> Result<HashMap<String, T>, LoadError> {
    let file_name = file.file_name(region);
    let path = standard_dir.join(&file_name);
    let started = Instant::now();

    let mut map = HashMap::new();
    let mut rows = 0u64;

    let mut stream = psv::stream_chunks(&path, PSV_DELIMITER, config.loading_chunk_bytes);
    while let Some(chunk) = stream.next_chunk().await {
        for row in chunk? {
            rows += 1;
            let Some(key) = row.get(key_column) else {
                log::warn!("{file_name} line {}: missing {key_column}", row.line());
                continue;
            };
            map.insert(key.to_string(), from_row(&row));
        }
    }

    counts.check(&file_name, rows);
    summary.files.push(FileLoad {
        region,
        file: file_name,
        rows,
        documents: 0,
        duration: started.elapsed(),
    });

    Ok(map)
}

/// Streams a satellite file into a multimap keyed by `key_column`.
#[allow(clippy::too_many_arguments)]
async fn collect_multi<T>(
    region: Region,
    standard_dir: &Path,
    file: GnafFile,
    config: &Config,
    counts: &ExpectedCounts,
    summary: &mut LoadSummary,
    key_column: &str,
    from_row: impl Fn(&Row) -> T,
) -> Result<HashMap<String, Vec<T>>, LoadError> {
    let file_name = file.file_name(region);
    let path = standard_dir.join(&file_name);
    let started = Instant::now();

    let mut map: HashMap<String, Vec<T>> = HashMap::new();
    let mut rows = 0u64;

    let mut stream = psv::stream_chunks(&path, PSV_DELIMITER, config.loading_chunk_bytes);
    while let Some(chunk) = stream.next_chunk().await {
        for row in chunk? {
            rows += 1;
            let Some(key) = row.get(key_column) else {
                log::warn!("{file_name} line {}: missing {key_column}", row.line());
                continue;
            };
            map.entry(key.to_string()).or_default().push(from_row(&row));
        }
    }

    counts.check(&file_name, rows);
    summary.files.push(FileLoad {
        region,
        file: file_name,
        rows,
        documents: 0,
        duration: started.elapsed(),
    });

    Ok(map)
}
