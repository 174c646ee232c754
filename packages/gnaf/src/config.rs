//! Environment-driven configuration for an ingestion run.

use std::path::PathBuf;
use std::time::Duration;

use addresskit_models::{covered_regions, Region};

/// Default registry entry enumerating the quarterly G-NAF package.
pub const DEFAULT_PACKAGE_URL: &str =
    "https://data.gov.au/api/3/action/package_show?id=19432f89-dc3a-4ef3-b943-5326ef1dbecc";

/// Resolved configuration for an ingestion run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Regions to load; defaults to all nine.
    pub covered_states: Vec<Region>,
    /// Default page size for autocomplete results.
    pub page_size: u32,
    /// Backend index name (directory under `gnaf_dir`).
    pub index_name: String,
    /// Whether geocode files are read and mapped.
    pub enable_geo: bool,
    /// Per-bulk submission timeout.
    pub index_timeout: Duration,
    /// Initial bulk retry delay.
    pub index_backoff: Duration,
    /// Bulk retry delay growth per attempt.
    pub index_backoff_increment: Duration,
    /// Bulk retry delay cap.
    pub index_backoff_max: Duration,
    /// Bytes of source per streaming chunk.
    pub loading_chunk_bytes: u64,
    /// Root directory for downloads, extraction and caches.
    pub gnaf_dir: PathBuf,
    /// Registry URL for the package manifest.
    pub package_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            covered_states: Region::ALL.to_vec(),
            page_size: 8,
            index_name: "addresskit".to_string(),
            enable_geo: true,
            index_timeout: Duration::from_secs(30),
            index_backoff: Duration::from_secs(30),
            index_backoff_increment: Duration::from_secs(30),
            index_backoff_max: Duration::from_secs(600),
            loading_chunk_bytes: 10 * 1024 * 1024,
            gnaf_dir: PathBuf::from("target/gnaf"),
            package_url: DEFAULT_PACKAGE_URL.to_string(),
        }
    }
}

impl Config {
    /// Resolves the configuration from the environment, falling back
    /// to defaults for unset or unparseable values.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            covered_states: std::env::var("COVERED_STATES")
                .map_or_else(|_| Region::ALL.to_vec(), |raw| covered_regions(&raw)),
            page_size: env_number("PAGE_SIZE", defaults.page_size),
            index_name: std::env::var("ES_INDEX_NAME").unwrap_or(defaults.index_name),
            enable_geo: std::env::var("ADDRESSKIT_ENABLE_GEO")
                .map_or(defaults.enable_geo, |raw| raw.trim() != "0"),
            index_timeout: env_secs("ADDRESSKIT_INDEX_TIMEOUT", defaults.index_timeout),
            index_backoff: env_secs("ADDRESSKIT_INDEX_BACKOFF", defaults.index_backoff),
            index_backoff_increment: env_secs(
                "ADDRESSKIT_INDEX_BACKOFF_INCREMENT",
                defaults.index_backoff_increment,
            ),
            index_backoff_max: env_secs(
                "ADDRESSKIT_INDEX_BACKOFF_MAX",
                defaults.index_backoff_max,
            ),
            loading_chunk_bytes: env_number::<u64>("ADDRESSKIT_LOADING_CHUNK_SIZE", 10)
                * 1024
                * 1024,
            gnaf_dir: std::env::var("GNAF_DIR").map_or(defaults.gnaf_dir, PathBuf::from),
            package_url: std::env::var("GNAF_PACKAGE_URL").unwrap_or(defaults.package_url),
        }
    }
}

fn env_number<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    raw.trim().parse().map_or_else(
        |_| {
            log::warn!("Ignoring unparseable {key}={raw}");
            default
        },
        |value| value,
    )
}

fn env_secs(key: &str, default: Duration) -> Duration {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    raw.trim().parse().map_or_else(
        |_| {
            log::warn!("Ignoring unparseable {key}={raw}");
            default
        },
        Duration::from_secs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_regions() {
        let config = Config::default();
        assert_eq!(config.covered_states.len(), 9);
        assert_eq!(config.page_size, 8);
        assert_eq!(config.index_name, "addresskit");
        assert!(config.enable_geo);
        assert_eq!(config.loading_chunk_bytes, 10 * 1024 * 1024);
    }
}
