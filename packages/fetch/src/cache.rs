//! File-backed response cache with fresh/stale/expired tiers.
//!
//! Caches the body of a small upstream resource (the package manifest)
//! keyed by URL, persisted across process runs as a single JSON file.
//! A fresh entry short-circuits the network entirely; a stale entry is
//! only served when a live fetch fails; an expired entry is treated as
//! absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Temporal tier of a cached entry at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Younger than one day; served without a network call.
    Fresh,
    /// One to thirty days; served only when the network fails.
    Stale,
    /// Thirty days or older; treated as absent.
    Expired,
}

/// A single cached response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    cached_at: DateTime<Utc>,
}

impl CacheEntry {
    fn tier_at(&self, now: DateTime<Utc>) -> Tier {
        let age = now - self.cached_at;
        if age < Duration::days(1) {
            Tier::Fresh
        } else if age < Duration::days(30) {
            Tier::Stale
        } else {
            Tier::Expired
        }
    }
}

/// Errors from cache persistence.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// I/O error reading or writing the store file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization error writing the store file.
    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A URL-keyed response cache persisted to a single JSON file.
///
/// The ingestion process is the single writer; entries are loaded once
/// at open and flushed on every insert.
pub struct FileCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
}

impl FileCache {
    /// Opens the cache at `path`, loading any existing store.
    ///
    /// A missing or corrupt store file yields an empty cache rather
    /// than an error; the cache is an optimisation, not a source of
    /// truth.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path).unwrap_or_else(|| {
            log::debug!("No usable cache store at {}", path.display());
            HashMap::new()
        });
        Self { path, entries }
    }

    fn load(path: &Path) -> Option<HashMap<String, CacheEntry>> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(entries) => Some(entries),
            Err(e) => {
                log::warn!("Discarding corrupt cache store {}: {e}", path.display());
                None
            }
        }
    }

    /// Returns the cached body for `url` with its current tier.
    ///
    /// Expired entries are reported as absent.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<(&str, Tier)> {
        self.get_at(url, Utc::now())
    }

    fn get_at(&self, url: &str, now: DateTime<Utc>) -> Option<(&str, Tier)> {
        let entry = self.entries.get(url)?;
        match entry.tier_at(now) {
            Tier::Expired => None,
            tier => Some((entry.body.as_str(), tier)),
        }
    }

    /// Inserts (or refreshes) the body for `url` and flushes the store.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store file cannot be written.
    pub fn put(&mut self, url: &str, body: String) -> Result<(), CacheError> {
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                body,
                cached_at: Utc::now(),
            },
        );
        self.save()
    }

    fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let raw = serde_json::to_string(&self.entries)?;
        std::fs::write(&self.path, raw).map_err(|e| CacheError::Io {
            path: self.path.display().to_string(),
            source: e,
        })
    }
}
