//! Package manifest resolution.
//!
//! The quarterly archive is published behind a registry entry whose
//! JSON body enumerates downloadable resources. The manifest is fetched
//! through the file-backed [`FileCache`] so repeated runs within a day
//! make no network calls at all, and a flaky registry degrades to the
//! last known manifest instead of failing the run.

use serde::Deserialize;

use crate::cache::{CacheError, FileCache, Tier};

/// The registry response for the G-NAF package.
#[derive(Debug, Clone, Deserialize)]
pub struct Package {
    /// The package payload.
    pub result: PackageResult,
}

/// The package payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageResult {
    /// Downloadable resources, in registry order.
    pub resources: Vec<Resource>,
}

/// One downloadable resource in the package.
#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    /// Publication state (`active` for the current release).
    #[serde(default)]
    pub state: Option<String>,
    /// MIME type of the resource.
    #[serde(default)]
    pub mimetype: Option<String>,
    /// Download URL.
    pub url: String,
    /// Size in bytes, when the registry reports one.
    #[serde(default)]
    pub size: Option<u64>,
}

/// Errors from manifest resolution.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// HTTP request error.
    #[error("HTTP error fetching manifest: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Manifest body was not valid JSON of the expected shape.
    #[error("manifest parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Cache persistence error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// No active zip resource in the package.
    #[error("package has no active application/zip resource")]
    NoActiveResource,
}

/// Selects the archive resource: the first entry that is both
/// `active` and `application/zip`.
#[must_use]
pub fn select_archive_resource(package: &Package) -> Option<&Resource> {
    package.result.resources.iter().find(|resource| {
        resource.state.as_deref() == Some("active")
            && resource.mimetype.as_deref() == Some("application/zip")
    })
}

/// Fetches the package manifest for `url` through the cache.
///
/// A fresh cache entry is served directly. Otherwise the network is
/// tried first and the cache refreshed on success; on failure a stale
/// entry (if any) is served with a warning, and only an expired or
/// absent cache lets the network error surface.
///
/// # Errors
///
/// Returns [`ManifestError`] when the network fails with no usable
/// cached manifest, or the body cannot be parsed.
pub async fn fetch_package(
    client: &reqwest::Client,
    cache: &mut FileCache,
    url: &str,
) -> Result<Package, ManifestError> {
    let cached = cache.get(url).map(|(body, tier)| (body.to_string(), tier));

    if let Some((body, Tier::Fresh)) = &cached {
        log::debug!("Using fresh cached manifest for {url}");
        return Ok(serde_json::from_str(body)?);
    }

    match fetch_body(client, url).await {
        Ok(body) => {
            let package = serde_json::from_str(&body)?;
            cache.put(url, body)?;
            Ok(package)
        }
        Err(e) => {
            if let Some((body, Tier::Stale)) = cached {
                log::warn!("Manifest fetch failed ({e}); serving stale cached copy");
                return Ok(serde_json::from_str(&body)?);
            }
            Err(e)
        }
    }
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String, ManifestError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ManifestError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "result": {
            "resources": [
                { "state": "active", "mimetype": "text/html", "url": "http://x/page" },
                { "state": "draft", "mimetype": "application/zip", "url": "http://x/old.zip" },
                { "state": "active", "mimetype": "application/zip", "url": "http://x/gnaf.zip", "size": 1610612736 },
                { "state": "active", "mimetype": "application/zip", "url": "http://x/other.zip" }
            ]
        }
    }"#;

    fn test_store(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("addresskit_manifest_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn selects_first_active_zip_resource() {
        let package: Package = serde_json::from_str(MANIFEST).unwrap();
        let resource = select_archive_resource(&package).unwrap();
        assert_eq!(resource.url, "http://x/gnaf.zip");
        assert_eq!(resource.size, Some(1_610_612_736));
    }

    #[test]
    fn no_active_zip_yields_none() {
        let package: Package = serde_json::from_str(
            r#"{ "result": { "resources": [ { "state": "draft", "mimetype": "application/zip", "url": "http://x/a.zip" } ] } }"#,
        )
        .unwrap();
        assert!(select_archive_resource(&package).is_none());
    }

    #[tokio::test]
    async fn fresh_cache_short_circuits_the_network() {
        let mut cache = FileCache::open(test_store("fresh.json"));
        // Unroutable URL: any network attempt would fail.
        let url = "http://127.0.0.1:1/package";
        cache.put(url, MANIFEST.to_string()).unwrap();

        let client = crate::build_client().unwrap();
        let package = fetch_package(&client, &mut cache, url).await.unwrap();
        assert_eq!(package.result.resources.len(), 4);
    }

    #[tokio::test]
    async fn network_failure_with_no_cache_surfaces_the_error() {
        let mut cache = FileCache::open(test_store("absent.json"));
        let client = crate::build_client().unwrap();
        let result = fetch_package(&client, &mut cache, "http://127.0.0.1:1/package").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn network_success_refreshes_the_cache() {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/package", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{MANIFEST}",
                MANIFEST.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });

        let store = test_store("refresh.json");
        let mut cache = FileCache::open(&store);
        let client = crate::build_client().unwrap();
        let package = fetch_package(&client, &mut cache, &url).await.unwrap();
        assert!(select_archive_resource(&package).is_some());

        // The body is now cached and served without the server.
        let package = fetch_package(&client, &mut cache, &url).await.unwrap();
        assert_eq!(package.result.resources.len(), 4);
        let _ = std::fs::remove_file(&store);
    }
}
