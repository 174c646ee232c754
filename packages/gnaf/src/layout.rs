//! On-disk layout of an extracted G-NAF release.
//!
//! The archive nests its payload under a dated directory (e.g.
//! `G-NAF/G-NAF AUGUST 2025/`) holding an `Authority Code` directory,
//! a `Standard` directory of per-region constituent files, and the
//! count summary. The layout is treated as fixed per release; a new
//! layout cascades through these constants.

use std::path::{Path, PathBuf};

use addresskit_models::Region;

/// Directory of authority-code tables inside the release root.
pub const AUTHORITY_DIR: &str = "Authority Code";

/// Directory of per-region constituent files inside the release root.
pub const STANDARD_DIR: &str = "Standard";

/// The count summary file inside the release root.
pub const COUNTS_FILE: &str = "Counts.csv";

/// The per-region constituent files, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GnafFile {
    /// Locality master rows.
    Locality,
    /// Street-locality master rows.
    StreetLocality,
    /// Site-level geocodes.
    AddressSiteGeocode,
    /// Default geocodes.
    AddressDefaultGeocode,
    /// Address detail rows.
    AddressDetail,
}

impl GnafFile {
    /// The fixed dependency order: satellites before detail rows.
    pub const LOAD_ORDER: &[Self] = &[
        Self::Locality,
        Self::StreetLocality,
        Self::AddressSiteGeocode,
        Self::AddressDefaultGeocode,
        Self::AddressDetail,
    ];

    const fn stem(self) -> &'static str {
        match self {
            Self::Locality => "LOCALITY",
            Self::StreetLocality => "STREET_LOCALITY",
            Self::AddressSiteGeocode => "ADDRESS_SITE_GEOCODE",
            Self::AddressDefaultGeocode => "ADDRESS_DEFAULT_GEOCODE",
            Self::AddressDetail => "ADDRESS_DETAIL",
        }
    }

    /// The file name for a region (e.g. `NSW_ADDRESS_DETAIL_psv.psv`).
    #[must_use]
    pub fn file_name(self, region: Region) -> String {
        format!("{}_{}_psv.psv", region.code(), self.stem())
    }
}

/// Locates the release root under an extraction directory: the first
/// directory (breadth-first) containing both the authority and
/// standard subdirectories.
#[must_use]
pub fn find_release_root(dir: &Path) -> Option<PathBuf> {
    let mut queue = vec![dir.to_path_buf()];

    while !queue.is_empty() {
        let mut next = Vec::new();
        for candidate in queue {
            if candidate.join(AUTHORITY_DIR).is_dir() && candidate.join(STANDARD_DIR).is_dir() {
                return Some(candidate);
            }
            let Ok(entries) = std::fs::read_dir(&candidate) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    next.push(path);
                }
            }
        }
        queue = next;
    }

    None
}

/// The basename of a resource URL, used to name the archive on disk.
#[must_use]
pub fn archive_basename(url: &str) -> String {
    url.rsplit('/')
        .next()
        .map(|name| name.split('?').next().unwrap_or(name))
        .filter(|name| !name.is_empty())
        .unwrap_or("gnaf.zip")
        .to_string()
}

/// The extraction directory for an archive: its basename without the
/// `.zip` extension.
#[must_use]
pub fn extraction_dir_name(archive_basename: &str) -> String {
    archive_basename
        .strip_suffix(".zip")
        .unwrap_or(archive_basename)
        .to_string()
}
