//! Zip archive extraction with per-entry skip and atomic publication.
//!
//! Archives are tens of gigabytes, so every entry streams straight to
//! disk. Extraction lands in a sibling `incomplete/` directory and is
//! renamed into place in one step, so a partially-extracted tree never
//! masquerades as complete. Entries whose output file already exists
//! at the declared size are skipped, which makes re-entry after a
//! crash (and a second full extraction) cheap.

use std::path::{Path, PathBuf};

/// Errors from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Archive file not found.
    #[error("archive not found: {0}")]
    ArchiveNotFound(String),

    /// Zip structure error.
    #[error("zip error in {path}: {source}")]
    Zip {
        /// Archive path.
        path: String,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },

    /// I/O error reading the archive or writing an entry.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Extracts `zip_path` into `dest_dir`.
///
/// Returns the number of file entries written (skipped entries are not
/// counted). When `dest_dir` already holds every entry at its declared
/// size, the call is a no-op.
///
/// # Errors
///
/// Returns [`ExtractError`] if the archive cannot be read or an entry
/// cannot be written.
pub fn extract_archive(zip_path: &Path, dest_dir: &Path) -> Result<u64, ExtractError> {
    if !zip_path.exists() {
        return Err(ExtractError::ArchiveNotFound(
            zip_path.display().to_string(),
        ));
    }

    if dest_dir.exists() && tree_matches(zip_path, dest_dir)? {
        log::info!(
            "Extraction target {} already complete; skipping",
            dest_dir.display()
        );
        return Ok(0);
    }

    let staging = staging_dir(dest_dir);
    std::fs::create_dir_all(&staging).map_err(|e| io_error(&staging, e))?;

    log::info!(
        "Extracting {} -> {} (staging in {})",
        zip_path.display(),
        dest_dir.display(),
        staging.display()
    );

    let written = unpack_into(zip_path, &staging)?;

    // Publish atomically: drop any stale target, then rename.
    if dest_dir.exists() {
        std::fs::remove_dir_all(dest_dir).map_err(|e| io_error(dest_dir, e))?;
    }
    std::fs::rename(&staging, dest_dir).map_err(|e| io_error(dest_dir, e))?;

    log::info!("  extracted {written} file(s)");
    Ok(written)
}

/// The staging directory for a destination: `{parent}/incomplete/{name}`.
fn staging_dir(dest_dir: &Path) -> PathBuf {
    let parent = dest_dir.parent().unwrap_or_else(|| Path::new("."));
    let name = dest_dir.file_name().map_or_else(
        || PathBuf::from("extract"),
        PathBuf::from,
    );
    parent.join("incomplete").join(name)
}

/// Streams every entry of the archive into `target`, skipping entries
/// already present at their declared size.
fn unpack_into(zip_path: &Path, target: &Path) -> Result<u64, ExtractError> {
    let file = std::fs::File::open(zip_path).map_err(|e| io_error(zip_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| zip_error(zip_path, e))?;

    let mut written = 0u64;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| zip_error(zip_path, e))?;

        let Some(relative) = entry.enclosed_name() else {
            log::warn!("  skipping entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = target.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| io_error(&out_path, e))?;
            continue;
        }

        if let Ok(metadata) = std::fs::metadata(&out_path) {
            if metadata.len() == entry.size() {
                log::debug!("  skipping {} (already extracted)", out_path.display());
                continue;
            }
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let mut out = std::fs::File::create(&out_path).map_err(|e| io_error(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| io_error(&out_path, e))?;
        written += 1;
    }

    Ok(written)
}

/// Returns `true` when every file entry of the archive exists under
/// `dest_dir` at its declared size.
fn tree_matches(zip_path: &Path, dest_dir: &Path) -> Result<bool, ExtractError> {
    let file = std::fs::File::open(zip_path).map_err(|e| io_error(zip_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| zip_error(zip_path, e))?;

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|e| zip_error(zip_path, e))?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest_dir.join(relative);
        match std::fs::metadata(&out_path) {
            Ok(metadata) if metadata.len() == entry.size() => {}
            _ => return Ok(false),
        }
    }

    Ok(true)
}

fn io_error(path: &Path, source: std::io::Error) -> ExtractError {
    ExtractError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn zip_error(path: &Path, source: zip::result::ZipError) -> ExtractError {
    ExtractError::Zip {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, body) in entries {
            if name.ends_with('/') {
                writer.add_directory(name.to_string(), options).unwrap();
            } else {
                writer.start_file(name.to_string(), options).unwrap();
                writer.write_all(body).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("addresskit_extract_tests")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn extracts_nested_entries() {
        let dir = test_dir("nested");
        let zip_path = dir.join("archive.zip");
        build_zip(
            &zip_path,
            &[
                ("G-NAF/", b""),
                ("G-NAF/Standard/NSW_LOCALITY_psv.psv", b"LOCALITY_PID|NAME\n1|X\n"),
                ("G-NAF/Counts.csv", b"File,Count\n"),
            ],
        );

        let dest = dir.join("archive");
        let written = extract_archive(&zip_path, &dest).unwrap();
        assert_eq!(written, 2);
        assert!(dest.join("G-NAF/Standard/NSW_LOCALITY_psv.psv").exists());
        // Staging directory is gone after the rename.
        assert!(!dir.join("incomplete").join("archive").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn second_extraction_is_a_no_op() {
        let dir = test_dir("noop");
        let zip_path = dir.join("archive.zip");
        build_zip(&zip_path, &[("data.psv", b"A|B\n1|2\n")]);

        let dest = dir.join("archive");
        assert_eq!(extract_archive(&zip_path, &dest).unwrap(), 1);
        assert_eq!(extract_archive(&zip_path, &dest).unwrap(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn size_mismatch_triggers_re_extraction() {
        let dir = test_dir("mismatch");
        let zip_path = dir.join("archive.zip");
        build_zip(&zip_path, &[("data.psv", b"A|B\n1|2\n")]);

        let dest = dir.join("archive");
        extract_archive(&zip_path, &dest).unwrap();
        std::fs::write(dest.join("data.psv"), b"truncated").unwrap();

        assert_eq!(extract_archive(&zip_path, &dest).unwrap(), 1);
        assert_eq!(std::fs::read(dest.join("data.psv")).unwrap(), b"A|B\n1|2\n");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
