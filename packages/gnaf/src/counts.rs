//! Expected-row-count manifest bundled in the archive.
//!
//! The release ships a small comma-separated summary enumerating the
//! expected record count per constituent file. The loader compares
//! streamed row totals against it; a mismatch is logged, never fatal.

use std::collections::HashMap;
use std::path::Path;

use crate::psv;

/// Expected row counts keyed by constituent file name.
#[derive(Debug, Default)]
pub struct ExpectedCounts {
    counts: HashMap<String, u64>,
}

impl ExpectedCounts {
    /// Loads the summary at `path`. A missing or unreadable summary
    /// degrades to an empty set with a warning.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            log::warn!("Count summary not found at {}", path.display());
            return Self::default();
        }

        let rows = match psv::read_rows(path, b',') {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("Unreadable count summary {}: {e}", path.display());
                return Self::default();
            }
        };

        let mut counts = HashMap::with_capacity(rows.len());
        for row in &rows {
            let Some(file) = row.get("File").or_else(|| row.get("File Name")) else {
                continue;
            };
            let Some(count) = row.get("Count").and_then(|raw| raw.parse().ok()) else {
                continue;
            };
            counts.insert(file.to_string(), count);
        }

        log::debug!("Loaded expected counts for {} files", counts.len());
        Self { counts }
    }

    /// The expected row count for a constituent file, when listed.
    #[must_use]
    pub fn get(&self, file_name: &str) -> Option<u64> {
        self.counts.get(file_name).copied()
    }

    /// Compares a streamed total against the manifest, logging any
    /// mismatch with file context.
    pub fn check(&self, file_name: &str, actual: u64) {
        match self.get(file_name) {
            Some(expected) if expected != actual => {
                log::warn!("{file_name}: loaded {actual} rows, summary expected {expected}");
            }
            Some(_) => {}
            None => log::debug!("{file_name}: no expected count in summary"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_and_count_columns() {
        let dir = std::env::temp_dir().join("addresskit_counts_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Counts.csv");
        std::fs::write(
            &path,
            "File,Count\nNSW_ADDRESS_DETAIL_psv.psv,4512370\nNSW_LOCALITY_psv.psv,4620\n",
        )
        .unwrap();

        let counts = ExpectedCounts::load(&path);
        assert_eq!(counts.get("NSW_ADDRESS_DETAIL_psv.psv"), Some(4_512_370));
        assert_eq!(counts.get("NSW_LOCALITY_psv.psv"), Some(4620));
        assert_eq!(counts.get("VIC_LOCALITY_psv.psv"), None);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_summary_degrades_to_empty() {
        let counts = ExpectedCounts::load(Path::new("/definitely/not/here/Counts.csv"));
        assert_eq!(counts.get("NSW_LOCALITY_psv.psv"), None);
    }
}
