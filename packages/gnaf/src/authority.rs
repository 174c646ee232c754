//! Authority-code tables: constant-time code → name lookup.
//!
//! G-NAF ships nine small pipe-separated authority tables. They are
//! loaded eagerly once per ingestion run and passed by reference to
//! the mapper; a new quarterly release may extend them, so nothing is
//! cached across runs. Missing codes resolve to `None` — rows are
//! accepted with the raw code and the miss is logged once per
//! `(table, code)` pair.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;

use addresskit_models::SynonymPair;

use crate::psv::{self, PSV_DELIMITER};

/// The nine G-NAF authority tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorityTable {
    /// Level types (`L` → `LEVEL`).
    LevelType,
    /// Flat types (`UNIT` → `U`).
    FlatType,
    /// Street types (`AVENUE` → `AV`).
    StreetType,
    /// Street classes.
    StreetClass,
    /// Street suffixes (`N` → `NORTH`).
    StreetSuffix,
    /// Locality classes.
    LocalityClass,
    /// Geocode reliability levels.
    GeocodeReliability,
    /// Geocode types.
    GeocodeType,
    /// Geocoded level types (rank 1–7, coarse to fine).
    GeocodedLevelType,
}

impl AuthorityTable {
    /// All nine tables.
    pub const ALL: &[Self] = &[
        Self::LevelType,
        Self::FlatType,
        Self::StreetType,
        Self::StreetClass,
        Self::StreetSuffix,
        Self::LocalityClass,
        Self::GeocodeReliability,
        Self::GeocodeType,
        Self::GeocodedLevelType,
    ];

    /// The table's file name inside the `Authority Code` directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::LevelType => "Authority_Code_LEVEL_TYPE_AUT_psv.psv",
            Self::FlatType => "Authority_Code_FLAT_TYPE_AUT_psv.psv",
            Self::StreetType => "Authority_Code_STREET_TYPE_AUT_psv.psv",
            Self::StreetClass => "Authority_Code_STREET_CLASS_AUT_psv.psv",
            Self::StreetSuffix => "Authority_Code_STREET_SUFFIX_AUT_psv.psv",
            Self::LocalityClass => "Authority_Code_LOCALITY_CLASS_AUT_psv.psv",
            Self::GeocodeReliability => "Authority_Code_GEOCODE_RELIABILITY_AUT_psv.psv",
            Self::GeocodeType => "Authority_Code_GEOCODE_TYPE_AUT_psv.psv",
            Self::GeocodedLevelType => "Authority_Code_GEOCODED_LEVEL_TYPE_AUT_psv.psv",
        }
    }

    /// Human-readable table label for diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LevelType => "level-type",
            Self::FlatType => "flat-type",
            Self::StreetType => "street-type",
            Self::StreetClass => "street-class",
            Self::StreetSuffix => "street-suffix",
            Self::LocalityClass => "locality-class",
            Self::GeocodeReliability => "geocode-reliability",
            Self::GeocodeType => "geocode-type",
            Self::GeocodedLevelType => "geocoded-level-type",
        }
    }
}

/// Errors from authority table loading.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// Authority directory does not exist.
    #[error("authority directory not found: {0}")]
    DirectoryNotFound(String),

    /// Parse error in a table file.
    #[error("{0}")]
    Psv(#[from] psv::PsvError),
}

/// The loaded code → name maps for all nine tables.
pub struct AuthorityIndex {
    tables: HashMap<AuthorityTable, HashMap<String, String>>,
    // Unknown codes are logged once each; the set lives behind a
    // mutex so lookups stay `&self`.
    reported_misses: Mutex<BTreeSet<String>>,
}

impl AuthorityIndex {
    /// Loads all nine tables from the `Authority Code` directory.
    ///
    /// A missing table file degrades to an empty map with a warning:
    /// every affected row still loads, rendering raw codes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] if the directory is absent or a
    /// present table cannot be parsed at all.
    pub fn load(dir: &Path) -> Result<Self, AuthorityError> {
        if !dir.exists() {
            return Err(AuthorityError::DirectoryNotFound(
                dir.display().to_string(),
            ));
        }

        let mut tables = HashMap::with_capacity(AuthorityTable::ALL.len());

        for &table in AuthorityTable::ALL {
            let path = dir.join(table.file_name());
            if !path.exists() {
                log::warn!(
                    "Authority table {} missing at {}; codes will render raw",
                    table.label(),
                    path.display()
                );
                tables.insert(table, HashMap::new());
                continue;
            }

            let mut entries = HashMap::new();
            for row in psv::read_rows(&path, PSV_DELIMITER)? {
                let Some(code) = row.get("CODE") else {
                    continue;
                };
                let Some(name) = row.get("NAME") else {
                    continue;
                };
                entries.insert(code.to_string(), name.to_string());
            }

            log::debug!("Loaded {} {} codes", entries.len(), table.label());
            tables.insert(table, entries);
        }

        Ok(Self {
            tables,
            reported_misses: Mutex::new(BTreeSet::new()),
        })
    }

    /// An empty index; every lookup misses. For tests and dry runs.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            tables: AuthorityTable::ALL
                .iter()
                .map(|&table| (table, HashMap::new()))
                .collect(),
            reported_misses: Mutex::new(BTreeSet::new()),
        }
    }

    /// Resolves a code against a table.
    ///
    /// A miss logs a diagnostic once per `(table, code)` pair and
    /// returns `None`; callers fall back to the raw code.
    #[must_use]
    pub fn lookup(&self, table: AuthorityTable, code: &str) -> Option<&str> {
        let hit = self
            .tables
            .get(&table)
            .and_then(|entries| entries.get(code));

        if hit.is_none() {
            let key = format!("{}:{code}", table.label());
            let mut reported = self.reported_misses.lock().expect("miss set poisoned");
            if reported.insert(key) {
                log::warn!("Unknown {} code {code:?}", table.label());
            }
        }

        hit.map(String::as_str)
    }

    /// Flattens the street-type, flat-type, level-type and
    /// street-suffix tables into deduplicated `CODE, NAME` pairs for
    /// the backend's synonym-expansion analyser.
    #[must_use]
    pub fn synonyms(&self) -> Vec<SynonymPair> {
        let mut seen = BTreeSet::new();
        let mut pairs = Vec::new();

        for table in [
            AuthorityTable::StreetType,
            AuthorityTable::FlatType,
            AuthorityTable::LevelType,
            AuthorityTable::StreetSuffix,
        ] {
            if let Some(entries) = self.tables.get(&table) {
                for (code, name) in entries {
                    if seen.insert((code.clone(), name.clone())) {
                        pairs.push(SynonymPair {
                            code: code.clone(),
                            name: name.clone(),
                        });
                    }
                }
            }
        }

        pairs.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.name.cmp(&b.name)));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join("addresskit_authority_tests")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_table(dir: &Path, table: AuthorityTable, rows: &[(&str, &str)]) {
        let mut contents = String::from("CODE|NAME|DESCRIPTION\n");
        for (code, name) in rows {
            contents.push_str(&format!("{code}|{name}|{name}\n"));
        }
        std::fs::write(dir.join(table.file_name()), contents).unwrap();
    }

    #[test]
    fn resolves_known_codes_and_misses_unknown() {
        let dir = fixture_dir("lookup");
        write_table(
            &dir,
            AuthorityTable::StreetType,
            &[("AVENUE", "AV"), ("STREET", "ST")],
        );
        write_table(&dir, AuthorityTable::LevelType, &[("L", "LEVEL")]);

        let index = AuthorityIndex::load(&dir).unwrap();
        assert_eq!(index.lookup(AuthorityTable::StreetType, "AVENUE"), Some("AV"));
        assert_eq!(index.lookup(AuthorityTable::LevelType, "L"), Some("LEVEL"));
        assert_eq!(index.lookup(AuthorityTable::StreetType, "XYZ"), None);
        // Second miss for the same code must not panic or re-log.
        assert_eq!(index.lookup(AuthorityTable::StreetType, "XYZ"), None);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_table_degrades_to_empty() {
        let dir = fixture_dir("missing");
        write_table(&dir, AuthorityTable::StreetType, &[("AVENUE", "AV")]);

        let index = AuthorityIndex::load(&dir).unwrap();
        assert_eq!(index.lookup(AuthorityTable::FlatType, "UNIT"), None);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn synonyms_flatten_and_dedupe() {
        let dir = fixture_dir("synonyms");
        write_table(
            &dir,
            AuthorityTable::StreetType,
            &[("AVENUE", "AV"), ("STREET", "ST")],
        );
        write_table(&dir, AuthorityTable::FlatType, &[("UNIT", "U")]);
        write_table(&dir, AuthorityTable::LevelType, &[("L", "LEVEL")]);
        write_table(&dir, AuthorityTable::StreetSuffix, &[("N", "NORTH")]);

        let index = AuthorityIndex::load(&dir).unwrap();
        let pairs = index.synonyms();

        assert_eq!(pairs.len(), 5);
        assert!(pairs
            .iter()
            .any(|p| p.code == "AVENUE" && p.name == "AV"));
        assert!(pairs.iter().any(|p| p.code == "N" && p.name == "NORTH"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn absent_directory_is_an_error() {
        let dir = std::env::temp_dir().join("addresskit_authority_tests/never_created");
        assert!(AuthorityIndex::load(&dir).is_err());
    }
}
