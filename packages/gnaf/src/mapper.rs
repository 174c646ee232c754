//! Address row mapper: raw G-NAF rows to structured documents.
//!
//! Pure functions of their inputs; no I/O. One address-detail row plus
//! its joined locality, street-locality and geocode records becomes an
//! [`AddressDetail`] with four renderings:
//!
//! - `sla` — canonical comma-separated single line, uppercase
//! - `ssla` — compact single line (`25/300 BARANGAROO AV, …`)
//! - `mla` — the sla parts as 1–4 display lines
//! - `smla` — the same groups in short form: building name on its own
//!   line, then the compact street line, then the locality line
//!
//! Codes resolve through the [`AuthorityIndex`]; a missing code renders
//! raw and never fails the row. Geocode records with attributes the
//! mapper cannot interpret reject the entire geo bundle for the row —
//! unknown geometry semantics are not guessed at.

use addresskit_models::{
    AddressDetail, CodeName, FlatLevel, Geo, Geocode, Locality, Lot, NumberPart, NumberRange,
    Region, Street, StructuredAddress,
};

use crate::authority::{AuthorityIndex, AuthorityTable};
use crate::psv::Row;

/// Maximum display lines in a multi-line address.
pub const MAX_MLA_LINES: usize = 4;

/// Structural mapping failures; fatal for the row, never the run.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The detail row has no persistent identifier.
    #[error("address row has no ADDRESS_DETAIL_PID")]
    MissingPid,

    /// The address renders to more than [`MAX_MLA_LINES`] lines,
    /// which signals a malformed source row.
    #[error("{pid}: address renders to {lines} lines (limit {MAX_MLA_LINES})")]
    TooManyLines {
        /// Address pid.
        pid: String,
        /// Number of lines produced.
        lines: usize,
    },

    /// A joined geocode record carries an attribute the mapper cannot
    /// interpret.
    #[error("{pid}: geocode carries unrecognised attribute {column:?}")]
    UnknownGeocodeAttribute {
        /// Address pid.
        pid: String,
        /// The offending column.
        column: String,
    },

    /// A joined geocode record has no usable coordinates.
    #[error("{pid}: geocode has no usable coordinates")]
    InvalidGeocode {
        /// Address pid.
        pid: String,
    },
}

/// Columns the mapper understands on a site geocode row.
const SITE_GEOCODE_COLUMNS: &[&str] = &[
    "ADDRESS_SITE_GEOCODE_PID",
    "DATE_CREATED",
    "DATE_RETIRED",
    "ADDRESS_SITE_PID",
    "GEOCODE_SITE_NAME",
    "GEOCODE_SITE_DESCRIPTION",
    "GEOCODE_TYPE_CODE",
    "RELIABILITY_CODE",
    "BOUNDARY_EXTENT",
    "PLANIMETRIC_ACCURACY",
    "ELEVATION",
    "LEVEL_GEOCODED_CODE",
    "LONGITUDE",
    "LATITUDE",
];

/// Columns the mapper understands on a default geocode row.
const DEFAULT_GEOCODE_COLUMNS: &[&str] = &[
    "ADDRESS_DEFAULT_GEOCODE_PID",
    "DATE_CREATED",
    "DATE_RETIRED",
    "ADDRESS_DETAIL_PID",
    "GEOCODE_TYPE_CODE",
    "RELIABILITY_CODE",
    "LEVEL_GEOCODED_CODE",
    "LONGITUDE",
    "LATITUDE",
];

/// A locality row reduced to the columns the mapper consumes.
#[derive(Debug, Clone)]
pub struct LocalityRecord {
    /// Locality name.
    pub name: String,
    /// Locality class code.
    pub class_code: Option<String>,
}

impl LocalityRecord {
    /// Extracts the record from a `LOCALITY` row.
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        Self {
            name: row.get("LOCALITY_NAME").unwrap_or_default().to_string(),
            class_code: row.get("LOCALITY_CLASS_CODE").map(str::to_string),
        }
    }
}

/// A street-locality row reduced to the columns the mapper consumes.
#[derive(Debug, Clone)]
pub struct StreetRecord {
    /// Street name.
    pub name: String,
    /// Street type code (e.g. `AVENUE`).
    pub type_code: Option<String>,
    /// Street suffix code (e.g. `N`).
    pub suffix_code: Option<String>,
    /// Street class code.
    pub class_code: Option<String>,
}

impl StreetRecord {
    /// Extracts the record from a `STREET_LOCALITY` row.
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        Self {
            name: row.get("STREET_NAME").unwrap_or_default().to_string(),
            type_code: row.get("STREET_TYPE_CODE").map(str::to_string),
            suffix_code: row.get("STREET_SUFFIX_CODE").map(str::to_string),
            class_code: row.get("STREET_CLASS_CODE").map(str::to_string),
        }
    }
}

/// A geocode row reduced to the attributes the mapper consumes.
///
/// Parsing never fails: missing coordinates and unrecognised columns
/// are carried as state and rejected per-address at mapping time.
#[derive(Debug, Clone)]
pub struct GeocodeRecord {
    /// Latitude, when parseable.
    pub latitude: Option<f64>,
    /// Longitude, when parseable.
    pub longitude: Option<f64>,
    /// Reliability code.
    pub reliability_code: Option<String>,
    /// Geocode type code.
    pub type_code: Option<String>,
    /// Geocoded level code (rank 1–7), when the row reports one.
    pub level_code: Option<String>,
    /// First column the mapper does not understand, if any.
    pub unknown_attribute: Option<String>,
}

impl GeocodeRecord {
    /// Extracts the record from an `ADDRESS_SITE_GEOCODE` row.
    #[must_use]
    pub fn from_site_row(row: &Row) -> Self {
        Self::from_row(row, SITE_GEOCODE_COLUMNS)
    }

    /// Extracts the record from an `ADDRESS_DEFAULT_GEOCODE` row.
    #[must_use]
    pub fn from_default_row(row: &Row) -> Self {
        Self::from_row(row, DEFAULT_GEOCODE_COLUMNS)
    }

    fn from_row(row: &Row, known_columns: &[&str]) -> Self {
        let unknown_attribute = row
            .columns()
            .find(|(name, _)| !known_columns.contains(name))
            .map(|(name, _)| name.to_string());

        Self {
            latitude: row.get("LATITUDE").and_then(|raw| raw.parse().ok()),
            longitude: row.get("LONGITUDE").and_then(|raw| raw.parse().ok()),
            reliability_code: row.get("RELIABILITY_CODE").map(str::to_string),
            type_code: row.get("GEOCODE_TYPE_CODE").map(str::to_string),
            level_code: row.get("LEVEL_GEOCODED_CODE").map(str::to_string),
            unknown_attribute,
        }
    }
}

/// The satellite records joined to one address-detail row.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinedRecords<'a> {
    /// The locality row, joined by `LOCALITY_PID`.
    pub locality: Option<&'a LocalityRecord>,
    /// The street-locality row, joined by `STREET_LOCALITY_PID`.
    pub street: Option<&'a StreetRecord>,
    /// Site geocode rows, joined by `ADDRESS_SITE_PID`.
    pub site_geocodes: &'a [GeocodeRecord],
    /// Default geocode rows, joined by `ADDRESS_DETAIL_PID`.
    pub default_geocodes: &'a [GeocodeRecord],
}

/// Maps one address-detail row into its document.
///
/// # Errors
///
/// Returns [`MapError`] for structural failures: a missing pid, a
/// rendering exceeding the line budget, or a geo bundle the mapper
/// cannot interpret. All other oddities degrade with a diagnostic.
pub fn map_address(
    region: Region,
    detail: &Row,
    joined: &JoinedRecords<'_>,
    authority: &AuthorityIndex,
    geo_enabled: bool,
) -> Result<AddressDetail, MapError> {
    let pid = detail.get("ADDRESS_DETAIL_PID").ok_or(MapError::MissingPid)?;

    let structured = map_structured(region, pid, detail, joined, authority);

    let long_parts = render_long_parts(&structured);
    if long_parts.len() > MAX_MLA_LINES {
        return Err(MapError::TooManyLines {
            pid: pid.to_string(),
            lines: long_parts.len(),
        });
    }
    let ssla_parts = render_ssla_parts(&structured);
    let short_parts = render_short_parts(&structured);

    let geo = if geo_enabled {
        map_geo(pid, detail, joined, authority)?
    } else {
        None
    };

    Ok(AddressDetail {
        pid: pid.to_string(),
        sla: long_parts.join(", "),
        ssla: ssla_parts.join(", "),
        mla: long_parts,
        smla: short_parts,
        confidence: structured.confidence,
        structured,
        geo,
    })
}

/// Assembles the structured form from the row and joined records.
fn map_structured(
    region: Region,
    pid: &str,
    detail: &Row,
    joined: &JoinedRecords<'_>,
    authority: &AuthorityIndex,
) -> StructuredAddress {
    let street = joined.street.map_or_else(
        || {
            log::warn!("{pid}: no joined street-locality record");
            Street::default()
        },
        |record| Street {
            name: record.name.clone(),
            type_name: resolve(authority, AuthorityTable::StreetType, record.type_code.as_deref()),
            suffix: resolve(
                authority,
                AuthorityTable::StreetSuffix,
                record.suffix_code.as_deref(),
            ),
            class_name: resolve(
                authority,
                AuthorityTable::StreetClass,
                record.class_code.as_deref(),
            ),
        },
    );

    let locality = joined.locality.map_or_else(
        || {
            log::warn!("{pid}: no joined locality record");
            Locality::default()
        },
        |record| Locality {
            name: record.name.clone(),
            class_name: resolve(
                authority,
                AuthorityTable::LocalityClass,
                record.class_code.as_deref(),
            ),
        },
    );

    StructuredAddress {
        building_name: detail.get("BUILDING_NAME").map(str::to_string),
        lot: map_lot(detail),
        flat: map_flat_level(pid, detail, "FLAT", AuthorityTable::FlatType, authority),
        level: map_flat_level(pid, detail, "LEVEL", AuthorityTable::LevelType, authority),
        number: map_number(pid, detail),
        street,
        locality,
        state: region.code().to_string(),
        postcode: detail.get("POSTCODE").unwrap_or_default().to_string(),
        confidence: parse_number(pid, detail, "CONFIDENCE"),
    }
}

/// Resolves a code through an authority table into a `CodeName`.
fn resolve(
    authority: &AuthorityIndex,
    table: AuthorityTable,
    code: Option<&str>,
) -> Option<CodeName> {
    let code = code?;
    Some(CodeName {
        code: code.to_string(),
        name: authority.lookup(table, code).map(str::to_string),
    })
}

fn map_lot(detail: &Row) -> Option<Lot> {
    let lot = Lot {
        prefix: detail.get("LOT_NUMBER_PREFIX").map(str::to_string),
        number: detail.get("LOT_NUMBER").map(str::to_string),
        suffix: detail.get("LOT_NUMBER_SUFFIX").map(str::to_string),
    };
    (!lot.is_empty()).then_some(lot)
}

fn map_flat_level(
    pid: &str,
    detail: &Row,
    prefix: &str,
    table: AuthorityTable,
    authority: &AuthorityIndex,
) -> Option<FlatLevel> {
    let type_code = detail.get(&format!("{prefix}_TYPE_CODE"));
    let number_prefix = detail.get(&format!("{prefix}_NUMBER_PREFIX"));
    let number = parse_number(pid, detail, &format!("{prefix}_NUMBER"));
    let suffix = detail.get(&format!("{prefix}_NUMBER_SUFFIX"));

    if type_code.is_none() && number_prefix.is_none() && number.is_none() && suffix.is_none() {
        return None;
    }

    Some(FlatLevel {
        type_name: resolve(authority, table, type_code),
        prefix: number_prefix.map(str::to_string),
        number: number.map(i64::from),
        suffix: suffix.map(str::to_string),
    })
}

fn map_number(pid: &str, detail: &Row) -> Option<NumberRange> {
    let first = NumberPart {
        prefix: detail.get("NUMBER_FIRST_PREFIX").map(str::to_string),
        number: parse_number(pid, detail, "NUMBER_FIRST").map(i64::from),
        suffix: detail.get("NUMBER_FIRST_SUFFIX").map(str::to_string),
    };
    let last = NumberPart {
        prefix: detail.get("NUMBER_LAST_PREFIX").map(str::to_string),
        number: parse_number(pid, detail, "NUMBER_LAST").map(i64::from),
        suffix: detail.get("NUMBER_LAST_SUFFIX").map(str::to_string),
    };

    if first.is_empty() && last.is_empty() {
        return None;
    }

    Some(NumberRange {
        first,
        last: (!last.is_empty()).then_some(last),
    })
}

/// Parses an integer column leniently: an unparseable value logs a
/// diagnostic and maps to `None`.
fn parse_number(pid: &str, detail: &Row, column: &str) -> Option<i32> {
    let raw = detail.get(column)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("{pid}: unparseable {column}={raw:?}");
            None
        }
    }
}

/// Maps the geo bundle, rejecting it whole on any record the mapper
/// cannot interpret.
///
/// Exactly one entry carries `is_default = true`: the first site-level
/// geocode when any exist (site-level takes precedence), otherwise the
/// first default-level geocode. The overall level is the finest rank
/// reported across both record sets.
fn map_geo(
    pid: &str,
    detail: &Row,
    joined: &JoinedRecords<'_>,
    authority: &AuthorityIndex,
) -> Result<Option<Geo>, MapError> {
    if joined.site_geocodes.is_empty() && joined.default_geocodes.is_empty() {
        return Ok(None);
    }

    let mut geocodes =
        Vec::with_capacity(joined.site_geocodes.len() + joined.default_geocodes.len());

    let site_present = !joined.site_geocodes.is_empty();
    for (i, record) in joined.site_geocodes.iter().enumerate() {
        geocodes.push(map_geocode(pid, record, i == 0, authority)?);
    }

    let mut default_seen = false;
    for record in joined.default_geocodes {
        if default_seen {
            log::warn!("{pid}: multiple default geocode rows");
        }
        let is_default = !site_present && !default_seen;
        default_seen = true;
        geocodes.push(map_geocode(pid, record, is_default, authority)?);
    }

    let level = resolve(
        authority,
        AuthorityTable::GeocodedLevelType,
        finest_level_code(detail, joined),
    );

    Ok(Some(Geo { level, geocodes }))
}

/// The finest (highest rank 1–7) geocoded level reported across the
/// site and default record sets; the detail row's column is only a
/// fallback when no record reports one.
fn finest_level_code<'a>(detail: &'a Row, joined: &JoinedRecords<'a>) -> Option<&'a str> {
    joined
        .site_geocodes
        .iter()
        .chain(joined.default_geocodes.iter())
        .filter_map(|record| {
            let code = record.level_code.as_deref()?;
            code.parse::<u8>().ok().map(|rank| (rank, code))
        })
        .max_by_key(|(rank, _)| *rank)
        .map(|(_, code)| code)
        .or_else(|| detail.get("LEVEL_GEOCODED_CODE"))
}

fn map_geocode(
    pid: &str,
    record: &GeocodeRecord,
    is_default: bool,
    authority: &AuthorityIndex,
) -> Result<Geocode, MapError> {
    if let Some(column) = &record.unknown_attribute {
        return Err(MapError::UnknownGeocodeAttribute {
            pid: pid.to_string(),
            column: column.clone(),
        });
    }

    let (Some(latitude), Some(longitude)) = (record.latitude, record.longitude) else {
        return Err(MapError::InvalidGeocode {
            pid: pid.to_string(),
        });
    };

    Ok(Geocode {
        latitude,
        longitude,
        is_default,
        reliability: resolve(
            authority,
            AuthorityTable::GeocodeReliability,
            record.reliability_code.as_deref(),
        ),
        type_name: resolve(
            authority,
            AuthorityTable::GeocodeType,
            record.type_code.as_deref(),
        ),
    })
}

/// The canonical long parts, in rendering order: level, building,
/// flat, lot-or-number with street, locality with state and postcode.
/// Empty parts are omitted along with their separators.
fn render_long_parts(s: &StructuredAddress) -> Vec<String> {
    let mut parts = Vec::with_capacity(5);

    if let Some(level) = &s.level {
        parts.push(flat_level_part(level, "LEVEL"));
    }
    if let Some(building) = &s.building_name {
        parts.push(building.to_uppercase());
    }
    if let Some(flat) = &s.flat {
        parts.push(flat_level_part(flat, "UNIT"));
    }
    parts.push(street_part(s));
    parts.push(locality_part(s));

    parts.retain(|part| !part.is_empty());
    parts
}

/// The compact single-line parts: `unit/number street` then
/// `locality state postcode`. The unit prefix is the flat number when
/// present, otherwise the level number.
fn render_ssla_parts(s: &StructuredAddress) -> Vec<String> {
    let mut parts = vec![short_street_part(s), locality_part(s)];
    parts.retain(|part| !part.is_empty());
    parts
}

/// The short multi-line parts: the same groups as the long rendering
/// with the level, flat and number collapsed into the compact street
/// line. The building name keeps its own line.
fn render_short_parts(s: &StructuredAddress) -> Vec<String> {
    let mut parts = Vec::with_capacity(3);
    if let Some(building) = &s.building_name {
        parts.push(building.to_uppercase());
    }
    parts.push(short_street_part(s));
    parts.push(locality_part(s));
    parts.retain(|part| !part.is_empty());
    parts
}

/// The compact street line shared by `ssla` and the short multi-line
/// rendering (`{unit}/{number} STREET TYPE [SUFFIX]`).
fn short_street_part(s: &StructuredAddress) -> String {
    let unit = s
        .flat
        .as_ref()
        .map(FlatLevel::number_string)
        .filter(|u| !u.is_empty())
        .or_else(|| {
            s.level
                .as_ref()
                .map(FlatLevel::number_string)
                .filter(|u| !u.is_empty())
        });

    let number = number_or_lot(s);
    let head = match (unit, number) {
        (Some(unit), Some(number)) => format!("{unit}/{number}"),
        (Some(unit), None) => unit,
        (None, Some(number)) => number,
        (None, None) => String::new(),
    };

    join_nonempty(&[
        head.as_str(),
        s.street.name.as_str(),
        s.street.type_name.as_ref().map_or("", CodeName::display),
        s.street.suffix.as_ref().map_or("", CodeName::display),
    ])
    .to_uppercase()
}

fn flat_level_part(value: &FlatLevel, fallback_label: &str) -> String {
    let label = value
        .type_name
        .as_ref()
        .map_or(fallback_label, CodeName::display);
    join_nonempty(&[label, value.number_string().as_str()]).to_uppercase()
}

fn street_part(s: &StructuredAddress) -> String {
    let number = number_or_lot(s).unwrap_or_default();
    join_nonempty(&[
        number.as_str(),
        s.street.name.as_str(),
        s.street.type_name.as_ref().map_or("", CodeName::display),
        s.street.suffix.as_ref().map_or("", CodeName::display),
    ])
    .to_uppercase()
}

/// The street number rendering: the number range when present, else
/// the lot (`LOT 2`), else nothing.
fn number_or_lot(s: &StructuredAddress) -> Option<String> {
    if let Some(number) = &s.number {
        let compact = number.to_compact();
        if !compact.is_empty() {
            return Some(compact);
        }
    }
    s.lot.as_ref().map(|lot| format!("LOT {}", lot.to_compact()))
}

fn locality_part(s: &StructuredAddress) -> String {
    join_nonempty(&[
        s.locality.name.as_str(),
        s.state.as_str(),
        s.postcode.as_str(),
    ])
    .to_uppercase()
}

fn join_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .copied()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::AuthorityIndex;

    fn fixture_authority() -> AuthorityIndex {
        use std::sync::atomic::{AtomicU32, Ordering};
        static FIXTURE_SEQ: AtomicU32 = AtomicU32::new(0);

        let dir = std::env::temp_dir().join("addresskit_mapper_tests").join(format!(
            "authority_{}_{}",
            std::process::id(),
            FIXTURE_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let tables: &[(&str, &[(&str, &str)])] = &[
            (
                "Authority_Code_STREET_TYPE_AUT_psv.psv",
                &[("AVENUE", "AV"), ("STREET", "ST"), ("ROAD", "RD")],
            ),
            (
                "Authority_Code_LEVEL_TYPE_AUT_psv.psv",
                &[("L", "LEVEL"), ("B", "BASEMENT")],
            ),
            (
                "Authority_Code_FLAT_TYPE_AUT_psv.psv",
                &[("UNIT", "UNIT"), ("APT", "APARTMENT")],
            ),
            (
                "Authority_Code_STREET_SUFFIX_AUT_psv.psv",
                &[("N", "NORTH"), ("CN", "CENTRAL")],
            ),
            (
                "Authority_Code_LOCALITY_CLASS_AUT_psv.psv",
                &[("G", "GAZETTED LOCALITY")],
            ),
            (
                "Authority_Code_GEOCODE_RELIABILITY_AUT_psv.psv",
                &[("2", "WITHIN ADDRESS SITE BOUNDARY OR ACCESS POINT")],
            ),
            (
                "Authority_Code_GEOCODE_TYPE_AUT_psv.psv",
                &[("PC", "PROPERTY CENTROID"), ("FC", "FRONTAGE CENTRE")],
            ),
            (
                "Authority_Code_GEOCODED_LEVEL_TYPE_AUT_psv.psv",
                &[("7", "PROPERTY LEVEL"), ("3", "STREET LEVEL")],
            ),
        ];
        for (file, rows) in tables {
            let mut contents = String::from("CODE|NAME|DESCRIPTION\n");
            for (code, name) in *rows {
                contents.push_str(&format!("{code}|{name}|{name}\n"));
            }
            std::fs::write(dir.join(file), contents).unwrap();
        }

        let index = AuthorityIndex::load(&dir).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
        index
    }

    fn barangaroo_row() -> Row {
        Row::from_pairs(&[
            ("ADDRESS_DETAIL_PID", "GANSW716635811"),
            ("BUILDING_NAME", "Tower 3"),
            ("LEVEL_TYPE_CODE", "L"),
            ("LEVEL_NUMBER", "25"),
            ("NUMBER_FIRST", "300"),
            ("POSTCODE", "2000"),
            ("CONFIDENCE", "2"),
            ("LEVEL_GEOCODED_CODE", "7"),
        ])
    }

    fn barangaroo_street() -> StreetRecord {
        StreetRecord {
            name: "BARANGAROO".to_string(),
            type_code: Some("AVENUE".to_string()),
            suffix_code: None,
            class_code: None,
        }
    }

    fn barangaroo_locality() -> LocalityRecord {
        LocalityRecord {
            name: "BARANGAROO".to_string(),
            class_code: Some("G".to_string()),
        }
    }

    #[test]
    fn renders_the_canonical_barangaroo_address() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            ..JoinedRecords::default()
        };

        let detail =
            map_address(Region::Nsw, &barangaroo_row(), &joined, &authority, true).unwrap();

        assert_eq!(detail.pid, "GANSW716635811");
        assert_eq!(
            detail.sla,
            "LEVEL 25, TOWER 3, 300 BARANGAROO AV, BARANGAROO NSW 2000"
        );
        assert_eq!(detail.ssla, "25/300 BARANGAROO AV, BARANGAROO NSW 2000");
        assert_eq!(
            detail.mla,
            vec![
                "LEVEL 25",
                "TOWER 3",
                "300 BARANGAROO AV",
                "BARANGAROO NSW 2000"
            ]
        );
        assert_eq!(detail.confidence, Some(2));
        assert_eq!(detail.document_id(), "/addresses/GANSW716635811");
        assert!(detail.geo.is_none());
    }

    #[test]
    fn mapping_is_deterministic() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            ..JoinedRecords::default()
        };

        let first =
            map_address(Region::Nsw, &barangaroo_row(), &joined, &authority, true).unwrap();
        let second =
            map_address(Region::Nsw, &barangaroo_row(), &joined, &authority, true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_street_type_renders_the_raw_code() {
        let authority = fixture_authority();
        let street = StreetRecord {
            name: "MAIN".to_string(),
            type_code: Some("XYZ".to_string()),
            suffix_code: None,
            class_code: None,
        };
        let locality = barangaroo_locality();
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            ..JoinedRecords::default()
        };
        let row = Row::from_pairs(&[
            ("ADDRESS_DETAIL_PID", "GANSW1"),
            ("NUMBER_FIRST", "12"),
            ("POSTCODE", "2000"),
        ]);

        let detail = map_address(Region::Nsw, &row, &joined, &authority, true).unwrap();
        assert_eq!(detail.sla, "12 MAIN XYZ, BARANGAROO NSW 2000");
        assert_eq!(
            detail.structured.street.type_name,
            Some(CodeName {
                code: "XYZ".to_string(),
                name: None
            })
        );
    }

    #[test]
    fn five_parts_exceed_the_line_budget() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            ..JoinedRecords::default()
        };
        // Level + building + flat + street + locality = five lines.
        let row = Row::from_pairs(&[
            ("ADDRESS_DETAIL_PID", "GANSW2"),
            ("BUILDING_NAME", "Tower 3"),
            ("LEVEL_TYPE_CODE", "L"),
            ("LEVEL_NUMBER", "25"),
            ("FLAT_TYPE_CODE", "UNIT"),
            ("FLAT_NUMBER", "4"),
            ("NUMBER_FIRST", "300"),
            ("POSTCODE", "2000"),
        ]);

        let error = map_address(Region::Nsw, &row, &joined, &authority, true).unwrap_err();
        assert!(matches!(
            error,
            MapError::TooManyLines { lines: 5, .. }
        ));
    }

    #[test]
    fn flat_takes_the_short_unit_slot_over_level() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            ..JoinedRecords::default()
        };
        let row = Row::from_pairs(&[
            ("ADDRESS_DETAIL_PID", "GANSW3"),
            ("FLAT_TYPE_CODE", "UNIT"),
            ("FLAT_NUMBER", "7"),
            ("NUMBER_FIRST", "19"),
            ("POSTCODE", "2000"),
        ]);

        let detail = map_address(Region::Nsw, &row, &joined, &authority, true).unwrap();
        assert_eq!(detail.sla, "UNIT 7, 19 BARANGAROO AV, BARANGAROO NSW 2000");
        assert_eq!(detail.ssla, "7/19 BARANGAROO AV, BARANGAROO NSW 2000");
    }

    #[test]
    fn smla_keeps_the_building_name_that_ssla_drops() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            ..JoinedRecords::default()
        };

        let detail =
            map_address(Region::Nsw, &barangaroo_row(), &joined, &authority, true).unwrap();

        assert_eq!(detail.ssla, "25/300 BARANGAROO AV, BARANGAROO NSW 2000");
        assert_eq!(
            detail.smla,
            vec!["TOWER 3", "25/300 BARANGAROO AV", "BARANGAROO NSW 2000"]
        );
        assert!(detail.smla.len() <= MAX_MLA_LINES);
    }

    #[test]
    fn number_range_and_suffix_render_compactly() {
        let authority = fixture_authority();
        let street = StreetRecord {
            name: "EDGECLIFF".to_string(),
            type_code: Some("ROAD".to_string()),
            suffix_code: Some("N".to_string()),
            class_code: None,
        };
        let locality = LocalityRecord {
            name: "WOOLLAHRA".to_string(),
            class_code: None,
        };
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            ..JoinedRecords::default()
        };
        let row = Row::from_pairs(&[
            ("ADDRESS_DETAIL_PID", "GANSW4"),
            ("NUMBER_FIRST", "2"),
            ("NUMBER_LAST", "6"),
            ("NUMBER_LAST_SUFFIX", "A"),
            ("POSTCODE", "2025"),
        ]);

        let detail = map_address(Region::Nsw, &row, &joined, &authority, true).unwrap();
        assert_eq!(detail.sla, "2-6A EDGECLIFF RD NORTH, WOOLLAHRA NSW 2025");
    }

    #[test]
    fn lot_renders_when_no_street_number() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            ..JoinedRecords::default()
        };
        let row = Row::from_pairs(&[
            ("ADDRESS_DETAIL_PID", "GANSW5"),
            ("LOT_NUMBER", "2"),
            ("POSTCODE", "2000"),
        ]);

        let detail = map_address(Region::Nsw, &row, &joined, &authority, true).unwrap();
        assert_eq!(detail.sla, "LOT 2 BARANGAROO AV, BARANGAROO NSW 2000");
        assert_eq!(detail.structured.lot.as_ref().unwrap().number.as_deref(), Some("2"));
    }

    #[test]
    fn site_geocode_precedes_and_takes_the_default_flag() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let site = vec![GeocodeRecord {
            latitude: Some(-33.8617),
            longitude: Some(151.2018),
            reliability_code: Some("2".to_string()),
            type_code: Some("PC".to_string()),
            level_code: None,
            unknown_attribute: None,
        }];
        let default = vec![GeocodeRecord {
            latitude: Some(-33.8618),
            longitude: Some(151.2019),
            reliability_code: None,
            type_code: Some("FC".to_string()),
            level_code: None,
            unknown_attribute: None,
        }];
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            site_geocodes: &site,
            default_geocodes: &default,
        };

        let detail =
            map_address(Region::Nsw, &barangaroo_row(), &joined, &authority, true).unwrap();
        let geo = detail.geo.unwrap();

        // Site entries come first and win the default flag.
        assert_eq!(geo.geocodes.len(), 2);
        assert!(geo.geocodes[0].is_default);
        assert!(!geo.geocodes[1].is_default);
        assert_eq!(geo.geocodes.iter().filter(|g| g.is_default).count(), 1);
        assert_eq!(
            geo.geocodes[0].type_name.as_ref().unwrap().display(),
            "PROPERTY CENTROID"
        );
        assert_eq!(geo.level.as_ref().unwrap().display(), "PROPERTY LEVEL");
    }

    #[test]
    fn lone_default_geocode_keeps_the_default_flag() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let default = vec![GeocodeRecord {
            latitude: Some(-33.8618),
            longitude: Some(151.2019),
            reliability_code: None,
            type_code: Some("FC".to_string()),
            level_code: None,
            unknown_attribute: None,
        }];
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            site_geocodes: &[],
            default_geocodes: &default,
        };

        let detail =
            map_address(Region::Nsw, &barangaroo_row(), &joined, &authority, true).unwrap();
        let geo = detail.geo.unwrap();

        assert_eq!(geo.geocodes.len(), 1);
        assert!(geo.geocodes[0].is_default);
    }

    #[test]
    fn geo_level_is_the_finest_rank_across_both_sets() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let site = vec![GeocodeRecord {
            latitude: Some(-33.8617),
            longitude: Some(151.2018),
            reliability_code: None,
            type_code: Some("PC".to_string()),
            level_code: Some("3".to_string()),
            unknown_attribute: None,
        }];
        let default = vec![GeocodeRecord {
            latitude: Some(-33.8618),
            longitude: Some(151.2019),
            reliability_code: None,
            type_code: Some("FC".to_string()),
            level_code: Some("7".to_string()),
            unknown_attribute: None,
        }];
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            site_geocodes: &site,
            default_geocodes: &default,
        };

        // The detail row claims street level; the finest rank among
        // the records (7) wins.
        let row = Row::from_pairs(&[
            ("ADDRESS_DETAIL_PID", "GANSW6"),
            ("NUMBER_FIRST", "300"),
            ("POSTCODE", "2000"),
            ("LEVEL_GEOCODED_CODE", "3"),
        ]);
        let detail = map_address(Region::Nsw, &row, &joined, &authority, true).unwrap();
        assert_eq!(
            detail.geo.unwrap().level.as_ref().unwrap().display(),
            "PROPERTY LEVEL"
        );

        // Records reporting only the coarser level override the column
        // in the other direction too.
        let coarse_site = vec![GeocodeRecord {
            level_code: Some("3".to_string()),
            ..site[0].clone()
        }];
        let coarse_joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            site_geocodes: &coarse_site,
            default_geocodes: &[],
        };
        let row = Row::from_pairs(&[
            ("ADDRESS_DETAIL_PID", "GANSW7"),
            ("NUMBER_FIRST", "300"),
            ("POSTCODE", "2000"),
            ("LEVEL_GEOCODED_CODE", "7"),
        ]);
        let detail = map_address(Region::Nsw, &row, &coarse_joined, &authority, true).unwrap();
        assert_eq!(
            detail.geo.unwrap().level.as_ref().unwrap().display(),
            "STREET LEVEL"
        );

        // With no record reporting a level, the detail column is the
        // fallback.
        let unlevelled = vec![GeocodeRecord {
            level_code: None,
            ..site[0].clone()
        }];
        let fallback_joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            site_geocodes: &unlevelled,
            default_geocodes: &[],
        };
        let detail =
            map_address(Region::Nsw, &barangaroo_row(), &fallback_joined, &authority, true)
                .unwrap();
        assert_eq!(
            detail.geo.unwrap().level.as_ref().unwrap().display(),
            "PROPERTY LEVEL"
        );
    }

    #[test]
    fn unknown_geocode_attribute_rejects_the_bundle() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let site = vec![GeocodeRecord {
            latitude: Some(-33.8617),
            longitude: Some(151.2018),
            reliability_code: None,
            type_code: None,
            level_code: None,
            unknown_attribute: Some("SPHEROID_AXIS".to_string()),
        }];
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            site_geocodes: &site,
            default_geocodes: &[],
        };

        let error =
            map_address(Region::Nsw, &barangaroo_row(), &joined, &authority, true).unwrap_err();
        assert!(matches!(
            error,
            MapError::UnknownGeocodeAttribute { ref column, .. } if column == "SPHEROID_AXIS"
        ));
    }

    #[test]
    fn unparseable_coordinates_reject_the_bundle() {
        let row = Row::from_pairs(&[
            ("ADDRESS_SITE_GEOCODE_PID", "GASG1"),
            ("GEOCODE_TYPE_CODE", "PC"),
            ("LATITUDE", "not-a-number"),
            ("LONGITUDE", "151.2018"),
        ]);
        let record = GeocodeRecord::from_site_row(&row);
        assert!(record.latitude.is_none());

        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        let site = vec![record];
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            site_geocodes: &site,
            default_geocodes: &[],
        };

        let error =
            map_address(Region::Nsw, &barangaroo_row(), &joined, &authority, true).unwrap_err();
        assert!(matches!(error, MapError::InvalidGeocode { .. }));
    }

    #[test]
    fn geo_disabled_omits_the_bundle_entirely() {
        let authority = fixture_authority();
        let street = barangaroo_street();
        let locality = barangaroo_locality();
        // A poisoned record must not even be inspected when geo is off.
        let site = vec![GeocodeRecord {
            latitude: None,
            longitude: None,
            reliability_code: None,
            type_code: None,
            level_code: None,
            unknown_attribute: Some("SPHEROID_AXIS".to_string()),
        }];
        let joined = JoinedRecords {
            locality: Some(&locality),
            street: Some(&street),
            site_geocodes: &site,
            default_geocodes: &[],
        };

        let detail =
            map_address(Region::Nsw, &barangaroo_row(), &joined, &authority, false).unwrap();
        assert!(detail.geo.is_none());
    }

    #[test]
    fn missing_pid_is_structural() {
        let authority = fixture_authority();
        let row = Row::from_pairs(&[("POSTCODE", "2000")]);
        let error = map_address(
            Region::Nsw,
            &row,
            &JoinedRecords::default(),
            &authority,
            true,
        )
        .unwrap_err();
        assert!(matches!(error, MapError::MissingPid));
    }
}
