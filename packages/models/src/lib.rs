#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for the AddressKit G-NAF pipeline.
//!
//! This crate contains only data types and simple conversions. It has no
//! heavyweight dependencies (no Tantivy, no I/O).

use serde::{Deserialize, Serialize};

/// The nine administrative regions covered by G-NAF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// Australian Capital Territory.
    Act,
    /// New South Wales.
    Nsw,
    /// Northern Territory.
    Nt,
    /// Other Territories.
    Ot,
    /// Queensland.
    Qld,
    /// South Australia.
    Sa,
    /// Tasmania.
    Tas,
    /// Victoria.
    Vic,
    /// Western Australia.
    Wa,
}

impl Region {
    /// All nine regions, in the order they are loaded.
    pub const ALL: &[Self] = &[
        Self::Act,
        Self::Nsw,
        Self::Nt,
        Self::Ot,
        Self::Qld,
        Self::Sa,
        Self::Tas,
        Self::Vic,
        Self::Wa,
    ];

    /// The region code as it appears in G-NAF file names (e.g. `NSW`).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Act => "ACT",
            Self::Nsw => "NSW",
            Self::Nt => "NT",
            Self::Ot => "OT",
            Self::Qld => "QLD",
            Self::Sa => "SA",
            Self::Tas => "TAS",
            Self::Vic => "VIC",
            Self::Wa => "WA",
        }
    }

    /// Parses a region code, case-insensitively.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "ACT" => Some(Self::Act),
            "NSW" => Some(Self::Nsw),
            "NT" => Some(Self::Nt),
            "OT" => Some(Self::Ot),
            "QLD" => Some(Self::Qld),
            "SA" => Some(Self::Sa),
            "TAS" => Some(Self::Tas),
            "VIC" => Some(Self::Vic),
            "WA" => Some(Self::Wa),
            _ => None,
        }
    }
}

/// Resolves the covered region set from a comma-separated filter string.
///
/// An empty filter means full coverage. Any invalid entry collapses the
/// filter back to full coverage — a misconfigured filter must never
/// silently shrink the corpus.
#[must_use]
pub fn covered_regions(filter: &str) -> Vec<Region> {
    let entries: Vec<&str> = filter
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if entries.is_empty() {
        return Region::ALL.to_vec();
    }

    let mut covered = Vec::with_capacity(entries.len());
    for entry in entries {
        match Region::parse(entry) {
            Some(region) => covered.push(region),
            None => return Region::ALL.to_vec(),
        }
    }

    covered
}

/// The canonical backend document id for an address.
#[must_use]
pub fn document_id(pid: &str) -> String {
    format!("/addresses/{pid}")
}

/// An authority code together with its resolved human-readable name.
///
/// When the code is missing from the authority table the name is absent
/// and renderers fall back to the raw code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeName {
    /// The raw authority code as it appears on the row.
    pub code: String,
    /// The resolved name, when the authority table defines the code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CodeName {
    /// The rendering form: the resolved name, or the raw code when the
    /// authority table did not define it.
    #[must_use]
    pub fn display(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.code)
    }
}

/// A flat or level component of a structured address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatLevel {
    /// Type code and resolved name (e.g. `L` / `LEVEL`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<CodeName>,
    /// Number prefix (e.g. `A` in `A25`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// The number itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
    /// Number suffix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl FlatLevel {
    /// Renders the number with its prefix and suffix, no type name.
    #[must_use]
    pub fn number_string(&self) -> String {
        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push_str(prefix);
        }
        if let Some(number) = self.number {
            out.push_str(&number.to_string());
        }
        if let Some(suffix) = &self.suffix {
            out.push_str(suffix);
        }
        out
    }
}

/// One half of a street number range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberPart {
    /// Number prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// The number itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
    /// Number suffix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl NumberPart {
    /// Returns `true` when no component is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.number.is_none() && self.suffix.is_none()
    }

    /// Renders the part as a compact string (e.g. `A300B`).
    #[must_use]
    pub fn to_compact(&self) -> String {
        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push_str(prefix);
        }
        if let Some(number) = self.number {
            out.push_str(&number.to_string());
        }
        if let Some(suffix) = &self.suffix {
            out.push_str(suffix);
        }
        out
    }
}

/// A street number, possibly a `first-last` range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberRange {
    /// The first (or only) number.
    pub first: NumberPart,
    /// The last number, for ranged addresses (e.g. `2-6`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<NumberPart>,
}

impl NumberRange {
    /// Renders the range as a compact string (`300` or `2-6`).
    #[must_use]
    pub fn to_compact(&self) -> String {
        let mut out = self.first.to_compact();
        if let Some(last) = &self.last {
            let last = last.to_compact();
            if !last.is_empty() {
                out.push('-');
                out.push_str(&last);
            }
        }
        out
    }
}

/// The street component of a structured address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Street {
    /// Street name (e.g. `BARANGAROO`).
    pub name: String,
    /// Street type code and resolved name (e.g. `AVENUE` / `AV`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<CodeName>,
    /// Street suffix code and resolved name (e.g. `N` / `NORTH`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<CodeName>,
    /// Street class code and resolved name.
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<CodeName>,
}

/// The locality component of a structured address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    /// Locality name (e.g. `BARANGAROO`).
    pub name: String,
    /// Locality class code and resolved name.
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<CodeName>,
}

/// The lot component, used when an address has no street number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Lot number prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Lot number. G-NAF lot numbers are free text (e.g. `CP`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    /// Lot number suffix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl Lot {
    /// Returns `true` when no component is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.number.is_none() && self.suffix.is_none()
    }

    /// Renders the lot as a compact string.
    #[must_use]
    pub fn to_compact(&self) -> String {
        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push_str(prefix);
        }
        if let Some(number) = &self.number {
            out.push_str(number);
        }
        if let Some(suffix) = &self.suffix {
            out.push_str(suffix);
        }
        out
    }
}

/// The fully structured form of a G-NAF address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredAddress {
    /// Building or property name (e.g. `TOWER 3`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_name: Option<String>,
    /// Lot, when the address is lot-addressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot: Option<Lot>,
    /// Flat/unit component.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat: Option<FlatLevel>,
    /// Level/floor component.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<FlatLevel>,
    /// Street number (possibly a range).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<NumberRange>,
    /// Street.
    pub street: Street,
    /// Locality.
    pub locality: Locality,
    /// Region code (e.g. `NSW`).
    pub state: String,
    /// Postcode.
    pub postcode: String,
    /// G-NAF confidence, `-1..=2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i32>,
}

/// A single geocode point attached to an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geocode {
    /// Latitude (GDA2020/GDA94).
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// `true` for the single default geocode of the address.
    pub is_default: bool,
    /// Reliability code and resolved name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reliability: Option<CodeName>,
    /// Geocode type code and resolved name.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<CodeName>,
}

/// The geocode bundle of an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geo {
    /// The finest geocoded level reported for this address
    /// (rank 1–7, coarse to fine).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<CodeName>,
    /// Geocode points, site-level entries before default entries.
    pub geocodes: Vec<Geocode>,
}

/// The document produced per address and owned by the search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressDetail {
    /// G-NAF persistent identifier (e.g. `GANSW716635811`).
    pub pid: String,
    /// The structured form.
    pub structured: StructuredAddress,
    /// Single-line address.
    pub sla: String,
    /// Short single-line address.
    pub ssla: String,
    /// Multi-line address, always 1–4 lines.
    pub mla: Vec<String>,
    /// Short multi-line address, within the same line budget: the
    /// building name on its own line, then the compact
    /// `unit/number street` line, then the locality line.
    pub smla: Vec<String>,
    /// Confidence duplicated at the top level for sorting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i32>,
    /// Geocode bundle, absent when geocoding is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<Geo>,
}

impl AddressDetail {
    /// The canonical backend document id for this address.
    #[must_use]
    pub fn document_id(&self) -> String {
        document_id(&self.pid)
    }
}

/// A ranked autocomplete suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// G-NAF persistent identifier.
    pub pid: String,
    /// Single-line address.
    pub sla: String,
    /// Backend relevance score.
    pub score: f32,
}

/// One page of ranked suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// The hits on this page, best first.
    pub hits: Vec<SearchHit>,
    /// Total matching documents across all pages.
    pub total: u64,
}

/// A `CODE, NAME` pair for the backend's synonym-expansion analyser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SynonymPair {
    /// The authority code (e.g. `AVENUE`).
    pub code: String,
    /// The resolved name (e.g. `AV`).
    pub name: String,
}
