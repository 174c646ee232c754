#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! G-NAF ingestion pipeline and address-structuring engine.
//!
//! Turns a quarterly G-NAF release — a multi-gigabyte zip of
//! pipe-separated files — into structured, geocoded address documents
//! in the search backend.
//!
//! # Architecture
//!
//! - [`extract`] unpacks the archive with per-entry skip logic and
//!   atomic publication.
//! - [`authority`] loads the nine authority-code tables into
//!   constant-time code → name maps and derives the synonym list.
//! - [`psv`] streams the constituent files in bounded chunks with
//!   backpressure against the indexing sink.
//! - [`mapper`] transforms raw rows plus joined satellites into
//!   [`addresskit_models::AddressDetail`] documents with their
//!   single-line, short and multi-line renderings.
//! - [`loader`] sequences the whole run per covered region.
//!
//! Every returned address is an authoritative G-NAF record: the
//! pipeline canonicalises, it never parses free text.

pub mod authority;
pub mod config;
pub mod counts;
pub mod extract;
pub mod layout;
pub mod loader;
pub mod mapper;
pub mod psv;

pub use config::Config;
pub use loader::{load_extracted, load_gnaf, LoadContext, LoadError, LoadSummary};
