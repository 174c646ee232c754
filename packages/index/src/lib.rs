#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Search backend abstraction for AddressKit.
//!
//! The ingestion pipeline and the query path both talk to an inverted
//! index through the [`SearchBackend`] trait; the shipped implementation
//! is an in-process Tantivy index ([`backend::TantivyBackend`]). The
//! handle is injected explicitly wherever it is needed — there is no
//! process-wide backend global.
//!
//! - **Index time**: [`bulk::BulkSink`] buffers mapped address documents
//!   and submits them in deterministic-id batches, retrying failed
//!   batches with linear-growth capped backoff.
//! - **Query time**: [`query`] builds the typo-tolerant typeahead query
//!   over the `sla`/`ssla` fields and ranks the results.

pub mod backend;
pub mod bulk;
pub mod query;
pub mod schema;

use addresskit_models::{AddressDetail, SearchPage, SynonymPair};
use async_trait::async_trait;

/// Errors from search backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Tantivy error.
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Stored document payload could not be decoded.
    #[error("document decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// I/O error on the index directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Async task join error.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The backend is unavailable (e.g. index missing or unreachable).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// One document submission in a bulk batch.
#[derive(Debug, Clone)]
pub struct BulkOp {
    /// Backend document id (`/addresses/{pid}`).
    pub id: String,
    /// The document body.
    pub document: AddressDetail,
}

impl BulkOp {
    /// Builds the op for a mapped address, deriving the canonical id.
    #[must_use]
    pub fn index(document: AddressDetail) -> Self {
        Self {
            id: document.document_id(),
            document,
        }
    }
}

/// Per-item result of a bulk submission.
#[derive(Debug, Clone)]
pub struct BulkItemResult {
    /// Backend document id.
    pub id: String,
    /// Error message, when this item failed.
    pub error: Option<String>,
}

/// Outcome of a bulk submission that reached the backend.
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    /// `true` when any item failed.
    pub errors: bool,
    /// Per-item results in submission order.
    pub items: Vec<BulkItemResult>,
}

/// The inverted-index backend seam.
///
/// Document ids are deterministic (`/addresses/{pid}`), so every write
/// is an idempotent upsert and a re-run of ingestion converges on the
/// same document set.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Creates (or resets) the index, installing the synonym pairs for
    /// the backend's synonym-expansion analyser.
    async fn create_index(&self, synonyms: &[SynonymPair]) -> Result<(), BackendError>;

    /// Drops all documents and synonyms.
    async fn drop_index(&self) -> Result<(), BackendError>;

    /// Submits one batch of upserts. Within the batch, documents are
    /// applied in submission order.
    async fn bulk(&self, ops: &[BulkOp], refresh: bool) -> Result<BulkOutcome, BackendError>;

    /// Fetches one document by its canonical id.
    async fn get(&self, id: &str) -> Result<Option<AddressDetail>, BackendError>;

    /// Runs the autocomplete query. `page` is 1-indexed.
    async fn search(&self, q: &str, page: u32, page_size: u32)
        -> Result<SearchPage, BackendError>;

    /// Makes all committed writes visible to readers.
    async fn refresh(&self) -> Result<(), BackendError>;
}
