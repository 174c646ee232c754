//! Tantivy index schema for address documents.
//!
//! Two tokenized rendering fields (`sla`, `ssla`) carry the search
//! surface; the full document body is stored as JSON and never
//! re-derived from index fields.

use tantivy::schema::{
    self, Field, NumericOptions, STORED, STRING, Schema, TextFieldIndexing, TextOptions,
};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::Index;

/// Names of all fields in the address schema.
pub struct FieldNames;

impl FieldNames {
    /// Canonical document id (`/addresses/{pid}`), exact match.
    pub const ID: &'static str = "id";
    /// Single-line address, tokenized with positions.
    pub const SLA: &'static str = "sla";
    /// Short single-line address, tokenized with positions.
    pub const SSLA: &'static str = "ssla";
    /// G-NAF confidence, used as a ranking tie-break.
    pub const CONFIDENCE: &'static str = "confidence";
    /// Stored JSON payload of the full document.
    pub const BODY: &'static str = "body";
}

/// All resolved field handles for efficient document construction.
#[derive(Debug, Clone)]
pub struct AddressFields {
    /// Canonical document id.
    pub id: Field,
    /// Single-line address.
    pub sla: Field,
    /// Short single-line address.
    pub ssla: Field,
    /// Confidence tie-break value.
    pub confidence: Field,
    /// Stored JSON payload.
    pub body: Field,
}

impl AddressFields {
    /// Resolves field handles from a schema.
    ///
    /// # Panics
    ///
    /// Panics if the schema does not contain the expected fields
    /// (should only happen if the schema was not built by
    /// [`build_schema`]).
    #[must_use]
    pub fn from_schema(schema: &Schema) -> Self {
        Self {
            id: schema
                .get_field(FieldNames::ID)
                .expect("schema missing id field"),
            sla: schema
                .get_field(FieldNames::SLA)
                .expect("schema missing sla field"),
            ssla: schema
                .get_field(FieldNames::SSLA)
                .expect("schema missing ssla field"),
            confidence: schema
                .get_field(FieldNames::CONFIDENCE)
                .expect("schema missing confidence field"),
            body: schema
                .get_field(FieldNames::BODY)
                .expect("schema missing body field"),
        }
    }
}

/// Builds the Tantivy schema for the address index.
///
/// Fields:
/// - `id` — STRING (exact match + stored): canonical document id
/// - `sla` — TEXT (tokenized + stored, positions): single-line address
/// - `ssla` — TEXT (tokenized + stored, positions): short single-line
/// - `confidence` — i64 (stored): ranking tie-break
/// - `body` — TEXT (stored only): JSON payload of the full document
#[must_use]
pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer("default")
        .set_index_option(schema::IndexRecordOption::WithFreqsAndPositions);

    let text_stored = TextOptions::default()
        .set_indexing_options(text_field_indexing)
        .set_stored();

    builder.add_text_field(FieldNames::ID, STRING | STORED);
    builder.add_text_field(FieldNames::SLA, text_stored.clone());
    builder.add_text_field(FieldNames::SSLA, text_stored);

    builder.add_i64_field(FieldNames::CONFIDENCE, NumericOptions::default().set_stored());

    // Stored-only payload; never searched directly.
    builder.add_text_field(FieldNames::BODY, TextOptions::default().set_stored());

    builder.build()
}

/// Registers the tokenizer used by the rendering fields.
///
/// Synonym expansion is applied to query tokens before term
/// construction rather than through a custom tokenizer, which keeps
/// index-time and query-time analysis trivially symmetric.
pub fn register_tokenizers(index: &Index) {
    index.tokenizers().register(
        "default",
        TextAnalyzer::builder(tantivy::tokenizer::SimpleTokenizer::default())
            .filter(tantivy::tokenizer::LowerCaser)
            .build(),
    );
}
