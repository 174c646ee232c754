//! Autocomplete query construction and ranking.
//!
//! Builds a boolean `should` of two sub-queries over the `sla` and
//! `ssla` fields:
//!
//! 1. **Typo-tolerant typeahead** — every token matched fuzzily with
//!    auto edit distance, the final (possibly partial) token as a fuzzy
//!    prefix.
//! 2. **Phrase prefix** — the query tokens as a strict phrase whose
//!    last term is a prefix.
//!
//! Results are ranked by score descending with deterministic
//! tie-breaks: confidence descending, then `ssla`, then `sla`.

use std::collections::HashMap;

use addresskit_models::{SearchHit, SearchPage, SynonymPair};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, DisjunctionMaxQuery, FuzzyTermQuery, Occur, PhrasePrefixQuery, Query};
use tantivy::schema::Value as _;
use tantivy::{Searcher, TantivyDocument, Term};

use crate::schema::AddressFields;
use crate::BackendError;

/// Default page size for autocomplete results.
pub const DEFAULT_PAGE_SIZE: u32 = 8;

/// Upper bound on the page number.
pub const MAX_PAGE_NUMBER: u32 = 100;

/// Upper bound on the page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Query-time synonym expansion built from the authority tables.
///
/// Maps authority codes to their indexed names (e.g. `AVENUE` → `AV`)
/// so a fully spelled-out query matches the abbreviated rendering.
#[derive(Debug, Clone, Default)]
pub struct SynonymMap {
    entries: HashMap<String, String>,
}

impl SynonymMap {
    /// Builds the map from authority `CODE, NAME` pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[SynonymPair]) -> Self {
        let mut entries = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let code = pair.code.trim().to_uppercase();
            let name = pair.name.trim().to_uppercase();
            if !code.is_empty() && !name.is_empty() && code != name {
                entries.insert(code, name);
            }
        }
        Self { entries }
    }

    /// Expands one uppercase token, or returns it unchanged.
    #[must_use]
    pub fn expand<'a>(&'a self, token: &'a str) -> &'a str {
        self.entries.get(token).map_or(token, String::as_str)
    }

    /// The pairs currently installed, for persistence.
    #[must_use]
    pub fn pairs(&self) -> Vec<SynonymPair> {
        let mut pairs: Vec<SynonymPair> = self
            .entries
            .iter()
            .map(|(code, name)| SynonymPair {
                code: code.clone(),
                name: name.clone(),
            })
            .collect();
        pairs.sort_by(|a, b| a.code.cmp(&b.code));
        pairs
    }
}

/// Tokenizes a user query: uppercase, split on non-alphanumerics,
/// synonym-expanded, then lowercased to match the index analyzer.
#[must_use]
pub fn normalize_query(q: &str, synonyms: &SynonymMap) -> Vec<String> {
    q.to_uppercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| synonyms.expand(token).to_lowercase())
        .collect()
}

/// Edit distance for a token, mirroring the backend's auto fuzziness:
/// short tokens must match exactly, long tokens tolerate two edits.
#[must_use]
pub const fn auto_distance(token_len: usize) -> u8 {
    match token_len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Builds the autocomplete query for the normalized `tokens`.
///
/// Returns `None` when the query has no usable tokens.
#[must_use]
pub fn compose_query(fields: &AddressFields, tokens: &[String]) -> Option<Box<dyn Query>> {
    if tokens.is_empty() {
        return None;
    }

    let typeahead = DisjunctionMaxQuery::new(vec![
        fuzzy_typeahead(fields.sla, tokens),
        fuzzy_typeahead(fields.ssla, tokens),
    ]);
    let phrase = DisjunctionMaxQuery::new(vec![
        phrase_prefix(fields.sla, tokens),
        phrase_prefix(fields.ssla, tokens),
    ]);

    Some(Box::new(BooleanQuery::new(vec![
        (Occur::Should, Box::new(typeahead) as Box<dyn Query>),
        (Occur::Should, Box::new(phrase)),
    ])))
}

/// All tokens fuzzy, the final token as a fuzzy prefix.
fn fuzzy_typeahead(field: tantivy::schema::Field, tokens: &[String]) -> Box<dyn Query> {
    let last = tokens.len() - 1;
    let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let term = Term::from_field_text(field, token);
            let distance = auto_distance(token.len());
            let query: Box<dyn Query> = if i == last {
                Box::new(FuzzyTermQuery::new_prefix(term, distance, true))
            } else {
                Box::new(FuzzyTermQuery::new(term, distance, true))
            };
            (Occur::Must, query)
        })
        .collect();

    Box::new(BooleanQuery::new(clauses))
}

/// Strict prefix of the last phrase.
fn phrase_prefix(field: tantivy::schema::Field, tokens: &[String]) -> Box<dyn Query> {
    if tokens.len() == 1 {
        let term = Term::from_field_text(field, &tokens[0]);
        return Box::new(FuzzyTermQuery::new_prefix(term, 0, false));
    }

    let terms: Vec<Term> = tokens
        .iter()
        .map(|token| Term::from_field_text(field, token))
        .collect();
    Box::new(PhrasePrefixQuery::new(terms))
}

/// Clamps paging inputs and returns `(offset, page_size)`.
#[must_use]
pub fn clamp_paging(page: u32, page_size: u32) -> (usize, usize) {
    let page = page.clamp(1, MAX_PAGE_NUMBER);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    (((page - 1) * page_size) as usize, page_size as usize)
}

/// A scored candidate prior to tie-break ordering.
struct Ranked {
    score: f32,
    confidence: i64,
    ssla: String,
    sla: String,
    pid: String,
}

/// Runs the query against a searcher and produces one ranked page.
///
/// # Errors
///
/// Returns [`BackendError`] if the search or document retrieval fails.
pub fn execute(
    searcher: &Searcher,
    fields: &AddressFields,
    synonyms: &SynonymMap,
    q: &str,
    page: u32,
    page_size: u32,
) -> Result<SearchPage, BackendError> {
    let tokens = normalize_query(q, synonyms);
    let Some(query) = compose_query(fields, &tokens) else {
        return Ok(SearchPage {
            hits: Vec::new(),
            total: 0,
        });
    };

    let (offset, page_size) = clamp_paging(page, page_size);
    let limit = offset + page_size;

    let (top_docs, total) = searcher.search(&query, &(TopDocs::with_limit(limit), Count))?;

    let mut ranked = Vec::with_capacity(top_docs.len());
    for (score, doc_address) in top_docs {
        let doc: TantivyDocument = searcher.doc(doc_address)?;
        let pid_path = doc
            .get_first(fields.id)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let sla = doc
            .get_first(fields.sla)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let ssla = doc
            .get_first(fields.ssla)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let confidence = doc
            .get_first(fields.confidence)
            .and_then(|v| v.as_i64())
            .unwrap_or(i64::MIN);

        ranked.push(Ranked {
            score,
            confidence,
            ssla,
            sla,
            pid: pid_path
                .rsplit('/')
                .next()
                .unwrap_or(&pid_path)
                .to_string(),
        });
    }

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.confidence.cmp(&a.confidence))
            .then_with(|| a.ssla.cmp(&b.ssla))
            .then_with(|| a.sla.cmp(&b.sla))
    });

    let hits = ranked
        .into_iter()
        .skip(offset)
        .take(page_size)
        .map(|r| SearchHit {
            pid: r.pid,
            sla: r.sla,
            score: r.score,
        })
        .collect();

    Ok(SearchPage {
        hits,
        total: total as u64,
    })
}
