//! In-process Tantivy implementation of the [`SearchBackend`] seam.
//!
//! The index lives in a single directory. Document ids are exact-match
//! terms, so an upsert is a `delete_term` followed by `add_document`
//! and re-running ingestion converges on the same document set. The
//! synonym pairs installed at index creation are persisted alongside
//! the segments and reloaded on open.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use addresskit_models::{AddressDetail, SearchPage, SynonymPair};
use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Value as _};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::query::{self, SynonymMap};
use crate::schema::{self, AddressFields};
use crate::{BackendError, BulkItemResult, BulkOp, BulkOutcome, SearchBackend};

/// Memory budget for the Tantivy `IndexWriter`.
const WRITER_HEAP_BYTES: usize = 256 * 1024 * 1024;

/// File holding the installed synonym pairs, next to the segments.
const SYNONYMS_FILE: &str = "synonyms.json";

/// A Tantivy-backed search index for address documents.
pub struct TantivyBackend {
    dir: PathBuf,
    fields: AddressFields,
    reader: IndexReader,
    writer: Arc<Mutex<IndexWriter>>,
    synonyms: Arc<RwLock<SynonymMap>>,
}

impl TantivyBackend {
    /// Opens the index at `dir`, creating it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the directory cannot be created or
    /// the index cannot be opened.
    pub fn open_or_create(dir: impl AsRef<Path>) -> Result<Self, BackendError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let index = if dir.join("meta.json").exists() {
            log::info!("Opening address index at {}", dir.display());
            Index::open_in_dir(&dir)?
        } else {
            log::info!("Creating address index at {}", dir.display());
            Index::create_in_dir(&dir, schema::build_schema())?
        };
        schema::register_tokenizers(&index);

        let schema = index.schema();
        let fields = AddressFields::from_schema(&schema);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        let writer: IndexWriter = index.writer(WRITER_HEAP_BYTES)?;

        let synonyms = load_synonyms(&dir);

        Ok(Self {
            dir,
            fields,
            reader,
            writer: Arc::new(Mutex::new(writer)),
            synonyms: Arc::new(RwLock::new(synonyms)),
        })
    }

    /// Returns the total number of documents in the index.
    #[must_use]
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn save_synonyms(&self, pairs: &[SynonymPair]) -> Result<(), BackendError> {
        let raw = serde_json::to_string(pairs)?;
        std::fs::write(self.dir.join(SYNONYMS_FILE), raw)?;
        Ok(())
    }
}

fn load_synonyms(dir: &Path) -> SynonymMap {
    let path = dir.join(SYNONYMS_FILE);
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return SynonymMap::default();
    };
    match serde_json::from_str::<Vec<SynonymPair>>(&raw) {
        Ok(pairs) => SynonymMap::from_pairs(&pairs),
        Err(e) => {
            log::warn!("Discarding corrupt synonym file {}: {e}", path.display());
            SynonymMap::default()
        }
    }
}

fn build_document(fields: &AddressFields, op: &BulkOp) -> Result<TantivyDocument, BackendError> {
    let body = serde_json::to_string(&op.document)?;

    let mut doc = TantivyDocument::new();
    doc.add_text(fields.id, &op.id);
    doc.add_text(fields.sla, &op.document.sla);
    doc.add_text(fields.ssla, &op.document.ssla);
    if let Some(confidence) = op.document.confidence {
        doc.add_i64(fields.confidence, i64::from(confidence));
    }
    doc.add_text(fields.body, &body);
    Ok(doc)
}

#[async_trait]
impl SearchBackend for TantivyBackend {
    async fn create_index(&self, synonyms: &[SynonymPair]) -> Result<(), BackendError> {
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || -> Result<(), BackendError> {
            let mut writer = writer.lock().expect("writer lock poisoned");
            writer.delete_all_documents()?;
            writer.commit()?;
            Ok(())
        })
        .await??;

        self.save_synonyms(synonyms)?;
        *self.synonyms.write().expect("synonym lock poisoned") = SynonymMap::from_pairs(synonyms);
        self.reader.reload()?;
        log::info!("Created index with {} synonym pairs", synonyms.len());
        Ok(())
    }

    async fn drop_index(&self) -> Result<(), BackendError> {
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || -> Result<(), BackendError> {
            let mut writer = writer.lock().expect("writer lock poisoned");
            writer.delete_all_documents()?;
            writer.commit()?;
            Ok(())
        })
        .await??;

        let _ = std::fs::remove_file(self.dir.join(SYNONYMS_FILE));
        *self.synonyms.write().expect("synonym lock poisoned") = SynonymMap::default();
        self.reader.reload()?;
        Ok(())
    }

    async fn bulk(&self, ops: &[BulkOp], refresh: bool) -> Result<BulkOutcome, BackendError> {
        let writer = Arc::clone(&self.writer);
        let fields = self.fields.clone();
        let ops = ops.to_vec();

        let outcome = tokio::task::spawn_blocking(move || -> Result<BulkOutcome, BackendError> {
            let mut writer = writer.lock().expect("writer lock poisoned");
            let mut items = Vec::with_capacity(ops.len());
            let mut errors = false;

            for op in &ops {
                writer.delete_term(Term::from_field_text(fields.id, &op.id));

                let error = match build_document(&fields, op)
                    .and_then(|doc| writer.add_document(doc).map_err(BackendError::from))
                {
                    Ok(_) => None,
                    Err(e) => {
                        errors = true;
                        Some(e.to_string())
                    }
                };

                items.push(BulkItemResult {
                    id: op.id.clone(),
                    error,
                });
            }

            writer.commit()?;
            Ok(BulkOutcome { errors, items })
        })
        .await??;

        if refresh {
            self.reader.reload()?;
        }

        Ok(outcome)
    }

    async fn get(&self, id: &str) -> Result<Option<AddressDetail>, BackendError> {
        let reader = self.reader.clone();
        let fields = self.fields.clone();
        let id = id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<AddressDetail>, BackendError> {
            let searcher = reader.searcher();
            let query = TermQuery::new(
                Term::from_field_text(fields.id, &id),
                IndexRecordOption::Basic,
            );
            let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;

            let Some((_score, doc_address)) = top_docs.first() else {
                return Ok(None);
            };

            let doc: TantivyDocument = searcher.doc(*doc_address)?;
            let Some(body) = doc.get_first(fields.body).and_then(|v| v.as_str()) else {
                return Ok(None);
            };
            Ok(Some(serde_json::from_str(body)?))
        })
        .await?
    }

    async fn search(
        &self,
        q: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchPage, BackendError> {
        let reader = self.reader.clone();
        let fields = self.fields.clone();
        let synonyms = self
            .synonyms
            .read()
            .expect("synonym lock poisoned")
            .clone();
        let q = q.to_string();

        tokio::task::spawn_blocking(move || {
            let searcher = reader.searcher();
            query::execute(&searcher, &fields, &synonyms, &q, page, page_size)
        })
        .await?
    }

    async fn refresh(&self) -> Result<(), BackendError> {
        self.reader.reload()?;
        Ok(())
    }
}
