//! Streaming delimited-file driver with bounded chunks.
//!
//! G-NAF constituent files are pipe-separated with a header row and
//! can run to gigabytes. The driver parses on a blocking thread and
//! hands batches of rows through a bounded channel of size 1, so the
//! parser stalls until the consumer has drained the previous chunk —
//! memory use is bounded by one chunk plus one in-flight batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Field delimiter for G-NAF constituent files.
pub const PSV_DELIMITER: u8 = b'|';

/// Errors from delimited parsing.
#[derive(Debug, thiserror::Error)]
pub enum PsvError {
    /// File could not be opened or read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Header row could not be parsed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// The parser thread disappeared without finishing.
    #[error("parser for {0} ended unexpectedly")]
    ParserGone(String),
}

/// One parsed row with header-based column access.
#[derive(Debug, Clone)]
pub struct Row {
    headers: Arc<HashMap<String, usize>>,
    record: csv::StringRecord,
}

impl Row {
    /// Builds a row from `(column, value)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let headers = pairs
            .iter()
            .enumerate()
            .map(|(i, (name, _))| ((*name).to_string(), i))
            .collect();
        let record = pairs.iter().map(|(_, value)| *value).collect();
        Self {
            headers: Arc::new(headers),
            record,
        }
    }

    /// Returns the trimmed value of `column`, or `None` when the
    /// column is absent or empty.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        let index = *self.headers.get(column)?;
        let value = self.record.get(index)?.trim();
        (!value.is_empty()).then_some(value)
    }

    /// Iterates over `(column, value)` pairs with non-empty values.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.headers.iter().filter_map(|(name, &index)| {
            let value = self.record.get(index)?.trim();
            (!value.is_empty()).then_some((name.as_str(), value))
        })
    }

    /// The 1-based line number of this row in the source file.
    #[must_use]
    pub fn line(&self) -> u64 {
        self.record.position().map_or(0, csv::Position::line)
    }
}

/// A stream of row chunks from one delimited file.
pub struct ChunkStream {
    rx: mpsc::Receiver<Result<Vec<Row>, PsvError>>,
    path: PathBuf,
}

impl ChunkStream {
    /// Awaits the next chunk, or `None` at end of file.
    pub async fn next_chunk(&mut self) -> Option<Result<Vec<Row>, PsvError>> {
        self.rx.recv().await
    }

    /// The source path, for log context.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Opens `path` and streams its rows in chunks of roughly
/// `chunk_bytes` of source text.
///
/// Per-row parse errors are logged and skipped; only header-level
/// failures surface through the stream.
#[must_use]
pub fn stream_chunks(path: &Path, delimiter: u8, chunk_bytes: u64) -> ChunkStream {
    let (tx, rx) = mpsc::channel(1);
    let parse_path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        parse_file(&parse_path, delimiter, chunk_bytes, &tx);
    });

    ChunkStream {
        rx,
        path: path.to_path_buf(),
    }
}

/// Blocking parse loop feeding the bounded channel.
fn parse_file(
    path: &Path,
    delimiter: u8,
    chunk_bytes: u64,
    tx: &mpsc::Sender<Result<Vec<Row>, PsvError>>,
) {
    let mut reader = match csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
    {
        Ok(reader) => reader,
        Err(e) => {
            let _ = tx.blocking_send(Err(PsvError::Csv {
                path: path.display().to_string(),
                source: e,
            }));
            return;
        }
    };

    let headers = match reader.headers() {
        Ok(headers) => Arc::new(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().to_string(), i))
                .collect::<HashMap<_, _>>(),
        ),
        Err(e) => {
            let _ = tx.blocking_send(Err(PsvError::Csv {
                path: path.display().to_string(),
                source: e,
            }));
            return;
        }
    };

    let mut chunk = Vec::new();
    let mut chunk_start = reader.position().byte();

    loop {
        let mut record = csv::StringRecord::new();
        match reader.read_record(&mut record) {
            Ok(true) => {
                chunk.push(Row {
                    headers: Arc::clone(&headers),
                    record,
                });
            }
            Ok(false) => break,
            Err(e) => {
                log::warn!("Skipping malformed row in {}: {e}", path.display());
                continue;
            }
        }

        let consumed = reader.position().byte() - chunk_start;
        if consumed >= chunk_bytes {
            // blocking_send stalls here until the consumer drains the
            // previous chunk: this is the backpressure point.
            if tx.blocking_send(Ok(std::mem::take(&mut chunk))).is_err() {
                return;
            }
            chunk_start = reader.position().byte();
        }
    }

    if !chunk.is_empty() {
        let _ = tx.blocking_send(Ok(chunk));
    }
}

/// Reads a small delimited file into memory (authority tables, count
/// manifests). Per-row errors are logged and skipped.
///
/// # Errors
///
/// Returns [`PsvError`] if the file cannot be opened or its header
/// cannot be parsed.
pub fn read_rows(path: &Path, delimiter: u8) -> Result<Vec<Row>, PsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| PsvError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

    let headers = Arc::new(
        reader
            .headers()
            .map_err(|e| PsvError::Csv {
                path: path.display().to_string(),
                source: e,
            })?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect::<HashMap<_, _>>(),
    );

    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => rows.push(Row {
                headers: Arc::clone(&headers),
                record,
            }),
            Err(e) => log::warn!("Skipping malformed row in {}: {e}", path.display()),
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn test_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("addresskit_psv_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn rows_resolve_columns_by_header() {
        let path = test_file(
            "columns.psv",
            "LOCALITY_PID|LOCALITY_NAME|STATE_PID\nloc1|BARANGAROO|1\nloc2||1\n",
        );
        let rows = read_rows(&path, PSV_DELIMITER).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("LOCALITY_NAME"), Some("BARANGAROO"));
        assert_eq!(rows[1].get("LOCALITY_NAME"), None);
        assert_eq!(rows[0].get("MISSING_COLUMN"), None);
    }

    #[tokio::test]
    async fn chunks_respect_the_byte_budget() {
        let mut contents = String::from("PID|VALUE\n");
        for i in 0..1000 {
            contents.push_str(&format!("pid{i}|{:0>32}\n", i));
        }
        let path = test_file("chunks.psv", &contents);

        let mut stream = stream_chunks(&path, PSV_DELIMITER, 4096);
        let mut chunks = 0u64;
        let mut rows = 0u64;
        while let Some(chunk) = stream.next_chunk().await {
            let chunk = chunk.unwrap();
            assert!(!chunk.is_empty());
            chunks += 1;
            rows += chunk.len() as u64;
        }

        assert_eq!(rows, 1000);
        assert!(chunks > 1, "a 4 KiB budget must split this file");
    }

    #[tokio::test]
    async fn all_rows_arrive_in_file_order() {
        let mut contents = String::from("PID\n");
        for i in 0..100 {
            contents.push_str(&format!("pid{i}\n"));
        }
        let path = test_file("order.psv", &contents);

        let mut stream = stream_chunks(&path, PSV_DELIMITER, 256);
        let mut seen = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            for row in chunk.unwrap() {
                seen.push(row.get("PID").unwrap().to_string());
            }
        }

        let expected: Vec<String> = (0..100).map(|i| format!("pid{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn missing_file_surfaces_an_error() {
        let path = std::env::temp_dir().join("addresskit_psv_tests/does_not_exist.psv");
        let mut stream = stream_chunks(&path, PSV_DELIMITER, 1024);
        let first = stream.next_chunk().await.unwrap();
        assert!(first.is_err());
    }
}
