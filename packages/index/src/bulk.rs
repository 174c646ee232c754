//! Bulk indexing sink with retry-on-error backoff.
//!
//! During ingestion the search backend is the bottleneck, and dropping
//! records is worse than pausing: a failed batch is resubmitted whole,
//! with a linearly growing delay that caps out rather than giving up.

use std::sync::Arc;
use std::time::Duration;

use crate::{BackendError, BulkOp, SearchBackend};

/// Backoff schedule and timeout for bulk submissions.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Delay before the first resubmission.
    pub backoff: Duration,
    /// Added to the delay after every failed submission.
    pub backoff_increment: Duration,
    /// Upper bound on the delay.
    pub backoff_max: Duration,
    /// Per-submission timeout.
    pub timeout: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(30),
            backoff_increment: Duration::from_secs(30),
            backoff_max: Duration::from_secs(600),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Submits batches of address documents to a [`SearchBackend`].
pub struct BulkSink {
    backend: Arc<dyn SearchBackend>,
    config: BulkConfig,
}

impl BulkSink {
    /// Creates a sink over the given backend handle.
    #[must_use]
    pub fn new(backend: Arc<dyn SearchBackend>, config: BulkConfig) -> Self {
        Self { backend, config }
    }

    /// Submits one batch, retrying until the backend accepts every item.
    ///
    /// A top-level error, a timeout, or any per-item error triggers a
    /// resubmission of the entire batch. The retry loop is unbounded;
    /// the delay grows by the configured increment until the cap and
    /// then stays constant.
    ///
    /// # Errors
    ///
    /// This method only fails if the batch is empty of retriable work —
    /// in practice it returns `Ok` once the backend accepts the batch.
    pub async fn submit(&self, batch: &[BulkOp], refresh: bool) -> Result<(), BackendError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut delay = self.config.backoff;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let result =
                tokio::time::timeout(self.config.timeout, self.backend.bulk(batch, refresh)).await;

            match result {
                Ok(Ok(outcome)) if !outcome.errors => {
                    if attempt > 1 {
                        log::info!(
                            "Bulk batch of {} accepted after {attempt} attempts",
                            batch.len()
                        );
                    }
                    return Ok(());
                }
                Ok(Ok(outcome)) => {
                    let failed = outcome
                        .items
                        .iter()
                        .filter(|item| item.error.is_some())
                        .count();
                    log::warn!(
                        "Bulk batch of {} had {failed} item error(s); retrying in {delay:?}",
                        batch.len()
                    );
                    if let Some(item) = outcome.items.iter().find(|item| item.error.is_some()) {
                        log::debug!(
                            "  first failing item {}: {}",
                            item.id,
                            item.error.as_deref().unwrap_or("")
                        );
                    }
                }
                Ok(Err(e)) => {
                    log::warn!(
                        "Bulk batch of {} failed ({e}); retrying in {delay:?}",
                        batch.len()
                    );
                }
                Err(_) => {
                    log::warn!(
                        "Bulk batch of {} timed out after {:?}; retrying in {delay:?}",
                        batch.len(),
                        self.config.timeout
                    );
                }
            }

            tokio::time::sleep(delay).await;
            delay = (delay + self.config.backoff_increment).min(self.config.backoff_max);
        }
    }

    /// Issues an explicit refresh at end of load.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the refresh fails.
    pub async fn refresh(&self) -> Result<(), BackendError> {
        self.backend.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockBackend;
    use addresskit_models::{AddressDetail, StructuredAddress};

    fn op(pid: &str) -> BulkOp {
        BulkOp::index(AddressDetail {
            pid: pid.to_string(),
            structured: StructuredAddress::default(),
            sla: String::new(),
            ssla: String::new(),
            mla: vec![String::new()],
            smla: vec![],
            confidence: None,
            geo: None,
        })
    }

    fn fast_config() -> BulkConfig {
        BulkConfig {
            backoff: Duration::from_millis(5),
            backoff_increment: Duration::from_millis(5),
            backoff_max: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn failed_batch_is_resubmitted_whole_until_accepted() {
        let backend = Arc::new(MockBackend::default());
        *backend.fail_bulk_times.lock().unwrap() = 3;

        let sink = BulkSink::new(Arc::clone(&backend) as Arc<dyn SearchBackend>, fast_config());
        sink.submit(&[op("GANSW1"), op("GANSW2")], false)
            .await
            .unwrap();

        // Only the accepted submission is recorded, exactly once and whole.
        let batches = backend.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec!["/addresses/GANSW1".to_string(), "/addresses/GANSW2".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let backend = Arc::new(MockBackend::default());
        let sink = BulkSink::new(Arc::clone(&backend) as Arc<dyn SearchBackend>, fast_config());
        sink.submit(&[], false).await.unwrap();
        assert!(backend.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn backoff_grows_linearly_to_the_cap() {
        let config = BulkConfig::default();
        let mut delay = config.backoff;
        let mut seen = Vec::new();
        for _ in 0..25 {
            seen.push(delay.as_secs());
            delay = (delay + config.backoff_increment).min(config.backoff_max);
        }
        assert_eq!(seen[0], 30);
        assert_eq!(seen[1], 60);
        assert_eq!(seen[2], 90);
        assert_eq!(*seen.last().unwrap(), 600);
    }
}
