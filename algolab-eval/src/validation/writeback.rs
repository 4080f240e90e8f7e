//! Corpus write-back of record projections
//!
//! Records are written in chunks. A failing record is retried with
//! exponential backoff; once retries are exhausted its pair is flagged
//! `computation_status = error` and the batch moves on.

use crate::corpus::CorpusStore;
use crate::normalizer::ValidationRecord;
use crate::types::ComputationStatus;
use algolab_common::config::HarnessConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const BATCH_SIZE: usize = 100;
pub const MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct WriteBackConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    /// First retry delay, doubled on each further retry
    pub retry_backoff: Duration,
    pub inter_batch_pause: Duration,
}

impl Default for WriteBackConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            max_retries: MAX_RETRIES,
            retry_backoff: Duration::from_millis(200),
            inter_batch_pause: Duration::from_millis(200),
        }
    }
}

impl From<&HarnessConfig> for WriteBackConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            ..Default::default()
        }
    }
}

/// Partial-success summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBackReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Records without a pair id or without projected columns
    pub skipped: usize,
    pub batches: usize,
}

pub async fn write_back(
    store: &dyn CorpusStore,
    records: &[ValidationRecord],
    config: &WriteBackConfig,
) -> WriteBackReport {
    let mut report = WriteBackReport::default();
    let chunks: Vec<&[ValidationRecord]> = records.chunks(config.batch_size.max(1)).collect();

    for (idx, chunk) in chunks.iter().enumerate() {
        for record in chunk.iter() {
            let Some(pair_id) = record.pair_id else {
                report.skipped += 1;
                continue;
            };
            if record.metadata.projection.is_empty() {
                report.skipped += 1;
                continue;
            }

            if write_record(store, pair_id, record, config).await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
                if let Err(e) = store.mark_status(pair_id, ComputationStatus::Error).await {
                    warn!(pair_id, error = %e, "Could not flag pair as error");
                }
            }
        }

        report.batches += 1;
        debug!(
            batch = idx + 1,
            batches = chunks.len(),
            succeeded = report.succeeded,
            failed = report.failed,
            "Write-back batch done"
        );

        if idx + 1 < chunks.len() && !config.inter_batch_pause.is_zero() {
            tokio::time::sleep(config.inter_batch_pause).await;
        }
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "Write-back complete"
    );
    report
}

async fn write_record(
    store: &dyn CorpusStore,
    pair_id: i64,
    record: &ValidationRecord,
    config: &WriteBackConfig,
) -> bool {
    let mut backoff = config.retry_backoff;

    for attempt in 0..=config.max_retries {
        match store.update_projection(pair_id, &record.metadata.projection).await {
            Ok(()) => return true,
            Err(e) if attempt < config.max_retries => {
                debug!(pair_id, attempt = attempt + 1, error = %e, "Projection write failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => {
                warn!(
                    pair_id,
                    attempts = attempt + 1,
                    error = %e,
                    "Projection write failed, giving up"
                );
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{CorpusPair, InMemoryCorpusStore, PairFilter};
    use crate::normalizer::RecordMetadata;
    use crate::types::{Projection, Target};
    use algolab_common::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(pair_id: Option<i64>) -> ValidationRecord {
        ValidationRecord {
            pair_id,
            target: Target::M3,
            verbatim: "euh".to_string(),
            gold: "EXPLICATION".to_string(),
            predicted: "0.600".to_string(),
            correct: false,
            confidence: 0.7,
            processing_time_ms: 0.1,
            algorithm_version: "1.0.0".to_string(),
            metadata: RecordMetadata {
                projection: Projection::new()
                    .with("m3_cognitive_score", 0.6)
                    .with("computation_status", "complete"),
                ..Default::default()
            },
        }
    }

    fn fast() -> WriteBackConfig {
        WriteBackConfig {
            batch_size: 2,
            retry_backoff: Duration::from_millis(1),
            inter_batch_pause: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Fails the first `failures` projection writes
    struct FlakyStore {
        inner: InMemoryCorpusStore,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CorpusStore for FlakyStore {
        async fn fetch_pairs(&self, filter: &PairFilter) -> Result<Vec<CorpusPair>> {
            self.inner.fetch_pairs(filter).await
        }

        async fn update_projection(&self, pair_id: i64, projection: &Projection) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(Error::Internal("disk full".to_string()));
            }
            self.inner.update_projection(pair_id, projection).await
        }

        async fn mark_status(&self, pair_id: i64, status: ComputationStatus) -> Result<()> {
            self.inner.mark_status(pair_id, status).await
        }
    }

    fn flaky(failures: usize) -> FlakyStore {
        FlakyStore {
            inner: InMemoryCorpusStore::with_pairs(vec![
                CorpusPair::new(1, "c", "EXPLICATION", "CLIENT_NEUTRE", "a", "b"),
                CorpusPair::new(2, "c", "EXPLICATION", "CLIENT_NEUTRE", "a", "b"),
            ]),
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_skips_records_without_pair() {
        let store = flaky(0);
        let report = write_back(&store, &[record(Some(1)), record(None), record(Some(2))], &fast()).await;
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.batches, 2);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = flaky(2);
        let report = write_back(&store, &[record(Some(1))], &fast()).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_flag_error() {
        let store = flaky(usize::MAX);
        let report = write_back(&store, &[record(Some(2))], &fast()).await;
        assert_eq!(report.failed, 1);
        // one attempt plus MAX_RETRIES
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);

        let projection = store.inner.projection(2).await.unwrap();
        assert_eq!(
            projection.get("computation_status"),
            Some(&serde_json::json!("error"))
        );
    }

    #[test]
    fn test_config_from_harness_settings() {
        let harness = HarnessConfig {
            batch_size: 0,
            retry_backoff_ms: 50,
            ..Default::default()
        };
        let config = WriteBackConfig::from(&harness);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_backoff, Duration::from_millis(50));
    }
}
