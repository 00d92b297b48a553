//! Cleanup sweeper.
//!
//! Runs after every processor cycle. Releases the shared asset of each
//! correlation group whose jobs are all terminal, then purges completed jobs
//! older than the retention window.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::content::ContentItem;
use crate::dispatch::AssetReleaser;
use crate::metrics::MetricsCollector;
use crate::storage::{JobStore, StoreError};

/// Default retention window for completed jobs.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Correlation groups whose asset was released.
    pub released: usize,
    /// Completed jobs deleted.
    pub purged: u64,
}

/// Reclaims resources held by finished jobs.
pub struct Sweeper {
    store: JobStore,
    releaser: Arc<dyn AssetReleaser>,
    retention_days: u32,
    metrics: MetricsCollector,
}

impl Sweeper {
    pub fn new(store: JobStore, releaser: Arc<dyn AssetReleaser>, retention_days: u32) -> Self {
        Self {
            store,
            releaser,
            retention_days,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Runs both duties: asset release, then purge.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let released = self.release_finished_assets().await?;
        let purged = self.purge_expired(now).await?;
        Ok(SweepReport { released, purged })
    }

    /// Releases the asset of every finished, not yet released correlation group.
    ///
    /// A group is marked released only after the releaser succeeds, so a
    /// failed release is attempted again on the next sweep.
    pub async fn release_finished_assets(&self) -> Result<usize, StoreError> {
        let mut released = 0;

        for correlation_id in self.store.releasable_correlations().await? {
            let Some(snapshot) = self.store.correlation_snapshot(&correlation_id).await? else {
                continue;
            };

            let content = match ContentItem::from_snapshot(&snapshot) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        error = %e,
                        "Unreadable content snapshot, nothing to release"
                    );
                    self.store.mark_released(&correlation_id).await?;
                    continue;
                }
            };

            match self.releaser.release(&correlation_id, &content).await {
                Ok(()) => {
                    self.store.mark_released(&correlation_id).await?;
                    released += 1;
                    tracing::info!(correlation_id = %correlation_id, "Asset released");
                }
                Err(e) => {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        error = %e,
                        "Failed to release asset, will retry next sweep"
                    );
                }
            }
        }

        if released > 0 {
            self.metrics.record_released(released);
        }

        Ok(released)
    }

    /// Deletes completed jobs older than the retention window.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.store.purge(retention_cutoff(now, self.retention_days)).await
    }
}

/// Oldest `completed_at` kept for a retention window of `days`.
pub fn retention_cutoff(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now - chrono::Duration::days(i64::from(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseError;
    use crate::scheduler::job::JobStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReleaser {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl AssetReleaser for RecordingReleaser {
        async fn release(
            &self,
            correlation_id: &str,
            _content: &ContentItem,
        ) -> Result<(), ReleaseError> {
            self.calls.lock().unwrap().push(correlation_id.to_string());
            if self.fail {
                return Err(ReleaseError::Other("disk busy".to_string()));
            }
            Ok(())
        }
    }

    const SNAPSHOT: &str = r#"{"type":"photo","file_id":"x","local_path":"/tmp/x.jpg"}"#;

    async fn open_store(dir: &tempfile::TempDir) -> JobStore {
        let db_path = dir.path().join("sweep.db");
        JobStore::open(db_path.to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn test_release_waits_for_all_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let releaser = Arc::new(RecordingReleaser::default());
        let sweeper = Sweeper::new(store.clone(), releaser.clone(), 7);
        let now = Utc::now();

        let first = store.create("a", SNAPSHOT, now, Some("x")).await.unwrap();
        let second = store.create("b", SNAPSHOT, now, Some("x")).await.unwrap();

        store
            .update(first, JobStatus::Completed, None, None)
            .await
            .unwrap();
        assert_eq!(sweeper.release_finished_assets().await.unwrap(), 0);

        store
            .update(second, JobStatus::Failed, Some("gone"), None)
            .await
            .unwrap();
        assert_eq!(sweeper.release_finished_assets().await.unwrap(), 1);
        assert_eq!(sweeper.release_finished_assets().await.unwrap(), 0);

        assert_eq!(*releaser.calls.lock().unwrap(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_release_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let releaser = Arc::new(RecordingReleaser {
            fail: true,
            ..Default::default()
        });
        let sweeper = Sweeper::new(store.clone(), releaser.clone(), 7);

        let id = store
            .create("a", SNAPSHOT, Utc::now(), Some("x"))
            .await
            .unwrap();
        store.cancel(id).await.unwrap();

        assert_eq!(sweeper.release_finished_assets().await.unwrap(), 0);
        assert_eq!(sweeper.release_finished_assets().await.unwrap(), 0);
        assert_eq!(releaser.calls.lock().unwrap().len(), 2);
        assert!(!store.is_released("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_marked_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let releaser = Arc::new(RecordingReleaser::default());
        let sweeper = Sweeper::new(store.clone(), releaser.clone(), 7);

        let id = store
            .create("a", "{broken", Utc::now(), Some("y"))
            .await
            .unwrap();
        store
            .update(id, JobStatus::Failed, Some("bad payload"), None)
            .await
            .unwrap();

        assert_eq!(sweeper.release_finished_assets().await.unwrap(), 0);
        assert!(store.is_released("y").await.unwrap());
        assert!(releaser.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_purges_past_retention() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let sweeper = Sweeper::new(store.clone(), Arc::new(RecordingReleaser::default()), 7);

        let id = store
            .create("a", SNAPSHOT, Utc::now(), Some("x"))
            .await
            .unwrap();
        store
            .update(id, JobStatus::Completed, None, None)
            .await
            .unwrap();

        let report = sweeper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport { released: 1, purged: 0 });

        let report = sweeper
            .sweep(Utc::now() + chrono::Duration::days(8))
            .await
            .unwrap();
        assert_eq!(report, SweepReport { released: 0, purged: 1 });
        assert!(store.get(id).await.unwrap().is_none());
        assert!(!store.is_released("x").await.unwrap());
    }
}
