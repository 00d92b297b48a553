//! Queue facade.
//!
//! `Queue` is the composition root: it owns the job store, the fan-out
//! scheduler and the processor, and exposes the operator surface (enqueue,
//! status, list, get, cancel, purge) plus the processor lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::QueueConfig;
use crate::content::{ContentItem, Eligibility};
use crate::dispatch::{AssetReleaser, DispatchRegistry};
use crate::error::QueueError;
use crate::scheduler::sweeper::retention_cutoff;
use crate::scheduler::{
    CycleReport, FanoutScheduler, Job, JobId, Processor, ProcessorError, Stagger, StatusCounts,
    Sweeper,
};
use crate::storage::JobStore;

/// Persistent scheduled job queue.
pub struct Queue {
    config: QueueConfig,
    store: JobStore,
    registry: DispatchRegistry,
    eligibility: Arc<dyn Eligibility>,
    fanout: FanoutScheduler,
    processor: Processor,
}

impl Queue {
    /// Opens the store at `config.database_path` and wires the queue.
    pub async fn open(
        config: QueueConfig,
        registry: DispatchRegistry,
        eligibility: Arc<dyn Eligibility>,
        releaser: Arc<dyn AssetReleaser>,
    ) -> Result<Self, QueueError> {
        let store = JobStore::open(&config.database_path).await?;
        Ok(Self::new(config, store, registry, eligibility, releaser))
    }

    /// Wires the queue around an already opened store.
    pub fn new(
        config: QueueConfig,
        store: JobStore,
        registry: DispatchRegistry,
        eligibility: Arc<dyn Eligibility>,
        releaser: Arc<dyn AssetReleaser>,
    ) -> Self {
        let sweeper = Sweeper::new(store.clone(), releaser, config.retention_days);
        let processor = Processor::new(
            config.processor_config(),
            store.clone(),
            registry.clone(),
            sweeper,
        );

        Self {
            fanout: FanoutScheduler::new(store.clone()),
            config,
            store,
            registry,
            eligibility,
            processor,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn registry(&self) -> &DispatchRegistry {
        &self.registry
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Targets the eligibility routes pick for an item.
    pub fn eligible_targets(&self, item: &ContentItem) -> Vec<String> {
        self.eligibility.eligible_targets(item)
    }

    /// Fans an item out to its targets, staggered from now.
    ///
    /// `targets` defaults to the eligible targets, `stagger` to the configured one.
    pub async fn enqueue(
        &self,
        item: &ContentItem,
        targets: Option<Vec<String>>,
        stagger: Option<Stagger>,
    ) -> Result<Vec<JobId>, QueueError> {
        self.enqueue_at(item, targets, stagger, Utc::now()).await
    }

    /// Like [`enqueue`](Self::enqueue), staggered from `now`.
    ///
    /// # Errors
    ///
    /// `NoTargets` when there is nothing to send to and `UnknownTarget` for
    /// a target without a dispatcher. Nothing is written in either case.
    pub async fn enqueue_at(
        &self,
        item: &ContentItem,
        targets: Option<Vec<String>>,
        stagger: Option<Stagger>,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>, QueueError> {
        let targets = targets.unwrap_or_else(|| self.eligible_targets(item));
        if targets.is_empty() {
            return Err(QueueError::NoTargets);
        }
        if let Some(unknown) = targets.iter().find(|t| !self.registry.contains(t)) {
            return Err(QueueError::UnknownTarget(unknown.clone()));
        }

        let stagger = stagger.unwrap_or_else(|| self.config.stagger());
        let ids = self.fanout.fan_out(item, &targets, stagger, now).await?;

        tracing::info!(
            count = ids.len(),
            kind = %item.kind,
            caption = item.caption_preview(),
            "Content queued"
        );

        Ok(ids)
    }

    /// Job counts per status.
    pub async fn status(&self) -> Result<StatusCounts, QueueError> {
        Ok(self.store.status_counts().await?)
    }

    /// Most recent jobs, up to `limit` (configured default when `None`).
    pub async fn list(&self, limit: Option<u32>) -> Result<Vec<Job>, QueueError> {
        let limit = limit.unwrap_or(self.config.list_limit);
        Ok(self.store.list(Some(limit)).await?)
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job>, QueueError> {
        Ok(self.store.get(id).await?)
    }

    /// Cancels a pending job. Returns `false` if it is missing or terminal.
    pub async fn cancel(&self, id: JobId) -> Result<bool, QueueError> {
        Ok(self.store.cancel(id).await?)
    }

    /// Purges completed jobs older than `retention_days` (configured default when `None`).
    pub async fn purge(&self, retention_days: Option<u32>) -> Result<u64, QueueError> {
        let days = retention_days.unwrap_or(self.config.retention_days);
        Ok(self.store.purge(retention_cutoff(Utc::now(), days)).await?)
    }

    /// Starts the background processor. No-op if it is already running.
    pub async fn start(&self) -> bool {
        self.processor.start().await
    }

    /// Stops the background processor, waiting up to the shutdown timeout.
    pub async fn stop(&self) -> Result<(), ProcessorError> {
        self.processor.stop().await
    }

    /// Runs a single processor cycle now.
    pub async fn process_once(&self) -> Result<CycleReport, ProcessorError> {
        self.processor.run_cycle(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{MediaKind, MediaKindEligibility};
    use crate::dispatch::{LogDispatcher, NoopReleaser};
    use crate::scheduler::JobStatus;

    async fn open_queue(dir: &tempfile::TempDir) -> Queue {
        let db_path = dir.path().join("queue.db");
        let config = QueueConfig::default().with_database_path(db_path.to_str().unwrap());
        let registry = DispatchRegistry::new()
            .with("telegram", Arc::new(LogDispatcher::new()))
            .with("instagram", Arc::new(LogDispatcher::new()));
        let eligibility = MediaKindEligibility::new()
            .with_target("telegram", Vec::<MediaKind>::new())
            .with_target("instagram", [MediaKind::Photo]);

        Queue::open(config, registry, Arc::new(eligibility), Arc::new(NoopReleaser))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_uses_eligibility_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open_queue(&dir).await;

        let photo = ContentItem::new(MediaKind::Photo).with_file_id("p1");
        let ids = queue.enqueue(&photo, None, None).await.unwrap();
        assert_eq!(ids.len(), 2);

        let text_ids = queue
            .enqueue(&ContentItem::text("hello"), None, None)
            .await
            .unwrap();
        assert_eq!(text_ids.len(), 1);
        let job = queue.get(text_ids[0]).await.unwrap().unwrap();
        assert_eq!(job.target, "telegram");

        let counts = queue.status().await.unwrap();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.total, 3);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_unknown_and_empty_targets() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open_queue(&dir).await;
        let item = ContentItem::text("hello");

        let err = queue
            .enqueue(
                &item,
                Some(vec!["telegram".to_string(), "myspace".to_string()]),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::UnknownTarget(ref t) if t == "myspace"));

        let err = queue.enqueue(&item, Some(Vec::new()), None).await.unwrap_err();
        assert!(matches!(err, QueueError::NoTargets));

        // Nothing was written
        assert_eq!(queue.status().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_cancel_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open_queue(&dir).await;

        let ids = queue
            .enqueue(&ContentItem::new(MediaKind::Photo), None, None)
            .await
            .unwrap();

        assert!(queue.cancel(ids[1]).await.unwrap());
        assert!(!queue.cancel(ids[1]).await.unwrap());

        let jobs = queue.list(None).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, ids[1]);
        assert_eq!(jobs[0].status, JobStatus::Cancelled);
        assert_eq!(queue.list(Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_process_once_delivers_due_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open_queue(&dir).await;

        let ids = queue
            .enqueue(&ContentItem::new(MediaKind::Photo), None, None)
            .await
            .unwrap();

        // Only the first job is due; the second waits an interval
        let report = queue.process_once().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.completed, 1);

        let first = queue.get(ids[0]).await.unwrap().unwrap();
        let second = queue.get(ids[1]).await.unwrap().unwrap();
        assert_eq!(first.status, JobStatus::Completed);
        assert_eq!(second.status, JobStatus::Pending);

        assert_eq!(queue.purge(None).await.unwrap(), 0);
    }
}
