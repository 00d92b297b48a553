//! Fan-out scheduler.
//!
//! Turns one content item and an ordered target list into one job per
//! target, staggered by a fixed interval so rate-limited destinations are
//! not all hit at once.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::content::ContentItem;
use crate::storage::{JobStore, NewJob, StoreError};

use super::job::JobId;
use super::retry::add_duration;

/// Default delay before the first job of a batch.
pub const DEFAULT_START_DELAY: Duration = Duration::ZERO;

/// Default spacing between consecutive jobs of a batch.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Stagger settings for one fan-out call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stagger {
    pub start_delay: Duration,
    pub interval: Duration,
}

impl Default for Stagger {
    fn default() -> Self {
        Self {
            start_delay: DEFAULT_START_DELAY,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl Stagger {
    pub fn new(start_delay: Duration, interval: Duration) -> Self {
        Self {
            start_delay,
            interval,
        }
    }

    /// Scheduled time of the `index`-th target: `base + start_delay + index * interval`.
    pub fn time_for(&self, base: DateTime<Utc>, index: usize) -> DateTime<Utc> {
        let factor = u32::try_from(index).unwrap_or(u32::MAX);
        let offset = self
            .interval
            .checked_mul(factor)
            .and_then(|spread| spread.checked_add(self.start_delay))
            .unwrap_or(Duration::MAX);
        add_duration(base, offset)
    }
}

/// Creates staggered job batches in the job store.
#[derive(Clone)]
pub struct FanoutScheduler {
    store: JobStore,
}

impl FanoutScheduler {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    /// Creates one pending job per target and returns their ids in target order.
    ///
    /// All jobs share the item's stable id as correlation id. The batch is
    /// written atomically; an empty target list creates nothing.
    pub async fn fan_out(
        &self,
        item: &ContentItem,
        targets: &[String],
        stagger: Stagger,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobId>, StoreError> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = item.to_snapshot()?;
        let correlation_id = item.stable_id().map(str::to_string);

        let jobs: Vec<NewJob> = targets
            .iter()
            .enumerate()
            .map(|(i, target)| NewJob {
                target: target.clone(),
                content_snapshot: snapshot.clone(),
                scheduled_time: stagger.time_for(now, i),
                correlation_id: correlation_id.clone(),
            })
            .collect();

        let ids = self.store.create_batch(&jobs).await?;

        for (id, job) in ids.iter().zip(&jobs) {
            tracing::info!(
                job_id = id,
                target_name = %job.target,
                scheduled_time = %job.scheduled_time,
                correlation_id = ?job.correlation_id,
                "Job queued"
            );
        }

        Ok(ids)
    }
}
