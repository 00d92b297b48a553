//! Job definitions for the scheduler.
//!
//! This module defines the core job types used in the scheduling system:
//!
//! - `Job`: One scheduled delivery of one content item to one target
//! - `JobStatus`: Lifecycle state with the allowed transitions
//! - `StatusCounts`: Per-status totals reported by the store

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ContentItem;

/// Identifier assigned by the store, increasing in creation order.
pub type JobId = i64;

/// Status of a job.
///
/// `Pending` is the only non-terminal state. Every other state is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for its scheduled time or for a retry.
    Pending,
    /// Delivered successfully.
    Completed,
    /// Gave up after exhausting attempts or on a permanent error.
    Failed,
    /// Cancelled by an operator while still pending.
    Cancelled,
}

impl JobStatus {
    /// All statuses, in reporting order.
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Returns the lowercase name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Returns whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// A job as persisted in the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Publishing target this job delivers to.
    pub target: String,
    /// JSON snapshot of the content item taken at enqueue time.
    pub content_snapshot: String,
    /// Groups the jobs fanned out from one content item.
    pub correlation_id: Option<String>,
    /// The job must not be dispatched before this time.
    pub scheduled_time: DateTime<Utc>,
    pub status: JobStatus,
    /// Number of dispatch attempts made so far.
    pub attempts: u32,
    /// Newline separated, timestamped failure messages. Only ever appended to.
    pub error_log: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Time of the transition into a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Artifact returned by the target on success, e.g. a post URL.
    pub result_reference: Option<String>,
}

impl Job {
    /// Parses the content snapshot.
    pub fn content(&self) -> Result<ContentItem, serde_json::Error> {
        ContentItem::from_snapshot(&self.content_snapshot)
    }

    /// Returns the individual error log entries.
    pub fn error_entries(&self) -> Vec<&str> {
        self.error_log
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect()
    }
}

/// Number of jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total: u64,
}

impl StatusCounts {
    /// Returns the count for one status.
    pub fn get(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    /// Adds `count` jobs of `status`, keeping `total` in sync.
    pub fn add(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Cancelled => self.cancelled += count,
        }
        self.total += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_job(status: JobStatus) -> Job {
        let now = Utc::now();
        Job {
            id: 1,
            target: "telegram".to_string(),
            content_snapshot: r#"{"type":"text","caption":"hi"}"#.to_string(),
            correlation_id: None,
            scheduled_time: now,
            status,
            attempts: 0,
            error_log: String::new(),
            created_at: now,
            updated_at: None,
            completed_at: None,
            result_reference: None,
        }
    }

    #[test]
    fn test_job_status_display_and_parse() {
        for status in JobStatus::ALL {
            assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(status.is_terminal(), "{}", status);
        }
    }

    #[test]
    fn test_error_entries_skip_blank_lines() {
        let mut job = sample_job(JobStatus::Failed);
        job.error_log = "[t1] Attempt 1: boom\n\n[t2] Attempt 2: boom".to_string();
        assert_eq!(job.error_entries().len(), 2);

        job.error_log.clear();
        assert!(job.error_entries().is_empty());
    }

    #[test]
    fn test_job_content_parses_snapshot() {
        let job = sample_job(JobStatus::Pending);
        let content = job.content().expect("snapshot should parse");
        assert_eq!(content.caption.as_deref(), Some("hi"));
    }

    #[test]
    fn test_status_counts_add() {
        let mut counts = StatusCounts::default();
        counts.add(JobStatus::Pending, 2);
        counts.add(JobStatus::Failed, 1);

        assert_eq!(counts.get(JobStatus::Pending), 2);
        assert_eq!(counts.get(JobStatus::Failed), 1);
        assert_eq!(counts.get(JobStatus::Completed), 0);
        assert_eq!(counts.total, 3);
    }
}
