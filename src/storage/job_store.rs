//! SQLite-backed job store.
//!
//! The store is the single authority for job persistence. Every mutation is
//! one guarded SQL statement (or one transaction), so concurrent callers and
//! the processor never observe a torn update. Status-changing statements only
//! match rows that are still `pending`, which keeps terminal jobs immutable.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use thiserror::Error;

use crate::scheduler::job::{Job, JobId, JobStatus, StatusCounts};

use super::migrations::{MigrationError, MigrationRunner};

/// Format of the timestamp prefix on error log entries.
const ERROR_LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors that can occur during job store operations.
///
/// Any of these means the store itself is unavailable or corrupt; callers
/// receive them as-is and the store never retries on its own.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// A stored row holds a value that cannot be decoded.
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// Fields of a job to be created.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub target: String,
    pub content_snapshot: String,
    pub scheduled_time: DateTime<Utc>,
    pub correlation_id: Option<String>,
}

/// Durable table of job records.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Opens (creating if missing) the database at `path` and applies migrations.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        tracing::info!(path = path, "Job store opened");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        MigrationRunner::new(self.pool.clone())
            .run_migrations()
            .await?;
        Ok(())
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates one pending job and returns its id.
    pub async fn create(
        &self,
        target: &str,
        content_snapshot: &str,
        scheduled_time: DateTime<Utc>,
        correlation_id: Option<&str>,
    ) -> Result<JobId, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                target, content_snapshot, correlation_id, scheduled_time,
                status, attempts, error_log, created_at
            ) VALUES (?1, ?2, ?3, ?4, 'pending', 0, '', ?5)
            "#,
        )
        .bind(target)
        .bind(content_snapshot)
        .bind(correlation_id)
        .bind(scheduled_time.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Creates several jobs in one transaction, returning ids in input order.
    ///
    /// A new batch for a correlation id clears any earlier release marker for
    /// it, so the shared asset is released again once this batch finishes.
    pub async fn create_batch(&self, jobs: &[NewJob]) -> Result<Vec<JobId>, StoreError> {
        let created_at = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(jobs.len());

        for job in jobs {
            let result = sqlx::query(
                r#"
                INSERT INTO jobs (
                    target, content_snapshot, correlation_id, scheduled_time,
                    status, attempts, error_log, created_at
                ) VALUES (?1, ?2, ?3, ?4, 'pending', 0, '', ?5)
                "#,
            )
            .bind(&job.target)
            .bind(&job.content_snapshot)
            .bind(&job.correlation_id)
            .bind(job.scheduled_time.timestamp_millis())
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

            ids.push(result.last_insert_rowid());

            if let Some(ref correlation_id) = job.correlation_id {
                sqlx::query("DELETE FROM released_assets WHERE correlation_id = ?1")
                    .bind(correlation_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(ids)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns pending jobs scheduled at or before `now`, earliest first.
    ///
    /// Ties are broken by id, i.e. creation order.
    pub async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE status = 'pending' AND scheduled_time <= ?1
            ORDER BY scheduled_time ASC, id ASC
            "#,
        )
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    /// Retrieves a job by its ID.
    pub async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Lists jobs, most recently created first. `None` means no limit.
    pub async fn list(&self, limit: Option<u32>) -> Result<Vec<Job>, StoreError> {
        let limit = limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC, id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(job_from_row).collect()
    }

    /// Counts jobs per status.
    pub async fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            counts.add(parse_status(&status)?, count as u64);
        }

        Ok(counts)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Records one dispatch attempt.
    ///
    /// Increments `attempts`, appends `error_message` to the error log and,
    /// on a terminal status, stamps `completed_at`. `result_reference` is only
    /// stored for `completed`. Returns `false` (with a warning) when the job no
    /// longer exists or is already terminal.
    pub async fn update(
        &self,
        id: JobId,
        status: JobStatus,
        error_message: Option<&str>,
        result_reference: Option<&str>,
    ) -> Result<bool, StoreError> {
        let affected =
            record_attempt(&self.pool, id, status, error_message, result_reference, Utc::now())
                .await?;

        if affected == 0 {
            tracing::warn!(
                job_id = id,
                status = %status,
                "Job not found or already terminal, update ignored"
            );
            return Ok(false);
        }

        tracing::debug!(job_id = id, status = %status, "Job updated");
        Ok(true)
    }

    /// Moves a pending job's scheduled time. Attempts and error log are untouched.
    pub async fn reschedule(
        &self,
        id: JobId,
        new_scheduled_time: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let affected = move_schedule(&self.pool, id, new_scheduled_time, Utc::now()).await?;

        if affected == 0 {
            tracing::warn!(job_id = id, "Job not found or already terminal, reschedule ignored");
            return Ok(false);
        }

        Ok(true)
    }

    /// Records a failed attempt and moves the job to `retry_at`.
    ///
    /// The attempt and the new schedule are written in one transaction, so a
    /// job is never left with the attempt counted but its old due time.
    /// Returns `false` when the job no longer exists or is already terminal.
    pub async fn record_retry(
        &self,
        id: JobId,
        error_message: Option<&str>,
        retry_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let affected =
            record_attempt(&mut *tx, id, JobStatus::Pending, error_message, None, now).await?;
        if affected == 0 {
            tx.rollback().await?;
            tracing::warn!(job_id = id, "Job not found or already terminal, retry ignored");
            return Ok(false);
        }

        move_schedule(&mut *tx, id, retry_at, now).await?;
        tx.commit().await?;

        tracing::debug!(job_id = id, retry_at = %retry_at, "Job rescheduled for retry");
        Ok(true)
    }

    /// Cancels a job. Succeeds only while the job is pending.
    pub async fn cancel(&self, id: JobId) -> Result<bool, StoreError> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'cancelled', updated_at = ?1, completed_at = ?1
            WHERE id = ?2 AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let cancelled = result.rows_affected() > 0;
        if cancelled {
            tracing::info!(job_id = id, "Job cancelled");
        }
        Ok(cancelled)
    }

    /// Deletes completed jobs whose `completed_at` is before `older_than`.
    ///
    /// Release markers no remaining job refers to are dropped as well.
    pub async fn purge(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status = 'completed' AND completed_at IS NOT NULL AND completed_at < ?1
            "#,
        )
        .bind(older_than.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            self.prune_release_markers().await?;
            tracing::info!(deleted = deleted, "Purged old completed jobs");
        }
        Ok(deleted)
    }

    // =========================================================================
    // Asset release bookkeeping
    // =========================================================================

    /// Correlation ids whose jobs are all terminal and whose asset has not
    /// been released yet, oldest batch first.
    pub async fn releasable_correlations(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT j.correlation_id AS correlation_id
            FROM jobs j
            WHERE j.correlation_id IS NOT NULL
              AND NOT EXISTS (
                  SELECT 1 FROM jobs p
                  WHERE p.correlation_id = j.correlation_id AND p.status = 'pending'
              )
              AND NOT EXISTS (
                  SELECT 1 FROM released_assets r
                  WHERE r.correlation_id = j.correlation_id
              )
            GROUP BY j.correlation_id
            ORDER BY MIN(j.id)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get("correlation_id").map_err(StoreError::from))
            .collect()
    }

    /// Content snapshot of the first job in a correlation group.
    pub async fn correlation_snapshot(
        &self,
        correlation_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT content_snapshot FROM jobs WHERE correlation_id = ?1 ORDER BY id LIMIT 1",
        )
        .bind(correlation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get("content_snapshot"))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Records that a correlation group's asset was released.
    ///
    /// Returns `false` if it was already recorded.
    pub async fn mark_released(&self, correlation_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO released_assets (correlation_id, released_at) VALUES (?1, ?2)",
        )
        .bind(correlation_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns whether a correlation group's asset has been released.
    pub async fn is_released(&self, correlation_id: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT released_at FROM released_assets WHERE correlation_id = ?1")
                .bind(correlation_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    /// Drops release markers that no job references any more.
    pub async fn prune_release_markers(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM released_assets
            WHERE correlation_id NOT IN (
                SELECT correlation_id FROM jobs WHERE correlation_id IS NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Applies one dispatch attempt to a pending job. Returns the rows affected.
async fn record_attempt<'c, E>(
    executor: E,
    id: JobId,
    status: JobStatus,
    error_message: Option<&str>,
    result_reference: Option<&str>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let completed_at = status.is_terminal().then(|| now.timestamp_millis());

    let result = sqlx::query(
        r#"
        UPDATE jobs SET
            status = ?1,
            attempts = attempts + 1,
            error_log = CASE
                WHEN ?2 IS NULL THEN error_log
                WHEN error_log = '' THEN printf('[%s] Attempt %d: %s', ?3, attempts + 1, ?2)
                ELSE error_log || char(10) || printf('[%s] Attempt %d: %s', ?3, attempts + 1, ?2)
            END,
            result_reference = CASE WHEN ?1 = 'completed' THEN ?4 ELSE result_reference END,
            completed_at = COALESCE(?5, completed_at),
            updated_at = ?6
        WHERE id = ?7 AND status = 'pending'
        "#,
    )
    .bind(status.as_str())
    .bind(error_message)
    .bind(now.format(ERROR_LOG_TIME_FORMAT).to_string())
    .bind(result_reference)
    .bind(completed_at)
    .bind(now.timestamp_millis())
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Sets a pending job's scheduled time. Returns the rows affected.
async fn move_schedule<'c, E>(
    executor: E,
    id: JobId,
    scheduled_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE jobs SET status = 'pending', scheduled_time = ?1, updated_at = ?2
        WHERE id = ?3 AND status = 'pending'
        "#,
    )
    .bind(scheduled_time.timestamp_millis())
    .bind(now.timestamp_millis())
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

fn parse_status(value: &str) -> Result<JobStatus, StoreError> {
    value.parse().map_err(StoreError::InvalidRow)
}

fn from_millis(column: &str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::InvalidRow(format!("{} out of range: {}", column, millis)))
}

fn optional_millis(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let value: Option<i64> = row.try_get(column)?;
    value.map(|ms| from_millis(column, ms)).transpose()
}

fn job_from_row(row: &SqliteRow) -> Result<Job, StoreError> {
    let status: String = row.try_get("status")?;
    let attempts: i64 = row.try_get("attempts")?;

    Ok(Job {
        id: row.try_get("id")?,
        target: row.try_get("target")?,
        content_snapshot: row.try_get("content_snapshot")?,
        correlation_id: row.try_get("correlation_id")?,
        scheduled_time: from_millis("scheduled_time", row.try_get("scheduled_time")?)?,
        status: parse_status(&status)?,
        attempts: u32::try_from(attempts)
            .map_err(|_| StoreError::InvalidRow(format!("attempts out of range: {}", attempts)))?,
        error_log: row.try_get("error_log")?,
        created_at: from_millis("created_at", row.try_get("created_at")?)?,
        updated_at: optional_millis(row, "updated_at")?,
        completed_at: optional_millis(row, "completed_at")?,
        result_reference: row.try_get("result_reference")?,
    })
}
