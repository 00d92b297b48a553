//! Processor loop.
//!
//! A single background task that, every `check_interval`, dispatches the due
//! jobs one after another, applies the retry policy to each outcome and then
//! runs the sweeper.
//!
//! # Features
//!
//! - Idempotent start guarded by a mutex
//! - Cycles never overlap: a foreground `run_cycle` waits for the
//!   background one to finish
//! - Cooperative stop through a broadcast channel, checked at the top of each
//!   cycle and between jobs
//! - Bounded wait on stop; an in-flight dispatch is never interrupted
//! - Per-cycle report and Prometheus metrics

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatch::{dispatch_guarded, DispatchOutcome, DispatchRegistry};
use crate::metrics::MetricsCollector;
use crate::storage::{JobStore, StoreError};

use super::job::{Job, JobStatus};
use super::retry::{to_chrono, RetryDecision, RetryPolicy};
use super::sweeper::Sweeper;

/// Errors that can occur in the processor.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The job store failed during a cycle.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The running cycle did not finish within the shutdown timeout.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Sleep between cycles.
    pub check_interval: Duration,
    /// How long `stop` waits for the running cycle.
    pub shutdown_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProcessorConfig {
    /// Sets the check interval.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Counts from one processor cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Jobs picked up for dispatch.
    pub dispatched: usize,
    pub completed: usize,
    /// Jobs that failed and were rescheduled.
    pub retried: usize,
    /// Jobs that reached `failed`.
    pub failed: usize,
    /// Assets released by the sweeper.
    pub released: usize,
    /// Completed jobs purged by the sweeper.
    pub purged: u64,
}

/// Runs processor cycles. Shared between the handle and the background task.
struct CycleRunner {
    store: JobStore,
    registry: DispatchRegistry,
    sweeper: Sweeper,
    policy: RetryPolicy,
    metrics: MetricsCollector,
    /// Held for the whole of a cycle.
    cycle_lock: Mutex<()>,
}

impl CycleRunner {
    /// Dispatches the jobs due at `now`, then sweeps.
    ///
    /// Waits for any cycle already in progress. When `stop` becomes set, the
    /// remaining due jobs are left for the next run and the sweep is skipped.
    async fn run(
        &self,
        now: DateTime<Utc>,
        stop: Option<&AtomicBool>,
    ) -> Result<CycleReport, StoreError> {
        let _cycle = self.cycle_lock.lock().await;
        let start_time = Instant::now();
        let mut report = CycleReport::default();

        let due = self.store.due_jobs(now).await?;
        if !due.is_empty() {
            debug!(count = due.len(), "Found due jobs");
        }

        for job in &due {
            if stop.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                info!(
                    remaining = due.len() - report.dispatched,
                    "Stop requested, leaving remaining jobs for the next run"
                );
                return Ok(report);
            }
            self.process_job(job, now, start_time, &mut report).await?;
        }

        let sweep = self.sweeper.sweep(now).await?;
        report.released = sweep.released;
        report.purged = sweep.purged;

        self.metrics.set_job_counts(&self.store.status_counts().await?);
        self.metrics
            .record_cycle(start_time.elapsed().as_secs_f64());

        Ok(report)
    }

    /// Dispatches one job and records the outcome.
    ///
    /// Retry times count from the end of the attempt: the cycle's `now`
    /// advanced by the time spent since `cycle_start`.
    async fn process_job(
        &self,
        job: &Job,
        now: DateTime<Utc>,
        cycle_start: Instant,
        report: &mut CycleReport,
    ) -> Result<(), StoreError> {
        report.dispatched += 1;
        let attempt = job.attempts + 1;

        info!(
            job_id = job.id,
            target_name = %job.target,
            attempt = attempt,
            "Dispatching job"
        );

        let content = match job.content() {
            Ok(content) => content,
            Err(e) => {
                let message = format!("Malformed content snapshot: {}", e);
                return self.fail_immediately(job, &message, report).await;
            }
        };

        let Some(dispatcher) = self.registry.get(&job.target) else {
            let message = format!("No dispatcher registered for target '{}'", job.target);
            return self.fail_immediately(job, &message, report).await;
        };

        let outcome = dispatch_guarded(dispatcher.as_ref(), &job.target, &content).await;
        let finished_at = now + to_chrono(cycle_start.elapsed());
        let decision = self.policy.decide(attempt, &outcome, finished_at);

        let updated = match decision {
            RetryDecision::Retry { at } => {
                self.store
                    .record_retry(job.id, outcome.error_message(), at)
                    .await?
            }
            RetryDecision::Complete | RetryDecision::Fail => {
                self.store
                    .update(
                        job.id,
                        decision.status(),
                        outcome.error_message(),
                        outcome.result_reference(),
                    )
                    .await?
            }
        };
        if !updated {
            return Ok(());
        }

        match decision {
            RetryDecision::Complete => {
                report.completed += 1;
                self.metrics.record_dispatch(&job.target, "completed");
                info!(
                    job_id = job.id,
                    target_name = %job.target,
                    result_reference = ?outcome.result_reference(),
                    "Job completed"
                );
            }
            RetryDecision::Retry { at } => {
                report.retried += 1;
                self.metrics.record_dispatch(&job.target, "retried");
                warn!(
                    job_id = job.id,
                    target_name = %job.target,
                    attempt = attempt,
                    remaining_attempts = self.policy.remaining_attempts(attempt),
                    retry_at = %at,
                    error = outcome.error_message().unwrap_or_default(),
                    "Dispatch failed, retry scheduled"
                );
            }
            RetryDecision::Fail => {
                report.failed += 1;
                self.metrics.record_dispatch(&job.target, "failed");
                error!(
                    job_id = job.id,
                    target_name = %job.target,
                    attempts = attempt,
                    error = outcome.error_message().unwrap_or_default(),
                    "Job permanently failed"
                );
            }
        }

        Ok(())
    }

    /// Fails a job that no retry can fix.
    async fn fail_immediately(
        &self,
        job: &Job,
        message: &str,
        report: &mut CycleReport,
    ) -> Result<(), StoreError> {
        let outcome = DispatchOutcome::failure(message);
        let updated = self
            .store
            .update(job.id, JobStatus::Failed, outcome.error_message(), None)
            .await?;

        if updated {
            report.failed += 1;
            self.metrics.record_dispatch(&job.target, "failed");
            error!(
                job_id = job.id,
                target_name = %job.target,
                error = message,
                "Job permanently failed"
            );
        }
        Ok(())
    }
}

/// Handle owning the background processing task.
pub struct Processor {
    config: ProcessorConfig,
    runner: Arc<CycleRunner>,
    shutdown_tx: broadcast::Sender<()>,
    stop_requested: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Processor {
    pub fn new(
        config: ProcessorConfig,
        store: JobStore,
        registry: DispatchRegistry,
        sweeper: Sweeper,
    ) -> Self {
        // A single pending signal is all stop ever sends
        let (shutdown_tx, _) = broadcast::channel(1);

        let runner = CycleRunner {
            store,
            registry,
            sweeper,
            policy: config.retry,
            metrics: MetricsCollector::new(),
            cycle_lock: Mutex::new(()),
        };

        Self {
            config,
            runner: Arc::new(runner),
            shutdown_tx,
            stop_requested: Arc::new(AtomicBool::new(false)),
            is_running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Runs one cycle in the caller's task.
    ///
    /// If the background loop is mid-cycle, this waits for it to finish and
    /// then sees only the jobs that are still due.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, ProcessorError> {
        Ok(self.runner.run(now, None).await?)
    }

    /// Starts the background loop.
    ///
    /// Returns `false` without doing anything if the loop is already running.
    pub async fn start(&self) -> bool {
        let mut handle = self.handle.lock().await;

        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("Processor already running, start ignored");
            return false;
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        self.is_running.store(true, Ordering::SeqCst);

        let runner = Arc::clone(&self.runner);
        let stop_requested = Arc::clone(&self.stop_requested);
        let is_running = Arc::clone(&self.is_running);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let check_interval = self.config.check_interval;

        *handle = Some(tokio::spawn(async move {
            run_loop(runner, shutdown_rx, stop_requested, check_interval).await;
            is_running.store(false, Ordering::SeqCst);
        }));

        info!(
            check_interval_secs = check_interval.as_secs_f64(),
            "Processor started"
        );
        true
    }

    /// Signals the loop to stop and waits up to the shutdown timeout.
    ///
    /// A cycle still running after the timeout is left to finish on its own.
    ///
    /// # Errors
    ///
    /// Returns `ProcessorError::ShutdownTimeout` if the loop did not stop in time.
    pub async fn stop(&self) -> Result<(), ProcessorError> {
        let mut guard = self.handle.lock().await;
        let Some(handle) = guard.as_mut() else {
            return Ok(());
        };

        info!("Stopping processor");
        self.stop_requested.store(true, Ordering::SeqCst);
        // No receiver means the loop already exited
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.config.shutdown_timeout, handle).await {
            Ok(Ok(())) => {
                *guard = None;
                info!("Processor stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                *guard = None;
                self.is_running.store(false, Ordering::SeqCst);
                error!(error = %e, "Processor task panicked");
                Ok(())
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.shutdown_timeout.as_secs_f64(),
                    "Processor did not stop in time, leaving the running cycle to finish"
                );
                Err(ProcessorError::ShutdownTimeout(self.config.shutdown_timeout))
            }
        }
    }

    /// Returns whether the background loop is running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Main processing loop.
async fn run_loop(
    runner: Arc<CycleRunner>,
    mut shutdown_rx: broadcast::Receiver<()>,
    stop_requested: Arc<AtomicBool>,
    check_interval: Duration,
) {
    loop {
        if stop_requested.load(Ordering::SeqCst) {
            break;
        }

        match runner.run(Utc::now(), Some(&stop_requested)).await {
            Ok(report) if report.dispatched > 0 || report.released > 0 || report.purged > 0 => {
                info!(
                    dispatched = report.dispatched,
                    completed = report.completed,
                    retried = report.retried,
                    failed = report.failed,
                    released = report.released,
                    purged = report.purged,
                    "Processor cycle finished"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Processor cycle failed");
            }
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(check_interval) => {}
        }
    }

    info!("Processor loop exited");
}
