//! High-level metric recording for the queue.
//!
//! `MetricsCollector` wraps the raw Prometheus statics. Every method is a
//! no-op until `init_metrics()` has run, so library users and tests that
//! never initialize metrics pay nothing.

use crate::scheduler::job::{JobStatus, StatusCounts};

use super::prometheus::{ASSETS_RELEASED_TOTAL, CYCLE_DURATION, DISPATCH_TOTAL, JOBS};

/// Metrics collector for recording queue operational metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one dispatch attempt.
    ///
    /// `outcome` is the resulting transition: "completed", "retried" or "failed".
    pub fn record_dispatch(&self, target: &str, outcome: &str) {
        if let Some(dispatch_total) = DISPATCH_TOTAL.get() {
            dispatch_total.with_label_values(&[target, outcome]).inc();
        }

        tracing::trace!(target_name = target, outcome = outcome, "Recorded dispatch metric");
    }

    /// Record the duration of a processor cycle.
    pub fn record_cycle(&self, duration_secs: f64) {
        if let Some(cycle_duration) = CYCLE_DURATION.get() {
            cycle_duration.observe(duration_secs);
        }
    }

    /// Record released content assets.
    pub fn record_released(&self, count: usize) {
        if let Some(released) = ASSETS_RELEASED_TOTAL.get() {
            released.inc_by(count as f64);
        }
    }

    /// Set the per-status job gauges.
    pub fn set_job_counts(&self, counts: &StatusCounts) {
        if let Some(jobs) = JOBS.get() {
            for status in JobStatus::ALL {
                jobs.with_label_values(&[status.as_str()])
                    .set(counts.get(status) as f64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_collector_records_after_init() {
        init_metrics().unwrap();
        let collector = MetricsCollector::new();

        collector.record_dispatch("telegram", "completed");
        collector.record_cycle(0.25);
        collector.record_released(2);

        let mut counts = StatusCounts::default();
        counts.add(JobStatus::Pending, 3);
        collector.set_job_counts(&counts);

        let text = export_metrics();
        assert!(text.contains("forwardr_dispatch_total"));
        assert!(text.contains("telegram"));
        assert!(text.contains("forwardr_jobs{status=\"pending\"}"));
        assert!(text.contains("forwardr_cycle_duration_seconds"));
    }

    #[test]
    fn test_collector_default_is_usable() {
        // Recording must never panic, initialized or not
        let collector = MetricsCollector::default();
        collector.record_dispatch("x", "failed");
        collector.set_job_counts(&StatusCounts::default());
    }
}
