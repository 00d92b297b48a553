//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by forwardr and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::{Mutex, OnceLock};

/// Global Prometheus registry for all forwardr metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Dispatch attempts, labeled by target and outcome (completed/retried/failed).
pub static DISPATCH_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Jobs currently in the store, labeled by status.
pub static JOBS: OnceLock<GaugeVec> = OnceLock::new();

/// Duration of one processor cycle in seconds.
pub static CYCLE_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Content assets released after their batch finished.
pub static ASSETS_RELEASED_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Serializes initialization so every static comes from the same registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize all metrics and register them with the registry.
///
/// Should be called once at startup. Later calls return immediately.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let dispatch_total = CounterVec::new(
        Opts::new("forwardr_dispatch_total", "Total dispatch attempts"),
        &["target", "outcome"],
    )?;

    let jobs = GaugeVec::new(
        Opts::new("forwardr_jobs", "Number of jobs in the store"),
        &["status"],
    )?;

    let cycle_duration = Histogram::with_opts(
        HistogramOpts::new(
            "forwardr_cycle_duration_seconds",
            "Processor cycle duration in seconds",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
    )?;

    let assets_released_total = Counter::new(
        "forwardr_assets_released_total",
        "Total content assets released",
    )?;

    registry.register(Box::new(dispatch_total.clone()))?;
    registry.register(Box::new(jobs.clone()))?;
    registry.register(Box::new(cycle_duration.clone()))?;
    registry.register(Box::new(assets_released_total.clone()))?;

    // Only ever reached once, under the lock
    let _ = DISPATCH_TOTAL.set(dispatch_total);
    let _ = JOBS.set(jobs);
    let _ = CYCLE_DURATION.set(cycle_duration);
    let _ = ASSETS_RELEASED_TOTAL.set(assets_released_total);
    let _ = REGISTRY.set(registry);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead if the registry was never initialized or
/// encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_repeatable() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_after_init() {
        let _ = init_metrics();

        if let Some(counter) = ASSETS_RELEASED_TOTAL.get() {
            counter.inc();
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        assert!(metrics.contains("forwardr_assets_released_total"));
    }
}
