//! Metrics module for Prometheus-based monitoring.
//!
//! Counts dispatch attempts per target and outcome, job totals per status,
//! processor cycle durations and released assets.
//!
//! # Example
//!
//! ```ignore
//! use forwardr::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//! let collector = MetricsCollector::new();
//! collector.record_dispatch("telegram", "completed");
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{ASSETS_RELEASED_TOTAL, CYCLE_DURATION, DISPATCH_TOTAL, JOBS, REGISTRY};
