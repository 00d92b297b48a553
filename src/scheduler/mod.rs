//! Scheduling and processing of delivery jobs.
//!
//! - **Job**: one scheduled delivery of one content item to one target
//! - **RetryPolicy**: fixed-delay retry decisions
//! - **FanoutScheduler**: one staggered job per eligible target
//! - **Processor**: the background loop dispatching due jobs
//! - **Sweeper**: asset release and retention purge after each cycle
//!
//! # Architecture
//!
//! ```text
//!   enqueue ──► FanoutScheduler ──► JobStore ◄──┐
//!                                      │        │ update / reschedule
//!                                      ▼        │
//!                                  Processor ───┤──► Dispatcher
//!                                      │        │
//!                                      ▼        │
//!                                   Sweeper ────┘──► AssetReleaser
//! ```

pub mod fanout;
pub mod job;
pub mod processor;
pub mod retry;
pub mod sweeper;

pub use fanout::{FanoutScheduler, Stagger};
pub use job::{Job, JobId, JobStatus, StatusCounts};
pub use processor::{CycleReport, Processor, ProcessorConfig, ProcessorError};
pub use retry::{RetryDecision, RetryPolicy};
pub use sweeper::{SweepReport, Sweeper};
