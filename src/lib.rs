//! forwardr: persistent scheduled fan-out of content to publishing targets.
//!
//! Each content item becomes one job per eligible target, staggered in time
//! and stored in SQLite. A background processor dispatches due jobs, retries
//! failures with a fixed delay and releases shared assets once every job of
//! an item has finished.

pub mod cli;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigError, QueueConfig, TargetsFile};
pub use content::{ContentItem, MediaKind};
pub use error::{DispatchError, QueueError, ReleaseError};
pub use queue::Queue;
pub use scheduler::{Job, JobId, JobStatus, ProcessorError};
pub use storage::{JobStore, StoreError};
